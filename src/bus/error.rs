use super::event_types::EventType;

/// Local rejection of a payload or action input. Never published.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {event_type} payload: {reason}")]
pub struct ValidationError {
    pub event_type: EventType,
    pub reason: String,
}

impl ValidationError {
    pub fn new(event_type: EventType, reason: impl Into<String>) -> Self {
        Self {
            event_type,
            reason: reason.into(),
        }
    }
}

/// Failure raised inside a single subscriber.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),
    #[error("handler received malformed {event_type} payload: {reason}")]
    InvalidPayload { event_type: EventType, reason: String },
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<ValidationError> for HandlerError {
    fn from(value: ValidationError) -> Self {
        Self::InvalidPayload {
            event_type: value.event_type,
            reason: value.reason,
        }
    }
}

/// Terminal failure reported to error handlers, out of band from `dispatch`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("{0}")]
    Handler(HandlerError),
    #[error("{event_type} failed after {attempts} attempts: {last}")]
    RetryExhausted {
        event_type: EventType,
        attempts: u32,
        last: HandlerError,
    },
}

impl DispatchError {
    pub fn handler_error(&self) -> &HandlerError {
        match self {
            Self::Handler(error) => error,
            Self::RetryExhausted { last, .. } => last,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler requires a tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
