use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::HandlerError;
use super::event_types::EventType;
use super::policy::Priority;

/// An immutable event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: String,
    pub seq: u64,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
}

impl BusEvent {
    pub fn new(seq: u64, event_type: EventType, payload: serde_json::Value, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            seq,
            event_type,
            payload,
            priority,
            attempt: 0,
            created_at: Utc::now(),
        }
    }

    /// A fresh event sharing type and payload, one attempt further along.
    pub fn retry(&self, seq: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            seq,
            event_type: self.event_type,
            payload: self.payload.clone(),
            priority: self.priority,
            attempt: self.attempt + 1,
            created_at: Utc::now(),
        }
    }

    /// Decode the payload into a typed record.
    pub fn decode<P: DeserializeOwned>(&self) -> Result<P, HandlerError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| HandlerError::InvalidPayload {
            event_type: self.event_type,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::bus::payloads::FocusEntered;

    #[test]
    fn retry_keeps_payload_and_bumps_attempt() {
        let event = BusEvent::new(7, EventType::FocusEntered, json!({ "node_id": "n1" }), Priority::High);
        let retry = event.retry(8);
        assert_ne!(retry.id, event.id);
        assert_eq!(retry.seq, 8);
        assert_eq!(retry.attempt, 1);
        assert_eq!(retry.payload, event.payload);
        assert_eq!(retry.priority, Priority::High);
    }

    #[test]
    fn decode_reports_the_event_type() {
        let event = BusEvent::new(1, EventType::FocusEntered, json!({ "node": 1 }), Priority::Normal);
        match event.decode::<FocusEntered>() {
            Err(HandlerError::InvalidPayload { event_type, .. }) => {
                assert_eq!(event_type, EventType::FocusEntered)
            }
            other => panic!("expected invalid payload, got {other:?}"),
        }
    }
}
