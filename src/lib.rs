//! GeoSearch viewer event core.
//!
//! In-process scheduling and state coordination for the 3D model viewer. It
//! handles:
//! - Event dispatch with priority, debounce, throttle and retry policies
//! - The authoritative model lifecycle mirror and derived sync events
//! - Validated user intents (the action layer)
//! - Configuration and logging setup for embedding applications
//!
//! # Architecture
//!
//! - `bus`: event catalog, payload validation and the `Scheduler`
//! - `coordinator`: lifecycle mirror, per-event handlers, snapshots
//! - `actions`: intent functions with a fixed dispatch policy each
//! - `config`: `ViewerConfig` from JSON and `GEOVIEW_*` environment variables
//!
//! Rendering, picking and model decoding live outside this crate and talk to
//! it only through events.

pub mod actions;
pub mod bus;
pub mod config;
pub mod coordinator;

#[cfg(test)]
mod tests;

use std::sync::{Arc, Mutex};

pub use actions::{ActionKind, Actions, SharedViewState, ViewState};
pub use bus::{
    BusEvent, DispatchError, DispatchPolicy, EventType, HistoryEntry, HistoryFilter, Priority, Scheduler,
    SchedulerConfig, SchedulerStats,
};
pub use config::{ConfigError, ViewerConfig};
pub use coordinator::{Coordinator, CoordinatorConfig, Mirror, MirrorSnapshot, ModelLifecycle};

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Scheduler(#[from] bus::SchedulerError),
}

/// Install the global fmt subscriber. `RUST_LOG` takes precedence over
/// `filter`. Safe to call more than once.
pub fn init_tracing(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config::DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}

/// Scheduler, coordinator and action layer wired to one another.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub scheduler: Scheduler,
    pub coordinator: Coordinator,
    pub actions: Actions,
}

impl Viewer {
    /// Must be called from inside a tokio runtime.
    pub fn new(config: &ViewerConfig) -> Result<Self, AppError> {
        let scheduler = Scheduler::new(config.scheduler.clone())?;
        let coordinator = Coordinator::new(scheduler.clone(), config.coordinator.clone());
        let view: SharedViewState = Arc::new(Mutex::new(ViewState::default()));
        let actions = Actions::new(scheduler.clone(), view);
        tracing::info!(
            batch_size = scheduler.config().batch_size,
            max_history = scheduler.config().max_history_size,
            "viewer core ready"
        );
        Ok(Self {
            scheduler,
            coordinator,
            actions,
        })
    }

    /// Detach the coordinator and tear the scheduler down.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
        self.scheduler.destroy();
    }
}
