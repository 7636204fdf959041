//! Event scheduling core.
//!
//! The bus provides:
//! - A static catalog of event types with per-type payload validators
//! - A dispatcher applying priority, debounce, throttle and retry policy
//! - Reentrancy protection through two priority lanes drained in batches
//! - A bounded, read-only history of executed events
//!
//! # Architecture
//!
//! Events flow from callers -> `Scheduler::dispatch` -> subscribed handlers:
//! - `EventRegistry`: validators keyed by `EventType`, no state
//! - `Scheduler`: debounce slots, throttle stamps, retry counters, lanes, history
//! - Handlers run synchronously; dispatches made from inside a handler are
//!   queued and run after the current pass

mod error;
mod event_bus;
pub mod event_types;
mod history;
mod lanes;
pub mod payloads;
mod policy;
mod registry;
mod scheduler;


pub use error::{DispatchError, HandlerError, SchedulerError, ValidationError};
pub use event_bus::BusEvent;
pub use event_types::EventType;
pub use history::{HistoryEntry, HistoryFilter, DEFAULT_MAX_HISTORY};
pub use policy::{DispatchPolicy, Priority, MAX_DEBOUNCE_MS};
pub use registry::{EventRegistry, Validator};
pub use scheduler::{HandlerResult, Scheduler, SchedulerConfig, SchedulerStats, Subscription};
