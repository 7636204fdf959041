//! Policy-governed dispatcher.
//!
//! `dispatch` is fire-and-forget. Each call passes through, in order:
//! - debounce (last payload wins, one live timer per event type)
//! - throttle (dispatches inside the window are dropped, not delayed)
//! - reentrancy guard (calls made while a pass is running are queued in a
//!   priority lane and run after the pass)
//! - execution (every handler isolated, history recorded, lanes drained in
//!   batches of `batch_size`, leftovers resumed on the next runtime tick)
//!
//! Handler failures never reach the caller of `dispatch`. They are retried
//! with exponential backoff when the policy asks for it and are otherwise
//! reported to the handlers registered with [`Scheduler::on_error`].

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};

use super::error::{DispatchError, HandlerError, SchedulerError};
use super::event_bus::BusEvent;
use super::event_types::EventType;
use super::history::{EventHistory, HistoryEntry, HistoryFilter, DEFAULT_MAX_HISTORY};
use super::lanes::PriorityLanes;
use super::payloads::{EventPayload, SystemErrorPayload};
use super::policy::DispatchPolicy;

pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&BusEvent) -> HandlerResult + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&DispatchError, &BusEvent) + Send + Sync>;

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 3_000;
const MAX_HISTORY_CAP: usize = 10_000;
const MAX_RETRIES_CAP: u32 = 10;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_history_size: usize,
    /// Queued events executed per tick before yielding.
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Dispatch a `system.error` meta event on terminal failures.
    pub emit_error_events: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_history_size: DEFAULT_MAX_HISTORY,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            emit_error_events: true,
        }
    }
}

impl SchedulerConfig {
    /// Clamp every field into its supported range.
    pub fn normalized(self) -> Self {
        let mut config = self;

        let history = config.max_history_size.clamp(1, MAX_HISTORY_CAP);
        if history != config.max_history_size {
            tracing::warn!(requested = config.max_history_size, applied = history, "max_history_size clamped");
            config.max_history_size = history;
        }
        if config.batch_size == 0 {
            tracing::warn!("batch_size of 0 raised to 1");
            config.batch_size = 1;
        }
        if config.max_retries > MAX_RETRIES_CAP {
            tracing::warn!(requested = config.max_retries, applied = MAX_RETRIES_CAP, "max_retries clamped");
            config.max_retries = MAX_RETRIES_CAP;
        }
        config.retry_base_delay_ms = config.retry_base_delay_ms.max(1);
        config.retry_max_delay_ms = config.retry_max_delay_ms.max(config.retry_base_delay_ms);
        config
    }

    /// Backoff before retry number `attempt + 1`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let millis = self
            .retry_base_delay_ms
            .saturating_mul(factor)
            .min(self.retry_max_delay_ms);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub dispatched: u64,
    pub executed: u64,
    pub queued: u64,
    pub coalesced: u64,
    pub throttled: u64,
    pub retried: u64,
    pub failed: u64,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct Pending {
    event: BusEvent,
    policy: DispatchPolicy,
}

struct DebounceSlot {
    generation: u64,
    payload: serde_json::Value,
    policy: DispatchPolicy,
    timer: JoinHandle<()>,
}

struct SchedulerState {
    handlers: HashMap<EventType, Vec<(u64, Handler)>>,
    error_handlers: Vec<(u64, ErrorHandler)>,
    debounce: HashMap<EventType, DebounceSlot>,
    last_executed: HashMap<EventType, Instant>,
    retry_counts: HashMap<EventType, u32>,
    retry_timers: Vec<JoinHandle<()>>,
    lanes: PriorityLanes<Pending>,
    history: EventHistory,
    stats: SchedulerStats,
    dispatching: bool,
    destroyed: bool,
}

impl SchedulerState {
    fn new(history_capacity: usize) -> Self {
        Self {
            handlers: HashMap::new(),
            error_handlers: Vec::new(),
            debounce: HashMap::new(),
            last_executed: HashMap::new(),
            retry_counts: HashMap::new(),
            retry_timers: Vec::new(),
            lanes: PriorityLanes::default(),
            history: EventHistory::new(history_capacity),
            stats: SchedulerStats::default(),
            dispatching: false,
            destroyed: false,
        }
    }

    fn abort_timers(&mut self) {
        for (_, slot) in self.debounce.drain() {
            slot.timer.abort();
        }
        for timer in self.retry_timers.drain(..) {
            timer.abort();
        }
    }
}

struct Inner {
    config: SchedulerConfig,
    handle: Handle,
    state: Mutex<SchedulerState>,
    seq: AtomicU64,
    ids: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().expect("scheduler state mutex poisoned")
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.abort_timers();
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum SubscriptionTarget {
    Event { event_type: EventType, id: u64 },
    Error { id: u64 },
}

/// Registration handle returned by [`Scheduler::subscribe`] and
/// [`Scheduler::on_error`]. Dropping it leaves the handler registered.
#[must_use = "the handler stays registered until `unsubscribe` is called"]
pub struct Subscription {
    scheduler: Weak<Inner>,
    target: SubscriptionTarget,
}

impl Subscription {
    /// Remove the handler. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.scheduler.upgrade() else {
            return false;
        };
        let mut state = inner.lock();
        match self.target {
            SubscriptionTarget::Event { event_type, id } => {
                let Some(handlers) = state.handlers.get_mut(&event_type) else {
                    return false;
                };
                let before = handlers.len();
                handlers.retain(|(handler_id, _)| *handler_id != id);
                let removed = handlers.len() != before;
                if handlers.is_empty() {
                    state.handlers.remove(&event_type);
                }
                removed
            }
            SubscriptionTarget::Error { id } => {
                let before = state.error_handlers.len();
                state.error_handlers.retain(|(handler_id, _)| *handler_id != id);
                state.error_handlers.len() != before
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("target", &self.target).finish()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Build a scheduler on the ambient tokio runtime.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let handle = Handle::try_current()?;
        Ok(Self::with_handle(config, handle))
    }

    pub fn with_handle(config: SchedulerConfig, handle: Handle) -> Self {
        let config = config.normalized();
        let state = SchedulerState::new(config.max_history_size);
        Self {
            inner: Arc::new(Inner {
                config,
                handle,
                state: Mutex::new(state),
                seq: AtomicU64::new(0),
                ids: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn subscribe<F>(&self, event_type: EventType, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.inner.next_id();
        let mut state = self.inner.lock();
        state
            .handlers
            .entry(event_type)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            scheduler: Arc::downgrade(&self.inner),
            target: SubscriptionTarget::Event { event_type, id },
        }
    }

    /// Register a callback for terminal failures.
    pub fn on_error<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DispatchError, &BusEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id();
        let mut state = self.inner.lock();
        state.error_handlers.push((id, Arc::new(handler)));
        Subscription {
            scheduler: Arc::downgrade(&self.inner),
            target: SubscriptionTarget::Error { id },
        }
    }

    pub fn dispatch(&self, event_type: EventType, payload: serde_json::Value, policy: DispatchPolicy) {
        let policy = policy.normalized();
        let pending = {
            let mut state = self.inner.lock();
            if state.destroyed {
                tracing::trace!(%event_type, "dispatch after destroy ignored");
                return;
            }
            state.stats.dispatched += 1;

            if policy.debounce_ms > 0 {
                self.arm_debounce(&mut state, event_type, payload, policy);
                return;
            }

            if policy.throttle_ms > 0 {
                let window = Duration::from_millis(policy.throttle_ms);
                let inside_window = state
                    .last_executed
                    .get(&event_type)
                    .is_some_and(|last| last.elapsed() < window);
                if inside_window {
                    state.stats.throttled += 1;
                    tracing::debug!(%event_type, throttle_ms = policy.throttle_ms, "dispatch dropped by throttle");
                    return;
                }
            }

            Pending {
                event: BusEvent::new(self.inner.next_seq(), event_type, payload, policy.priority),
                policy,
            }
        };
        self.submit(pending);
    }

    /// Executed events, oldest first.
    pub fn history(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        self.inner.lock().history.query(filter)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.lock().stats
    }

    /// Events waiting in the priority lanes.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().lanes.len()
    }

    pub fn pending_debounce_count(&self) -> usize {
        self.inner.lock().debounce.len()
    }

    pub fn is_dispatching(&self) -> bool {
        self.inner.lock().dispatching
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    pub fn subscriber_count(&self, event_type: EventType) -> usize {
        self.inner
            .lock()
            .handlers
            .get(&event_type)
            .map_or(0, Vec::len)
    }

    /// Cancel every timer and drop all queued work, history and registrations.
    /// Later dispatches are no-ops.
    pub fn destroy(&self) {
        let mut state = self.inner.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        state.abort_timers();
        state.lanes.clear();
        state.history.clear();
        state.retry_counts.clear();
        state.last_executed.clear();
        state.handlers.clear();
        state.error_handlers.clear();
        tracing::debug!("scheduler destroyed");
    }

    // -----------------------------------------------------------------------
    // Debounce
    // -----------------------------------------------------------------------

    fn arm_debounce(
        &self,
        state: &mut SchedulerState,
        event_type: EventType,
        payload: serde_json::Value,
        policy: DispatchPolicy,
    ) {
        if let Some(previous) = state.debounce.remove(&event_type) {
            previous.timer.abort();
            state.stats.coalesced += 1;
            tracing::trace!(%event_type, "debounced dispatch replaced");
        }

        let generation = self.inner.next_id();
        let delay = Duration::from_millis(policy.debounce_ms);
        let weak = Arc::downgrade(&self.inner);
        let timer = self.inner.handle.spawn(async move {
            sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Scheduler { inner }.fire_debounced(event_type, generation);
            }
        });

        state.debounce.insert(
            event_type,
            DebounceSlot {
                generation,
                payload,
                policy,
                timer,
            },
        );
    }

    fn fire_debounced(&self, event_type: EventType, generation: u64) {
        let pending = {
            let mut state = self.inner.lock();
            if state.destroyed {
                return;
            }
            let current = state.debounce.get(&event_type).map(|slot| slot.generation);
            if current != Some(generation) {
                return;
            }
            let Some(slot) = state.debounce.remove(&event_type) else {
                return;
            };
            Pending {
                event: BusEvent::new(self.inner.next_seq(), event_type, slot.payload, slot.policy.priority),
                policy: slot.policy,
            }
        };
        self.submit(pending);
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    fn submit(&self, pending: Pending) {
        {
            let mut state = self.inner.lock();
            if state.destroyed {
                return;
            }
            if state.dispatching {
                tracing::trace!(
                    event_type = %pending.event.event_type,
                    priority = %pending.event.priority,
                    "queued behind active dispatch"
                );
                state.stats.queued += 1;
                let priority = pending.event.priority;
                state.lanes.push(priority, pending);
                return;
            }
            state.dispatching = true;
        }
        self.execute(pending);
        self.drain();
    }

    /// Run queued events until the lanes are empty or the batch cap is hit.
    /// Clears the mid-dispatch flag only once nothing is left.
    fn drain(&self) {
        let batch_size = self.inner.config.batch_size;
        let mut processed = 0usize;
        loop {
            let next = {
                let mut state = self.inner.lock();
                if state.destroyed {
                    state.lanes.clear();
                    state.dispatching = false;
                    return;
                }
                if state.lanes.is_empty() {
                    state.dispatching = false;
                    return;
                }
                if processed >= batch_size {
                    tracing::debug!(remaining = state.lanes.len(), "batch cap reached, yielding");
                    drop(state);
                    self.schedule_drain();
                    return;
                }
                state.lanes.pop()
            };
            if let Some(pending) = next {
                self.execute(pending);
                processed += 1;
            }
        }
    }

    fn schedule_drain(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.handle.spawn(async move {
            tokio::task::yield_now().await;
            if let Some(inner) = weak.upgrade() {
                Scheduler { inner }.drain();
            }
        });
    }

    fn execute(&self, pending: Pending) {
        let Pending { event, policy } = pending;
        let handlers: Vec<Handler> = {
            let mut state = self.inner.lock();
            if state.destroyed {
                return;
            }
            // Queued dispatches passed the throttle check before any of them
            // ran. Retries bypass the window.
            if policy.throttle_ms > 0 && event.attempt == 0 {
                let window = Duration::from_millis(policy.throttle_ms);
                let inside_window = state
                    .last_executed
                    .get(&event.event_type)
                    .is_some_and(|last| last.elapsed() < window);
                if inside_window {
                    state.stats.throttled += 1;
                    tracing::debug!(
                        event_type = %event.event_type,
                        throttle_ms = policy.throttle_ms,
                        "queued dispatch dropped by throttle"
                    );
                    return;
                }
            }
            state.last_executed.insert(event.event_type, Instant::now());
            state
                .handlers
                .get(&event.event_type)
                .map(|entries| entries.iter().map(|(_, handler)| Arc::clone(handler)).collect())
                .unwrap_or_default()
        };

        tracing::trace!(
            event_type = %event.event_type,
            seq = event.seq,
            attempt = event.attempt,
            handlers = handlers.len(),
            "executing"
        );

        let mut first_failure = None;
        for handler in &handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (**handler)(&event)))
                .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(&*panic))));
            if let Err(error) = outcome {
                tracing::warn!(
                    event_type = %event.event_type,
                    attempt = event.attempt,
                    "handler failed: {error}"
                );
                if first_failure.is_none() {
                    first_failure = Some(error);
                }
            }
        }

        {
            let mut state = self.inner.lock();
            if state.destroyed {
                return;
            }
            state.stats.executed += 1;
            state.history.record(&event);
            if first_failure.is_none() {
                state.retry_counts.remove(&event.event_type);
            }
        }

        if let Some(error) = first_failure {
            self.handle_dispatch_error(error, &event, policy);
        }
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    fn handle_dispatch_error(&self, error: HandlerError, event: &BusEvent, policy: DispatchPolicy) {
        let config = &self.inner.config;
        let error_handlers: Vec<ErrorHandler> = {
            let mut state = self.inner.lock();
            if state.destroyed {
                return;
            }
            let failures = state.retry_counts.entry(event.event_type).or_insert(0);
            if policy.retry && *failures < config.max_retries {
                *failures += 1;
                let delay = config.retry_delay(event.attempt);
                let retry = event.retry(self.inner.next_seq());
                tracing::info!(
                    event_type = %event.event_type,
                    attempt = retry.attempt,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling retry"
                );
                state.stats.retried += 1;
                let timer = self.spawn_retry(retry, policy, delay);
                state.retry_timers.retain(|timer| !timer.is_finished());
                state.retry_timers.push(timer);
                return;
            }

            state.retry_counts.remove(&event.event_type);
            state.stats.failed += 1;
            if policy.silent {
                Vec::new()
            } else {
                state
                    .error_handlers
                    .iter()
                    .map(|(_, handler)| Arc::clone(handler))
                    .collect()
            }
        };

        let attempts = event.attempt + 1;
        let failure = if policy.retry {
            DispatchError::RetryExhausted {
                event_type: event.event_type,
                attempts,
                last: error,
            }
        } else {
            DispatchError::Handler(error)
        };

        if policy.silent {
            tracing::debug!(event_type = %event.event_type, "silent dispatch failed: {failure}");
            return;
        }
        tracing::error!(event_type = %event.event_type, attempts, "dispatch failed: {failure}");

        for handler in &error_handlers {
            if panic::catch_unwind(AssertUnwindSafe(|| (**handler)(&failure, event))).is_err() {
                tracing::error!(event_type = %event.event_type, "error handler panicked");
            }
        }

        // A failing meta event must not produce another one.
        if config.emit_error_events && event.event_type != EventType::SystemError {
            let payload = SystemErrorPayload {
                event_type: event.event_type.to_string(),
                attempts,
                message: failure.to_string(),
            };
            self.dispatch(EventType::SystemError, payload.to_value(), DispatchPolicy::default().silent());
        }
    }

    fn spawn_retry(&self, event: BusEvent, policy: DispatchPolicy, delay: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        self.inner.handle.spawn(async move {
            sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Scheduler { inner }.submit(Pending { event, policy });
            }
        })
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}
