//! Lifecycle coordinator layered on the scheduler.
//!
//! The coordinator is the single writer of the [`Mirror`]:
//! - Validates emitted payloads against the event registry
//! - Subscribes to every model, section, focus and selection event
//! - Updates the mirror first, then emits `sync.ui_required` /
//!   `sync.navigation_required` so consumers reading the mirror from inside
//!   a sync handler always see the state that triggered it
//!
//! # Sub-modules
//!
//! - `mirror`: mirrored state, lifecycle enum and snapshots
//! - `handlers`: one handler per coordinated event type
//!
//! # Usage
//!
//! ```ignore
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//! let coordinator = Coordinator::new(scheduler.clone(), CoordinatorConfig::default());
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::payloads::{EventPayload, SyncReason, SyncRequired, ValidationFailedPayload};
use crate::bus::{
    DispatchPolicy, EventRegistry, EventType, Priority, Scheduler, Subscription, ValidationError,
};

mod handlers;
mod mirror;


pub use mirror::{Mirror, MirrorSnapshot, ModelLifecycle};

const DEFAULT_TRACKING_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub debug: bool,
    pub validate_events: bool,
    /// Emissions kept for `emitted_events`.
    pub tracking_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debug: false,
            validate_events: true,
            tracking_capacity: DEFAULT_TRACKING_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEmission {
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub emitted_at: DateTime<Utc>,
}

/// Which sync signals a mirror write calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SyncPlan {
    pub reason: SyncReason,
    pub ui: bool,
    pub navigation: bool,
}

impl SyncPlan {
    pub fn both(reason: SyncReason) -> Self {
        Self {
            reason,
            ui: true,
            navigation: true,
        }
    }

    pub fn ui(reason: SyncReason) -> Self {
        Self {
            reason,
            ui: true,
            navigation: false,
        }
    }
}

struct CoordinatorInner {
    scheduler: Scheduler,
    mirror: Mutex<Mirror>,
    tracked: Mutex<VecDeque<TrackedEmission>>,
    tracking_capacity: usize,
    debug: AtomicBool,
    validate: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
}

#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    pub fn new(scheduler: Scheduler, config: CoordinatorConfig) -> Self {
        let inner = Arc::new(CoordinatorInner {
            scheduler,
            mirror: Mutex::new(Mirror::default()),
            tracked: Mutex::new(VecDeque::new()),
            tracking_capacity: config.tracking_capacity.max(1),
            debug: AtomicBool::new(config.debug),
            validate: AtomicBool::new(config.validate_events),
            subscriptions: Mutex::new(Vec::new()),
        });

        let subscriptions: Vec<Subscription> = EventType::coordinated()
            .iter()
            .map(|&event_type| {
                let weak = Arc::downgrade(&inner);
                inner.scheduler.subscribe(event_type, move |event| match weak.upgrade() {
                    Some(inner) => handlers::route(&Coordinator { inner }, event),
                    None => Ok(()),
                })
            })
            .collect();
        *inner
            .subscriptions
            .lock()
            .expect("coordinator subscriptions mutex poisoned") = subscriptions;

        tracing::debug!(handlers = EventType::coordinated().len(), "coordinator attached");
        Self { inner }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Detach every coordinator handler from the scheduler.
    pub fn shutdown(&self) {
        let subscriptions = std::mem::take(
            &mut *self
                .inner
                .subscriptions
                .lock()
                .expect("coordinator subscriptions mutex poisoned"),
        );
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }

    /// Validate and publish. Returns `false` when the payload was rejected;
    /// handler failures later on are reported out of band.
    pub fn emit_event(&self, event_type: EventType, data: serde_json::Value, policy: DispatchPolicy) -> bool {
        if self.inner.scheduler.is_destroyed() {
            tracing::debug!(%event_type, "emission after scheduler destroy ignored");
            return false;
        }
        if self.inner.validate.load(Ordering::Relaxed) {
            if let Err(error) = EventRegistry::validate(event_type, &data) {
                tracing::warn!(%event_type, "emission rejected: {}", error.reason);
                self.report_validation_failure(&error);
                return false;
            }
        }

        if self.is_debug_mode() {
            tracing::debug!(%event_type, priority = %policy.priority, payload = %data, "emitting");
        }
        self.track(event_type, &data, policy.priority);
        self.inner.scheduler.dispatch(event_type, data, policy);
        true
    }

    pub fn emit<P: EventPayload>(&self, event_type: EventType, payload: &P, policy: DispatchPolicy) -> bool {
        self.emit_event(event_type, payload.to_value(), policy)
    }

    pub fn current_state(&self) -> Mirror {
        self.mirror().clone()
    }

    pub fn lifecycle(&self) -> ModelLifecycle {
        self.mirror().lifecycle
    }

    pub fn create_snapshot(&self) -> MirrorSnapshot {
        MirrorSnapshot {
            mirror: self.current_state(),
            taken_at: Utc::now(),
        }
    }

    /// Replace the mirror wholesale, then ask consumers to recompute once.
    pub fn restore_snapshot(&self, snapshot: &MirrorSnapshot) {
        {
            let mut mirror = self.mirror();
            *mirror = snapshot.mirror.clone();
        }
        tracing::info!(taken_at = %snapshot.taken_at, "mirror restored from snapshot");
        self.emit_sync(SyncPlan::both(SyncReason::SnapshotRestored));
    }

    pub fn emitted_events(&self) -> Vec<TrackedEmission> {
        self.inner
            .tracked
            .lock()
            .expect("coordinator tracking mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn set_debug_mode(&self, enabled: bool) {
        self.inner.debug.store(enabled, Ordering::Relaxed);
    }

    pub fn is_debug_mode(&self) -> bool {
        self.inner.debug.load(Ordering::Relaxed)
    }

    pub fn set_event_validation(&self, enabled: bool) {
        self.inner.validate.store(enabled, Ordering::Relaxed);
    }

    pub fn is_event_validation_enabled(&self) -> bool {
        self.inner.validate.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Helpers shared with the handlers
    // -----------------------------------------------------------------------

    fn mirror(&self) -> MutexGuard<'_, Mirror> {
        self.inner.mirror.lock().expect("coordinator mirror mutex poisoned")
    }

    /// Apply `write` under the mirror lock. The lock is released before this
    /// returns, so sync events can only be emitted after the write landed.
    pub(crate) fn update_mirror<F>(&self, write: F) -> Result<Option<SyncPlan>, String>
    where
        F: FnOnce(&mut Mirror) -> Result<Option<SyncPlan>, String>,
    {
        let mut mirror = self.mirror();
        write(&mut mirror)
    }

    pub(crate) fn emit_sync(&self, plan: SyncPlan) {
        let model_id = self.mirror().current_model_id.clone();
        let payload = SyncRequired {
            reason: plan.reason,
            model_id,
        };
        if plan.ui {
            self.emit(EventType::UiSyncRequired, &payload, DispatchPolicy::default());
        }
        if plan.navigation {
            self.emit(EventType::NavigationSyncRequired, &payload, DispatchPolicy::default());
        }
    }

    pub(crate) fn report_validation_failure(&self, error: &ValidationError) {
        let payload = ValidationFailedPayload::from(error);
        self.inner.scheduler.dispatch(
            EventType::ValidationFailed,
            payload.to_value(),
            DispatchPolicy::high().silent(),
        );
    }

    fn track(&self, event_type: EventType, payload: &serde_json::Value, priority: Priority) {
        let mut tracked = self
            .inner
            .tracked
            .lock()
            .expect("coordinator tracking mutex poisoned");
        while tracked.len() >= self.inner.tracking_capacity {
            tracked.pop_front();
        }
        tracked.push_back(TrackedEmission {
            event_type,
            payload: payload.clone(),
            priority,
            emitted_at: Utc::now(),
        });
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("lifecycle", &self.lifecycle())
            .field("debug", &self.is_debug_mode())
            .finish_non_exhaustive()
    }
}
