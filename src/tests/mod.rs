//! Shared helpers for the unit tests.
//!
//! Recorders capture what handlers observed so tests can assert on order,
//! payloads and timing without sleeping on wall-clock time.

use std::sync::{Arc, Mutex};

use tokio::time::{Duration, Instant};

use crate::bus::{BusEvent, EventType, HandlerResult, Scheduler, SchedulerConfig, Subscription};

#[derive(Debug, Clone)]
pub struct Observed {
    pub event: BusEvent,
    pub at: Instant,
}

/// Records every event delivered to the handlers it installs.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Observed>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, scheduler: &Scheduler, event_type: EventType) -> Subscription {
        let seen = self.seen.clone();
        scheduler.subscribe(event_type, move |event| {
            seen.lock().unwrap().push(Observed {
                event: event.clone(),
                at: Instant::now(),
            });
            Ok(())
        })
    }

    /// Install a handler that records and then returns `outcome`.
    pub fn attach_with<F>(&self, scheduler: &Scheduler, event_type: EventType, outcome: F) -> Subscription
    where
        F: Fn(&BusEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let seen = self.seen.clone();
        scheduler.subscribe(event_type, move |event| {
            seen.lock().unwrap().push(Observed {
                event: event.clone(),
                at: Instant::now(),
            });
            outcome(event)
        })
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.seen.lock().unwrap().iter().map(|o| o.event.clone()).collect()
    }

    pub fn types(&self) -> Vec<EventType> {
        self.seen.lock().unwrap().iter().map(|o| o.event.event_type).collect()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn count_of(&self, event_type: EventType) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.event.event_type == event_type)
            .count()
    }

    /// Gaps between consecutive observations.
    pub fn gaps(&self) -> Vec<Duration> {
        let seen = self.seen.lock().unwrap();
        seen.windows(2).map(|pair| pair[1].at - pair[0].at).collect()
    }
}

pub fn scheduler() -> Scheduler {
    Scheduler::new(SchedulerConfig::default()).expect("tests run inside a tokio runtime")
}

/// Let paused-clock timers and yielded drains run.
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
