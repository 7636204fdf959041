//! Common utilities for viewer integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use geoview_lib::bus::payloads::{Section, SyncReason, SyncRequired};
use geoview_lib::{EventType, Viewer, ViewerConfig};

pub fn viewer() -> Viewer {
    Viewer::new(&ViewerConfig::default()).expect("viewer inside tokio runtime")
}

pub fn gearbox() -> Vec<Section> {
    vec![
        Section::new("housing", "Housing").with_objects(["h-1", "h-2"]),
        Section::new("shaft", "Input shaft").with_objects(["s-1"]),
        Section::new("gears", "Gear train").with_objects(["g-1", "g-2", "g-3"]),
    ]
}

pub async fn settle(ms: u64) {
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
}

/// What a sync subscriber saw when it read the coordinator mirror from
/// inside its own handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncObservation {
    pub event_type: EventType,
    pub reason: SyncReason,
    pub sections_seen: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SyncLog {
    seen: Arc<Mutex<Vec<SyncObservation>>>,
}

impl SyncLog {
    pub fn attach(viewer: &Viewer) -> Self {
        let log = Self::default();
        for event_type in [EventType::UiSyncRequired, EventType::NavigationSyncRequired] {
            let seen = log.seen.clone();
            let coordinator = viewer.coordinator.clone();
            let _ = viewer.scheduler.subscribe(event_type, move |event| {
                let sync: SyncRequired = event.decode()?;
                seen.lock().unwrap().push(SyncObservation {
                    event_type,
                    reason: sync.reason,
                    sections_seen: coordinator.current_state().sections.len(),
                });
                Ok(())
            });
        }
        log
    }

    pub fn observations(&self) -> Vec<SyncObservation> {
        self.seen.lock().unwrap().clone()
    }

    pub fn reasons(&self, event_type: EventType) -> Vec<SyncReason> {
        self.observations()
            .into_iter()
            .filter(|o| o.event_type == event_type)
            .map(|o| o.reason)
            .collect()
    }
}
