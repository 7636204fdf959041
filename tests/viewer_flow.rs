// tests/viewer_flow.rs
//! End-to-end flows through the public API: actions in, mirror and sync
//! events out.

mod common;

use std::io::Write;
use std::sync::{Arc, Mutex};

use geoview_lib::bus::payloads::SyncReason;
use geoview_lib::bus::HandlerError;
use geoview_lib::{
    DispatchError, DispatchPolicy, EventType, HistoryFilter, ModelLifecycle, Priority, Viewer, ViewerConfig,
};
use pretty_assertions::assert_eq;
use serde_json::json;

use common::{gearbox, settle, viewer, SyncLog, SyncObservation};

#[tokio::test(start_paused = true)]
async fn model_load_publishes_syncs_after_mirror_is_populated() {
    let viewer = viewer();
    let log = SyncLog::attach(&viewer);

    assert!(viewer.actions.begin_model_load("gearbox", Some("parts/gearbox.step")));
    assert!(viewer.actions.complete_model_load("gearbox", gearbox()));
    settle(10).await;

    assert_eq!(viewer.coordinator.lifecycle(), ModelLifecycle::Loaded);
    let loaded: Vec<SyncObservation> = log
        .observations()
        .into_iter()
        .filter(|o| o.reason == SyncReason::ModelLoaded)
        .collect();
    assert_eq!(loaded.len(), 2);
    assert!(loaded.iter().all(|o| o.sections_seen == 3));
}

#[tokio::test(start_paused = true)]
async fn section_actions_drive_the_mirror() {
    let viewer = viewer();
    viewer.actions.begin_model_load("gearbox", None);
    viewer.actions.complete_model_load("gearbox", gearbox());
    settle(10).await;

    assert!(viewer.actions.select_section("shaft"));
    assert!(viewer.actions.isolate_sections(["gears", "housing"]));
    assert!(viewer.actions.highlight_section("gears", true));
    assert!(viewer.actions.focus_node("g-2"));
    settle(200).await;

    let state = viewer.coordinator.current_state();
    assert!(state.selected_ids.contains("shaft"));
    assert_eq!(state.isolated_ids.len(), 2);
    assert!(state.highlighted_ids.contains("gears"));
    assert_eq!(state.focused_id.as_deref(), Some("g-2"));

    assert!(viewer.actions.clear_isolation());
    assert!(viewer.actions.exit_focus());
    settle(10).await;
    let state = viewer.coordinator.current_state();
    assert!(state.isolated_ids.is_empty());
    assert_eq!(state.focused_id, None);
}

#[tokio::test(start_paused = true)]
async fn failing_sibling_subscriber_exhausts_retries_without_blocking_coordinator() {
    let viewer = viewer();
    viewer.actions.begin_model_load("gearbox", None);
    viewer.actions.complete_model_load("gearbox", gearbox());
    settle(10).await;

    let failures: Arc<Mutex<Vec<DispatchError>>> = Arc::default();
    let sink = failures.clone();
    let _ = viewer.scheduler.on_error(move |error, _| {
        sink.lock().unwrap().push(error.clone());
    });
    let _ = viewer.scheduler.subscribe(EventType::SectionSelected, |_| {
        Err(HandlerError::failed("outline pass unavailable"))
    });

    assert!(viewer.actions.select_section("housing"));
    settle(2_000).await;

    assert!(viewer.coordinator.current_state().selected_ids.contains("housing"));
    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        DispatchError::RetryExhausted {
            event_type: EventType::SectionSelected,
            attempts: 4,
            ..
        }
    ));
    let attempts = viewer
        .scheduler
        .history(&HistoryFilter::of_type(EventType::SectionSelected))
        .len();
    assert_eq!(attempts, 4);
}

#[tokio::test(start_paused = true)]
async fn snapshot_restore_emits_one_sync_of_each_kind() {
    let viewer = viewer();
    viewer.actions.begin_model_load("gearbox", None);
    viewer.actions.complete_model_load("gearbox", gearbox());
    viewer.actions.select_section("gears");
    settle(10).await;

    let before = viewer.coordinator.current_state();
    let snapshot = viewer.coordinator.create_snapshot();
    viewer.actions.unload_model(Some("gearbox"));
    settle(10).await;
    assert_eq!(viewer.coordinator.lifecycle(), ModelLifecycle::Idle);

    let log = SyncLog::attach(&viewer);
    viewer.coordinator.restore_snapshot(&snapshot);
    settle(10).await;

    assert_eq!(viewer.coordinator.current_state(), before);
    assert_eq!(log.reasons(EventType::UiSyncRequired), vec![SyncReason::SnapshotRestored]);
    assert_eq!(
        log.reasons(EventType::NavigationSyncRequired),
        vec![SyncReason::SnapshotRestored]
    );
}

#[tokio::test(start_paused = true)]
async fn high_priority_nested_dispatch_runs_before_queued_normals() {
    let viewer = viewer();
    let order: Arc<Mutex<Vec<EventType>>> = Arc::default();

    let scheduler = viewer.scheduler.clone();
    let _ = viewer.scheduler.subscribe(EventType::ViewportChanged, move |_| {
        for i in 0..10 {
            scheduler.dispatch(
                EventType::NodeToggled,
                json!({ "node_id": format!("n{i}"), "expanded": true }),
                DispatchPolicy::default(),
            );
        }
        scheduler.dispatch(EventType::FocusExited, json!({}), DispatchPolicy::high());
        Ok(())
    });
    for event_type in [EventType::NodeToggled, EventType::FocusExited] {
        let order = order.clone();
        let _ = viewer.scheduler.subscribe(event_type, move |event| {
            order.lock().unwrap().push(event.event_type);
            Ok(())
        });
    }

    viewer
        .scheduler
        .dispatch(EventType::ViewportChanged, json!({ "camera": {} }), DispatchPolicy::default());
    settle(10).await;

    let order = order.lock().unwrap();
    assert_eq!(order.len(), 11);
    assert_eq!(order[0], EventType::FocusExited);
    let focus = viewer.scheduler.history(&HistoryFilter::of_type(EventType::FocusExited));
    assert_eq!(focus[0].priority, Priority::High);
}

#[tokio::test(start_paused = true)]
async fn throttled_selection_from_actions_runs_once() {
    let viewer = viewer();
    viewer.actions.begin_model_load("gearbox", None);
    viewer.actions.complete_model_load("gearbox", gearbox());
    settle(10).await;

    viewer.actions.select_nodes(["h-1"], false);
    settle(20).await;
    viewer.actions.select_nodes(["h-2"], false);
    settle(100).await;

    let selected = viewer.scheduler.history(&HistoryFilter::of_type(EventType::ObjectSelected));
    assert_eq!(selected.len(), 1);
    assert_eq!(
        viewer.coordinator.current_state().selected_ids.into_iter().collect::<Vec<_>>(),
        vec!["h-1"]
    );
}

#[tokio::test(start_paused = true)]
async fn config_file_shapes_the_viewer() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "scheduler": {{ "max_history_size": 5 }}, "coordinator": {{ "validate_events": false }} }}"#
    )
    .unwrap();
    let config = ViewerConfig::from_file(file.path()).unwrap();
    let viewer = Viewer::new(&config).unwrap();

    for i in 0..8 {
        viewer.actions.toggle_node(&format!("n{i}"));
    }
    settle(10).await;

    assert_eq!(viewer.scheduler.history(&HistoryFilter::default()).len(), 5);
    assert!(!viewer.coordinator.is_event_validation_enabled());

    viewer.shutdown();
    assert!(viewer.scheduler.is_destroyed());
    assert!(!viewer.actions.search("after shutdown"));
}
