//! One handler per coordinated event type.
//!
//! Every handler follows the same shape: decode, write the mirror under its
//! lock, release, then publish sync signals. A write the current lifecycle
//! does not allow is rejected with a `validation.failed` diagnostic rather
//! than a handler failure, so it never triggers retries.

use std::collections::BTreeSet;

use crate::bus::payloads::{self, decode_payload, SyncReason};
use crate::bus::{BusEvent, EventType, HandlerResult, ValidationError};

use super::mirror::{Mirror, ModelLifecycle};
use super::{Coordinator, SyncPlan};

type Transition = Result<Option<SyncPlan>, String>;

pub(super) fn route(coordinator: &Coordinator, event: &BusEvent) -> HandlerResult {
    if coordinator.is_debug_mode() {
        tracing::debug!(event_type = %event.event_type, seq = event.seq, "coordinator handling");
    }

    let transition = match event.event_type {
        EventType::ModelLoadStarted => model_load_started(coordinator, event)?,
        EventType::ModelLoaded => model_loaded(coordinator, event)?,
        EventType::ModelLoadFailed => model_load_failed(coordinator, event)?,
        EventType::ModelUnloaded => model_unloaded(coordinator, event)?,
        EventType::SectionsDiscovered => sections_discovered(coordinator, event)?,
        EventType::SectionSelected => section_selected(coordinator, event)?,
        EventType::SectionDeselected => section_deselected(coordinator, event)?,
        EventType::SectionIsolated => section_isolated(coordinator, event)?,
        EventType::IsolationCleared => isolation_cleared(coordinator),
        EventType::SectionHighlighted => section_highlighted(coordinator, event)?,
        EventType::FocusEntered => focus_entered(coordinator, event)?,
        EventType::FocusExited => focus_exited(coordinator),
        EventType::ObjectSelected => object_selected(coordinator, event)?,
        EventType::ObjectDeselected => object_deselected(coordinator, event)?,
        EventType::SelectionCleared => selection_cleared(coordinator),
        other => {
            tracing::trace!(event_type = %other, "not a coordinated event");
            return Ok(());
        }
    };

    finish(coordinator, event, transition);
    Ok(())
}

fn finish(coordinator: &Coordinator, event: &BusEvent, transition: Transition) {
    match transition {
        Ok(Some(plan)) => coordinator.emit_sync(plan),
        Ok(None) => {
            if coordinator.is_debug_mode() {
                tracing::debug!(event_type = %event.event_type, "mirror unchanged");
            }
        }
        Err(reason) => {
            tracing::warn!(
                event_type = %event.event_type,
                lifecycle = %coordinator.lifecycle(),
                "rejected: {reason}"
            );
            coordinator.report_validation_failure(&ValidationError::new(event.event_type, reason));
        }
    }
}

fn require_loaded(mirror: &Mirror) -> Result<(), String> {
    if mirror.is_loaded() {
        Ok(())
    } else {
        Err(format!("no model loaded (lifecycle is {})", mirror.lifecycle))
    }
}

fn require_section(mirror: &Mirror, section_id: &str) -> Result<(), String> {
    if mirror.has_section(section_id) {
        Ok(())
    } else {
        Err(format!("unknown section: {section_id}"))
    }
}

fn require_current_load(mirror: &Mirror, model_id: &str) -> Result<(), String> {
    if mirror.lifecycle != ModelLifecycle::Loading {
        return Err(format!("model {model_id} is not loading (lifecycle is {})", mirror.lifecycle));
    }
    if !mirror.is_current_model(model_id) {
        return Err(format!("stale event for model {model_id}"));
    }
    Ok(())
}

fn changed(changed: bool, plan: SyncPlan) -> Transition {
    Ok(changed.then_some(plan))
}

// ---------------------------------------------------------------------------
// Model lifecycle
// ---------------------------------------------------------------------------

fn model_load_started(coordinator: &Coordinator, event: &BusEvent) -> Result<Transition, ValidationError> {
    let payload: payloads::ModelLoadStarted = decode_payload(event.event_type, &event.payload)?;
    Ok(coordinator.update_mirror(|mirror| {
        if mirror.lifecycle == ModelLifecycle::Loading {
            tracing::info!(
                superseded = mirror.current_model_id.as_deref().unwrap_or_default(),
                model_id = %payload.model_id,
                "new load supersedes pending load"
            );
        }
        mirror.clear_scene();
        mirror.lifecycle = ModelLifecycle::Loading;
        mirror.current_model_id = Some(payload.model_id.clone());
        Ok(Some(SyncPlan::both(SyncReason::ModelLoading)))
    }))
}

fn model_loaded(coordinator: &Coordinator, event: &BusEvent) -> Result<Transition, ValidationError> {
    let payload: payloads::ModelLoaded = decode_payload(event.event_type, &event.payload)?;
    Ok(coordinator.update_mirror(|mirror| {
        require_current_load(mirror, &payload.model_id)?;
        if !payload.sections.is_empty() {
            mirror.replace_sections(payload.sections);
        }
        mirror.lifecycle = ModelLifecycle::Loaded;
        tracing::info!(model_id = %payload.model_id, sections = mirror.sections.len(), "model loaded");
        Ok(Some(SyncPlan::both(SyncReason::ModelLoaded)))
    }))
}

fn model_load_failed(coordinator: &Coordinator, event: &BusEvent) -> Result<Transition, ValidationError> {
    let payload: payloads::ModelLoadFailed = decode_payload(event.event_type, &event.payload)?;
    Ok(coordinator.update_mirror(|mirror| {
        require_current_load(mirror, &payload.model_id)?;
        tracing::warn!(model_id = %payload.model_id, error = %payload.error, "model load failed");
        mirror.reset();
        Ok(Some(SyncPlan::ui(SyncReason::ModelLoadFailed)))
    }))
}

fn model_unloaded(coordinator: &Coordinator, event: &BusEvent) -> Result<Transition, ValidationError> {
    let payload: payloads::ModelUnloaded = decode_payload(event.event_type, &event.payload)?;
    Ok(coordinator.update_mirror(|mirror| {
        if mirror.lifecycle == ModelLifecycle::Idle {
            return Ok(None);
        }
        if let Some(model_id) = payload.model_id.as_deref() {
            if !mirror.is_current_model(model_id) {
                return Err(format!("stale unload for model {model_id}"));
            }
        }
        mirror.reset();
        Ok(Some(SyncPlan::both(SyncReason::ModelUnloaded)))
    }))
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

fn sections_discovered(coordinator: &Coordinator, event: &BusEvent) -> Result<Transition, ValidationError> {
    let payload: payloads::SectionsDiscovered = decode_payload(event.event_type, &event.payload)?;
    Ok(coordinator.update_mirror(|mirror| {
        if mirror.lifecycle == ModelLifecycle::Idle {
            return Err("sections discovered with no model".to_string());
        }
        if !mirror.is_current_model(&payload.model_id) {
            return Err(format!("stale sections for model {}", payload.model_id));
        }
        mirror.replace_sections(payload.sections);
        Ok(Some(SyncPlan::both(SyncReason::SectionsDiscovered)))
    }))
}

fn section_selected(coordinator: &Coordinator, event: &BusEvent) -> Result<Transition, ValidationError> {
    let payload: payloads::SectionRef = decode_payload(event.event_type, &event.payload)?;
    Ok(coordinator.update_mirror(|mirror| {
        require_loaded(mirror)?;
        require_section(mirror, &payload.section_id)?;
        let inserted = mirror.selected_ids.insert(payload.section_id);
        changed(inserted, SyncPlan::both(SyncReason::SelectionChanged))
    }))
}

fn section_deselected(coordinator: &Coordinator, event: &BusEvent) -> Result<Transition, ValidationError> {
    let payload: payloads::SectionRef = decode_payload(event.event_type, &event.payload)?;
    Ok(coordinator.update_mirror(|mirror| {
        require_loaded(mirror)?;
        require_section(mirror, &payload.section_id)?;
        let removed = mirror.selected_ids.remove(&payload.section_id);
        changed(removed, SyncPlan::both(SyncReason::SelectionChanged))
    }))
}

fn section_isolated(coordinator: &Coordinator, event: &BusEvent) -> Result<Transition, ValidationError> {
    let payload: payloads::SectionsIsolated = decode_payload(event.event_type, &event.payload)?;
    Ok(coordinator.update_mirror(|mirror| {
        require_loaded(mirror)?;
        for section_id in &payload.section_ids {
            require_section(mirror, section_id)?;
        }
        let isolated: BTreeSet<String> = payload.section_ids.into_iter().collect();
        let updated = isolated != mirror.isolated_ids;
        mirror.isolated_ids = isolated;
        changed(updated, SyncPlan::both(SyncReason::IsolationChanged))
    }))
}

fn isolation_cleared(coordinator: &Coordinator) -> Transition {
    coordinator.update_mirror(|mirror| {
        let had_isolation = !mirror.isolated_ids.is_empty();
        mirror.isolated_ids.clear();
        changed(had_isolation, SyncPlan::both(SyncReason::IsolationChanged))
    })
}

fn section_highlighted(coordinator: &Coordinator, event: &BusEvent) -> Result<Transition, ValidationError> {
    let payload: payloads::SectionHighlighted = decode_payload(event.event_type, &event.payload)?;
    Ok(coordinator.update_mirror(|mirror| {
        require_loaded(mirror)?;
        require_section(mirror, &payload.section_id)?;
        let updated = if payload.highlighted {
            mirror.highlighted_ids.insert(payload.section_id)
        } else {
            mirror.highlighted_ids.remove(&payload.section_id)
        };
        // Highlighting never moves the camera.
        changed(updated, SyncPlan::ui(SyncReason::HighlightChanged))
    }))
}

// ---------------------------------------------------------------------------
// Focus and objects
// ---------------------------------------------------------------------------

fn focus_entered(coordinator: &Coordinator, event: &BusEvent) -> Result<Transition, ValidationError> {
    let payload: payloads::FocusEntered = decode_payload(event.event_type, &event.payload)?;
    Ok(coordinator.update_mirror(|mirror| {
        require_loaded(mirror)?;
        let moved = mirror.focused_id.as_deref() != Some(payload.node_id.as_str());
        mirror.focused_id = Some(payload.node_id);
        changed(moved, SyncPlan::both(SyncReason::FocusChanged))
    }))
}

fn focus_exited(coordinator: &Coordinator) -> Transition {
    coordinator.update_mirror(|mirror| {
        let had_focus = mirror.focused_id.take().is_some();
        changed(had_focus, SyncPlan::both(SyncReason::FocusChanged))
    })
}

fn object_selected(coordinator: &Coordinator, event: &BusEvent) -> Result<Transition, ValidationError> {
    let payload: payloads::ObjectsSelected = decode_payload(event.event_type, &event.payload)?;
    Ok(coordinator.update_mirror(|mirror| {
        require_loaded(mirror)?;
        let before = mirror.selected_ids.clone();
        if !payload.additive {
            mirror.selected_ids.clear();
        }
        mirror.selected_ids.extend(payload.object_ids);
        changed(before != mirror.selected_ids, SyncPlan::both(SyncReason::SelectionChanged))
    }))
}

fn object_deselected(coordinator: &Coordinator, event: &BusEvent) -> Result<Transition, ValidationError> {
    let payload: payloads::ObjectsDeselected = decode_payload(event.event_type, &event.payload)?;
    Ok(coordinator.update_mirror(|mirror| {
        let mut removed = false;
        for object_id in &payload.object_ids {
            removed |= mirror.selected_ids.remove(object_id);
        }
        changed(removed, SyncPlan::both(SyncReason::SelectionChanged))
    }))
}

fn selection_cleared(coordinator: &Coordinator) -> Transition {
    coordinator.update_mirror(|mirror| {
        let had_selection = !mirror.selected_ids.is_empty();
        mirror.selected_ids.clear();
        changed(had_selection, SyncPlan::both(SyncReason::SelectionChanged))
    })
}
