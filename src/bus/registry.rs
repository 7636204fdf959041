//! Per-type payload validators.
//!
//! Pure data: the match in [`EventRegistry::validator`] is exhaustive, so a
//! new [`EventType`] variant does not compile until it is given a shape.

use serde_json::Value;

use super::error::ValidationError;
use super::event_types::EventType;
use super::payloads::{
    decode_payload, Empty, EventPayload, FocusEntered, ModelLoadFailed, ModelLoadStarted,
    ModelLoaded, ModelUnloaded, NodeToggled, ObjectsDeselected, ObjectsSelected, SearchChanged,
    SectionHighlighted, SectionRef, SectionsDiscovered, SectionsIsolated, SyncRequired,
    ViewportChanged, VisibilityChanged,
};

pub type Validator = fn(EventType, &Value) -> Result<(), ValidationError>;

fn shape<P: EventPayload>(event_type: EventType, value: &Value) -> Result<(), ValidationError> {
    decode_payload::<P>(event_type, value).map(|_| ())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventRegistry;

impl EventRegistry {
    /// Validator for `event_type`, or `None` for leniently accepted types.
    pub fn validator(event_type: EventType) -> Option<Validator> {
        let validator: Validator = match event_type {
            EventType::ModelLoadStarted => shape::<ModelLoadStarted>,
            EventType::ModelLoaded => shape::<ModelLoaded>,
            EventType::ModelLoadFailed => shape::<ModelLoadFailed>,
            EventType::ModelUnloaded => shape::<ModelUnloaded>,
            EventType::SectionsDiscovered => shape::<SectionsDiscovered>,
            EventType::SectionSelected | EventType::SectionDeselected => shape::<SectionRef>,
            EventType::SectionIsolated => shape::<SectionsIsolated>,
            EventType::SectionHighlighted => shape::<SectionHighlighted>,
            EventType::IsolationCleared | EventType::FocusExited | EventType::SelectionCleared => {
                shape::<Empty>
            }
            EventType::FocusEntered => shape::<FocusEntered>,
            EventType::ObjectSelected => shape::<ObjectsSelected>,
            EventType::ObjectDeselected => shape::<ObjectsDeselected>,
            EventType::NodeToggled => shape::<NodeToggled>,
            EventType::VisibilityChanged => shape::<VisibilityChanged>,
            EventType::SearchChanged => shape::<SearchChanged>,
            EventType::ViewportChanged => shape::<ViewportChanged>,
            EventType::UiSyncRequired | EventType::NavigationSyncRequired => shape::<SyncRequired>,
            EventType::SystemError | EventType::ValidationFailed => return None,
        };
        Some(validator)
    }

    pub fn has_validator(event_type: EventType) -> bool {
        Self::validator(event_type).is_some()
    }

    pub fn validate(event_type: EventType, payload: &Value) -> Result<(), ValidationError> {
        match Self::validator(event_type) {
            Some(validator) => validator(event_type, payload),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn accepts_well_formed_model_loaded() {
        let payload = json!({
            "model_id": "bracket-01",
            "sections": [
                { "id": "s1", "name": "Flange", "object_ids": ["m1", "m2"] },
                { "id": "s2", "name": "Web" }
            ]
        });
        assert!(EventRegistry::validate(EventType::ModelLoaded, &payload).is_ok());
    }

    #[test]
    fn rejects_duplicate_section_ids() {
        let payload = json!({
            "model_id": "bracket-01",
            "sections": [{ "id": "s1" }, { "id": "s1" }]
        });
        let err = EventRegistry::validate(EventType::SectionsDiscovered, &payload).unwrap_err();
        assert_eq!(err.event_type, EventType::SectionsDiscovered);
        assert!(err.reason.contains("duplicate"));
    }

    #[test]
    fn rejects_blank_ids_and_wrong_shapes() {
        assert!(EventRegistry::validate(EventType::FocusEntered, &json!({ "node_id": "  " })).is_err());
        assert!(EventRegistry::validate(EventType::ObjectSelected, &json!({ "object_ids": [] })).is_err());
        assert!(EventRegistry::validate(EventType::SectionSelected, &json!("s1")).is_err());
        assert!(EventRegistry::validate(EventType::ViewportChanged, &json!({ "camera": 3 })).is_err());
    }

    #[test]
    fn system_events_are_lenient() {
        assert!(!EventRegistry::has_validator(EventType::ValidationFailed));
        assert!(EventRegistry::validate(EventType::SystemError, &json!(null)).is_ok());
        for event_type in EventType::all() {
            if event_type.category() != crate::bus::event_types::CATEGORY_SYSTEM {
                assert!(EventRegistry::has_validator(*event_type), "{event_type} has no validator");
            }
        }
    }
}
