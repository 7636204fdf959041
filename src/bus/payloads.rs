//! Typed payload records for every event type.
//!
//! On the wire a payload is an opaque `serde_json::Value`; these records are
//! the shapes the registry validates against and the coordinator decodes.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use super::event_types::EventType;

pub const MAX_SEARCH_QUERY_LEN: usize = 256;

/// A payload shape with its own semantic checks on top of the serde shape.
pub trait EventPayload: Serialize + DeserializeOwned {
    fn check(&self, _event_type: EventType) -> Result<(), ValidationError> {
        Ok(())
    }

    fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Decode `value` as `P` and run its checks.
pub fn decode_payload<P: EventPayload>(
    event_type: EventType,
    value: &serde_json::Value,
) -> Result<P, ValidationError> {
    let payload: P = serde_json::from_value(value.clone())
        .map_err(|e| ValidationError::new(event_type, e.to_string()))?;
    payload.check(event_type)?;
    Ok(payload)
}

fn require_id(event_type: EventType, field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(event_type, format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_ids(event_type: EventType, field: &str, values: &[String]) -> Result<(), ValidationError> {
    if values.is_empty() {
        return Err(ValidationError::new(event_type, format!("{field} must not be empty")));
    }
    for value in values {
        require_id(event_type, field, value)?;
    }
    Ok(())
}

fn check_sections(event_type: EventType, sections: &[Section]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(sections.len());
    for section in sections {
        require_id(event_type, "section id", &section.id)?;
        if !seen.insert(section.id.as_str()) {
            return Err(ValidationError::new(
                event_type,
                format!("duplicate section id: {}", section.id),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub object_ids: Vec<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl Section {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            object_ids: Vec::new(),
            parent_id: None,
        }
    }

    pub fn with_objects<I, S>(mut self, object_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_ids = object_ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Why consumers are being asked to resynchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReason {
    ModelLoading,
    ModelLoaded,
    ModelLoadFailed,
    ModelUnloaded,
    SectionsDiscovered,
    SelectionChanged,
    IsolationChanged,
    HighlightChanged,
    FocusChanged,
    SnapshotRestored,
}

// ---------------------------------------------------------------------------
// Model lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLoadStarted {
    pub model_id: String,
    #[serde(default)]
    pub source: Option<String>,
}

impl EventPayload for ModelLoadStarted {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        require_id(event_type, "model_id", &self.model_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLoaded {
    pub model_id: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl EventPayload for ModelLoaded {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        require_id(event_type, "model_id", &self.model_id)?;
        check_sections(event_type, &self.sections)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLoadFailed {
    pub model_id: String,
    #[serde(default)]
    pub error: String,
}

impl EventPayload for ModelLoadFailed {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        require_id(event_type, "model_id", &self.model_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUnloaded {
    #[serde(default)]
    pub model_id: Option<String>,
}

impl EventPayload for ModelUnloaded {}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionsDiscovered {
    pub model_id: String,
    pub sections: Vec<Section>,
}

impl EventPayload for SectionsDiscovered {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        require_id(event_type, "model_id", &self.model_id)?;
        check_sections(event_type, &self.sections)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRef {
    pub section_id: String,
}

impl EventPayload for SectionRef {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        require_id(event_type, "section_id", &self.section_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionsIsolated {
    pub section_ids: Vec<String>,
}

impl EventPayload for SectionsIsolated {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        require_ids(event_type, "section_ids", &self.section_ids)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionHighlighted {
    pub section_id: String,
    #[serde(default = "default_true")]
    pub highlighted: bool,
}

fn default_true() -> bool {
    true
}

impl EventPayload for SectionHighlighted {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        require_id(event_type, "section_id", &self.section_id)
    }
}

/// Payload for events that carry no data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

impl EventPayload for Empty {}

// ---------------------------------------------------------------------------
// Focus, objects and navigation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusEntered {
    pub node_id: String,
}

impl EventPayload for FocusEntered {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        require_id(event_type, "node_id", &self.node_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectsSelected {
    pub object_ids: Vec<String>,
    #[serde(default)]
    pub additive: bool,
}

impl EventPayload for ObjectsSelected {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        require_ids(event_type, "object_ids", &self.object_ids)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectsDeselected {
    pub object_ids: Vec<String>,
}

impl EventPayload for ObjectsDeselected {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        require_ids(event_type, "object_ids", &self.object_ids)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeToggled {
    pub node_id: String,
    pub expanded: bool,
}

impl EventPayload for NodeToggled {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        require_id(event_type, "node_id", &self.node_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityChanged {
    pub node_ids: Vec<String>,
    pub visible: bool,
}

impl EventPayload for VisibilityChanged {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        require_ids(event_type, "node_ids", &self.node_ids)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchChanged {
    pub query: String,
}

impl EventPayload for SearchChanged {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        if self.query.chars().count() > MAX_SEARCH_QUERY_LEN {
            return Err(ValidationError::new(
                event_type,
                format!("query longer than {MAX_SEARCH_QUERY_LEN} characters"),
            ));
        }
        Ok(())
    }
}

/// Camera parameters are owned by the renderer and carried opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportChanged {
    pub camera: serde_json::Value,
}

impl EventPayload for ViewportChanged {
    fn check(&self, event_type: EventType) -> Result<(), ValidationError> {
        if !self.camera.is_object() {
            return Err(ValidationError::new(event_type, "camera must be an object"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sync and system
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequired {
    pub reason: SyncReason,
    #[serde(default)]
    pub model_id: Option<String>,
}

impl EventPayload for SyncRequired {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemErrorPayload {
    pub event_type: String,
    pub attempts: u32,
    pub message: String,
}

impl EventPayload for SystemErrorPayload {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailedPayload {
    pub event_type: String,
    pub reason: String,
}

impl EventPayload for ValidationFailedPayload {}

impl From<&ValidationError> for ValidationFailedPayload {
    fn from(value: &ValidationError) -> Self {
        Self {
            event_type: value.event_type.to_string(),
            reason: value.reason.clone(),
        }
    }
}
