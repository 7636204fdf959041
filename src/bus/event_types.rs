//! Event type catalog and categories.
//!
//! Single source of truth for every event identifier the scheduler and the
//! coordinator understand. Payload shapes live in [`super::payloads`] and the
//! per-type validators in [`super::registry`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

pub const CATEGORY_MODEL: &str = "model";
pub const CATEGORY_SECTION: &str = "section";
pub const CATEGORY_FOCUS: &str = "focus";
pub const CATEGORY_OBJECT: &str = "object";
pub const CATEGORY_SELECTION: &str = "selection";
pub const CATEGORY_NAVIGATION: &str = "navigation";
pub const CATEGORY_VIEW: &str = "view";
pub const CATEGORY_SYNC: &str = "sync";
pub const CATEGORY_SYSTEM: &str = "system";

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "model.load_started")]
    ModelLoadStarted,
    #[serde(rename = "model.loaded")]
    ModelLoaded,
    #[serde(rename = "model.load_failed")]
    ModelLoadFailed,
    #[serde(rename = "model.unloaded")]
    ModelUnloaded,
    #[serde(rename = "section.discovered")]
    SectionsDiscovered,
    #[serde(rename = "section.selected")]
    SectionSelected,
    #[serde(rename = "section.deselected")]
    SectionDeselected,
    #[serde(rename = "section.isolated")]
    SectionIsolated,
    #[serde(rename = "section.highlighted")]
    SectionHighlighted,
    #[serde(rename = "section.isolation_cleared")]
    IsolationCleared,
    #[serde(rename = "focus.entered")]
    FocusEntered,
    #[serde(rename = "focus.exited")]
    FocusExited,
    #[serde(rename = "object.selected")]
    ObjectSelected,
    #[serde(rename = "object.deselected")]
    ObjectDeselected,
    #[serde(rename = "selection.cleared")]
    SelectionCleared,
    #[serde(rename = "navigation.node_toggled")]
    NodeToggled,
    #[serde(rename = "view.visibility_changed")]
    VisibilityChanged,
    #[serde(rename = "view.search_changed")]
    SearchChanged,
    #[serde(rename = "view.viewport_changed")]
    ViewportChanged,
    #[serde(rename = "sync.ui_required")]
    UiSyncRequired,
    #[serde(rename = "sync.navigation_required")]
    NavigationSyncRequired,
    #[serde(rename = "system.error")]
    SystemError,
    #[serde(rename = "system.validation_failed")]
    ValidationFailed,
}

impl EventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ModelLoadStarted => "model.load_started",
            Self::ModelLoaded => "model.loaded",
            Self::ModelLoadFailed => "model.load_failed",
            Self::ModelUnloaded => "model.unloaded",
            Self::SectionsDiscovered => "section.discovered",
            Self::SectionSelected => "section.selected",
            Self::SectionDeselected => "section.deselected",
            Self::SectionIsolated => "section.isolated",
            Self::SectionHighlighted => "section.highlighted",
            Self::IsolationCleared => "section.isolation_cleared",
            Self::FocusEntered => "focus.entered",
            Self::FocusExited => "focus.exited",
            Self::ObjectSelected => "object.selected",
            Self::ObjectDeselected => "object.deselected",
            Self::SelectionCleared => "selection.cleared",
            Self::NodeToggled => "navigation.node_toggled",
            Self::VisibilityChanged => "view.visibility_changed",
            Self::SearchChanged => "view.search_changed",
            Self::ViewportChanged => "view.viewport_changed",
            Self::UiSyncRequired => "sync.ui_required",
            Self::NavigationSyncRequired => "sync.navigation_required",
            Self::SystemError => "system.error",
            Self::ValidationFailed => "system.validation_failed",
        }
    }

    pub const fn category(&self) -> &'static str {
        match self {
            Self::ModelLoadStarted | Self::ModelLoaded | Self::ModelLoadFailed | Self::ModelUnloaded => {
                CATEGORY_MODEL
            }
            Self::SectionsDiscovered
            | Self::SectionSelected
            | Self::SectionDeselected
            | Self::SectionIsolated
            | Self::SectionHighlighted
            | Self::IsolationCleared => CATEGORY_SECTION,
            Self::FocusEntered | Self::FocusExited => CATEGORY_FOCUS,
            Self::ObjectSelected | Self::ObjectDeselected => CATEGORY_OBJECT,
            Self::SelectionCleared => CATEGORY_SELECTION,
            Self::NodeToggled => CATEGORY_NAVIGATION,
            Self::VisibilityChanged | Self::SearchChanged | Self::ViewportChanged => CATEGORY_VIEW,
            Self::UiSyncRequired | Self::NavigationSyncRequired => CATEGORY_SYNC,
            Self::SystemError | Self::ValidationFailed => CATEGORY_SYSTEM,
        }
    }

    pub const fn all() -> &'static [EventType] {
        &[
            EventType::ModelLoadStarted,
            EventType::ModelLoaded,
            EventType::ModelLoadFailed,
            EventType::ModelUnloaded,
            EventType::SectionsDiscovered,
            EventType::SectionSelected,
            EventType::SectionDeselected,
            EventType::SectionIsolated,
            EventType::SectionHighlighted,
            EventType::IsolationCleared,
            EventType::FocusEntered,
            EventType::FocusExited,
            EventType::ObjectSelected,
            EventType::ObjectDeselected,
            EventType::SelectionCleared,
            EventType::NodeToggled,
            EventType::VisibilityChanged,
            EventType::SearchChanged,
            EventType::ViewportChanged,
            EventType::UiSyncRequired,
            EventType::NavigationSyncRequired,
            EventType::SystemError,
            EventType::ValidationFailed,
        ]
    }

    /// Domain events the coordinator mirrors into its lifecycle state.
    pub const fn coordinated() -> &'static [EventType] {
        &[
            EventType::ModelLoadStarted,
            EventType::ModelLoaded,
            EventType::ModelLoadFailed,
            EventType::ModelUnloaded,
            EventType::SectionsDiscovered,
            EventType::SectionSelected,
            EventType::SectionDeselected,
            EventType::SectionIsolated,
            EventType::SectionHighlighted,
            EventType::IsolationCleared,
            EventType::FocusEntered,
            EventType::FocusExited,
            EventType::ObjectSelected,
            EventType::ObjectDeselected,
            EventType::SelectionCleared,
        ]
    }

    pub const fn is_sync(&self) -> bool {
        matches!(self, Self::UiSyncRequired | Self::NavigationSyncRequired)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::all()
            .iter()
            .copied()
            .find(|candidate| candidate.as_str() == trimmed)
            .ok_or_else(|| format!("unknown event type: {value}"))
    }
}
