//! Validated intents for view components.
//!
//! Each action checks its input, updates the externally owned [`ViewState`],
//! and dispatches exactly one event with the fixed policy listed in
//! [`ActionKind::policy`]. Actions report local success as a `bool`; handler
//! failures downstream surface through scheduler error handlers instead.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::bus::payloads::{self, EventPayload, Section, ValidationFailedPayload};
use crate::bus::{DispatchPolicy, EventType, Scheduler, ValidationError};


/// UI state owned by view components. Actions are the only writers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub selection: BTreeSet<String>,
    pub focused: Option<String>,
    pub expanded: BTreeSet<String>,
    pub hidden: BTreeSet<String>,
    pub isolated: BTreeSet<String>,
    pub highlighted: BTreeSet<String>,
    pub search_query: String,
    pub camera: Option<serde_json::Value>,
    pub loading_model: Option<String>,
}

pub type SharedViewState = Arc<Mutex<ViewState>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SelectNodes,
    DeselectNodes,
    ClearSelection,
    FocusNode,
    ExitFocus,
    SelectSection,
    DeselectSection,
    IsolateSections,
    ClearIsolation,
    HighlightSection,
    ToggleNode,
    SetVisibility,
    Search,
    UpdateViewport,
    BeginModelLoad,
    CompleteModelLoad,
    FailModelLoad,
    UnloadModel,
}

impl ActionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SelectNodes => "select_nodes",
            Self::DeselectNodes => "deselect_nodes",
            Self::ClearSelection => "clear_selection",
            Self::FocusNode => "focus_node",
            Self::ExitFocus => "exit_focus",
            Self::SelectSection => "select_section",
            Self::DeselectSection => "deselect_section",
            Self::IsolateSections => "isolate_sections",
            Self::ClearIsolation => "clear_isolation",
            Self::HighlightSection => "highlight_section",
            Self::ToggleNode => "toggle_node",
            Self::SetVisibility => "set_visibility",
            Self::Search => "search",
            Self::UpdateViewport => "update_viewport",
            Self::BeginModelLoad => "begin_model_load",
            Self::CompleteModelLoad => "complete_model_load",
            Self::FailModelLoad => "fail_model_load",
            Self::UnloadModel => "unload_model",
        }
    }

    pub const fn event_type(&self) -> EventType {
        match self {
            Self::SelectNodes => EventType::ObjectSelected,
            Self::DeselectNodes => EventType::ObjectDeselected,
            Self::ClearSelection => EventType::SelectionCleared,
            Self::FocusNode => EventType::FocusEntered,
            Self::ExitFocus => EventType::FocusExited,
            Self::SelectSection => EventType::SectionSelected,
            Self::DeselectSection => EventType::SectionDeselected,
            Self::IsolateSections => EventType::SectionIsolated,
            Self::ClearIsolation => EventType::IsolationCleared,
            Self::HighlightSection => EventType::SectionHighlighted,
            Self::ToggleNode => EventType::NodeToggled,
            Self::SetVisibility => EventType::VisibilityChanged,
            Self::Search => EventType::SearchChanged,
            Self::UpdateViewport => EventType::ViewportChanged,
            Self::BeginModelLoad => EventType::ModelLoadStarted,
            Self::CompleteModelLoad => EventType::ModelLoaded,
            Self::FailModelLoad => EventType::ModelLoadFailed,
            Self::UnloadModel => EventType::ModelUnloaded,
        }
    }

    /// The dispatch policy this action always uses.
    pub fn policy(&self) -> DispatchPolicy {
        let normal = DispatchPolicy::default();
        match self {
            Self::SelectNodes => normal.with_throttle(50),
            Self::DeselectNodes | Self::ToggleNode | Self::SetVisibility => normal,
            Self::ClearSelection => normal.silent(),
            Self::FocusNode => DispatchPolicy::high().with_debounce(50),
            Self::ExitFocus | Self::FailModelLoad | Self::UnloadModel => DispatchPolicy::high(),
            Self::SelectSection | Self::DeselectSection | Self::IsolateSections | Self::ClearIsolation => {
                normal.with_retry()
            }
            Self::HighlightSection => normal.with_debounce(100),
            Self::Search => normal.with_debounce(300),
            Self::UpdateViewport => normal.with_throttle(100),
            Self::BeginModelLoad | Self::CompleteModelLoad => DispatchPolicy::high().with_retry(),
        }
    }

    pub const fn all() -> &'static [ActionKind] {
        &[
            Self::SelectNodes,
            Self::DeselectNodes,
            Self::ClearSelection,
            Self::FocusNode,
            Self::ExitFocus,
            Self::SelectSection,
            Self::DeselectSection,
            Self::IsolateSections,
            Self::ClearIsolation,
            Self::HighlightSection,
            Self::ToggleNode,
            Self::SetVisibility,
            Self::Search,
            Self::UpdateViewport,
            Self::BeginModelLoad,
            Self::CompleteModelLoad,
            Self::FailModelLoad,
            Self::UnloadModel,
        ]
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn collect_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter().map(Into::into).collect()
}

#[derive(Clone)]
pub struct Actions {
    scheduler: Scheduler,
    view: SharedViewState,
}

impl Actions {
    pub fn new(scheduler: Scheduler, view: SharedViewState) -> Self {
        Self { scheduler, view }
    }

    pub fn view_handle(&self) -> SharedViewState {
        self.view.clone()
    }

    pub fn view_state(&self) -> ViewState {
        self.view().clone()
    }

    pub fn select_nodes<I, S>(&self, node_ids: I, additive: bool) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let payload = payloads::ObjectsSelected {
            object_ids: collect_ids(node_ids),
            additive,
        };
        self.perform(ActionKind::SelectNodes, payload, |view, p| {
            if !p.additive {
                view.selection.clear();
            }
            view.selection.extend(p.object_ids.iter().cloned());
        })
    }

    pub fn deselect_nodes<I, S>(&self, node_ids: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let payload = payloads::ObjectsDeselected {
            object_ids: collect_ids(node_ids),
        };
        self.perform(ActionKind::DeselectNodes, payload, |view, p| {
            for id in &p.object_ids {
                view.selection.remove(id);
            }
        })
    }

    pub fn clear_selection(&self) -> bool {
        self.perform(ActionKind::ClearSelection, payloads::Empty {}, |view, _| {
            view.selection.clear();
        })
    }

    pub fn focus_node(&self, node_id: &str) -> bool {
        let payload = payloads::FocusEntered {
            node_id: node_id.to_string(),
        };
        self.perform(ActionKind::FocusNode, payload, |view, p| {
            view.focused = Some(p.node_id.clone());
        })
    }

    pub fn exit_focus(&self) -> bool {
        self.perform(ActionKind::ExitFocus, payloads::Empty {}, |view, _| {
            view.focused = None;
        })
    }

    pub fn select_section(&self, section_id: &str) -> bool {
        let payload = payloads::SectionRef {
            section_id: section_id.to_string(),
        };
        self.perform(ActionKind::SelectSection, payload, |view, p| {
            view.selection.insert(p.section_id.clone());
        })
    }

    pub fn deselect_section(&self, section_id: &str) -> bool {
        let payload = payloads::SectionRef {
            section_id: section_id.to_string(),
        };
        self.perform(ActionKind::DeselectSection, payload, |view, p| {
            view.selection.remove(&p.section_id);
        })
    }

    pub fn isolate_sections<I, S>(&self, section_ids: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let payload = payloads::SectionsIsolated {
            section_ids: collect_ids(section_ids),
        };
        self.perform(ActionKind::IsolateSections, payload, |view, p| {
            view.isolated = p.section_ids.iter().cloned().collect();
        })
    }

    pub fn clear_isolation(&self) -> bool {
        self.perform(ActionKind::ClearIsolation, payloads::Empty {}, |view, _| {
            view.isolated.clear();
        })
    }

    pub fn highlight_section(&self, section_id: &str, highlighted: bool) -> bool {
        let payload = payloads::SectionHighlighted {
            section_id: section_id.to_string(),
            highlighted,
        };
        self.perform(ActionKind::HighlightSection, payload, |view, p| {
            if p.highlighted {
                view.highlighted.insert(p.section_id.clone());
            } else {
                view.highlighted.remove(&p.section_id);
            }
        })
    }

    /// Flip the expanded state of a tree node.
    pub fn toggle_node(&self, node_id: &str) -> bool {
        let expanded = !self.view().expanded.contains(node_id);
        let payload = payloads::NodeToggled {
            node_id: node_id.to_string(),
            expanded,
        };
        self.perform(ActionKind::ToggleNode, payload, |view, p| {
            if p.expanded {
                view.expanded.insert(p.node_id.clone());
            } else {
                view.expanded.remove(&p.node_id);
            }
        })
    }

    pub fn set_visibility<I, S>(&self, node_ids: I, visible: bool) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let payload = payloads::VisibilityChanged {
            node_ids: collect_ids(node_ids),
            visible,
        };
        self.perform(ActionKind::SetVisibility, payload, |view, p| {
            for id in &p.node_ids {
                if p.visible {
                    view.hidden.remove(id);
                } else {
                    view.hidden.insert(id.clone());
                }
            }
        })
    }

    pub fn search(&self, query: &str) -> bool {
        let payload = payloads::SearchChanged {
            query: query.to_string(),
        };
        self.perform(ActionKind::Search, payload, |view, p| {
            view.search_query = p.query.clone();
        })
    }

    pub fn update_viewport(&self, camera: serde_json::Value) -> bool {
        let payload = payloads::ViewportChanged { camera };
        self.perform(ActionKind::UpdateViewport, payload, |view, p| {
            view.camera = Some(p.camera.clone());
        })
    }

    pub fn begin_model_load(&self, model_id: &str, source: Option<&str>) -> bool {
        let payload = payloads::ModelLoadStarted {
            model_id: model_id.to_string(),
            source: source.map(str::to_string),
        };
        self.perform(ActionKind::BeginModelLoad, payload, |view, p| {
            *view = ViewState {
                loading_model: Some(p.model_id.clone()),
                ..ViewState::default()
            };
        })
    }

    pub fn complete_model_load(&self, model_id: &str, sections: Vec<Section>) -> bool {
        let payload = payloads::ModelLoaded {
            model_id: model_id.to_string(),
            sections,
        };
        self.perform(ActionKind::CompleteModelLoad, payload, |view, p| {
            if view.loading_model.as_deref() == Some(p.model_id.as_str()) {
                view.loading_model = None;
            }
        })
    }

    pub fn fail_model_load(&self, model_id: &str, error: &str) -> bool {
        let payload = payloads::ModelLoadFailed {
            model_id: model_id.to_string(),
            error: error.to_string(),
        };
        self.perform(ActionKind::FailModelLoad, payload, |view, p| {
            if view.loading_model.as_deref() == Some(p.model_id.as_str()) {
                view.loading_model = None;
            }
        })
    }

    pub fn unload_model(&self, model_id: Option<&str>) -> bool {
        let payload = payloads::ModelUnloaded {
            model_id: model_id.map(str::to_string),
        };
        self.perform(ActionKind::UnloadModel, payload, |view, _| {
            *view = ViewState::default();
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().expect("view state mutex poisoned")
    }

    fn perform<P, F>(&self, kind: ActionKind, payload: P, apply: F) -> bool
    where
        P: EventPayload,
        F: FnOnce(&mut ViewState, &P),
    {
        let event_type = kind.event_type();
        if let Err(error) = payload.check(event_type) {
            self.reject(kind, &error);
            return false;
        }
        if self.scheduler.is_destroyed() {
            tracing::debug!(action = %kind, "action after scheduler destroy ignored");
            return false;
        }

        apply(&mut self.view(), &payload);
        self.scheduler.dispatch(event_type, payload.to_value(), kind.policy());
        true
    }

    fn reject(&self, kind: ActionKind, error: &ValidationError) {
        tracing::warn!(action = %kind, event_type = %error.event_type, "action rejected: {}", error.reason);
        self.scheduler.dispatch(
            EventType::ValidationFailed,
            ValidationFailedPayload::from(error).to_value(),
            DispatchPolicy::high().silent(),
        );
    }
}

impl std::fmt::Debug for Actions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actions").finish_non_exhaustive()
    }
}
