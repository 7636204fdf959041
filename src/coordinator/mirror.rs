use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::payloads::Section;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelLifecycle {
    #[default]
    Idle,
    Loading,
    Loaded,
}

impl ModelLifecycle {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
        }
    }
}

impl std::fmt::Display for ModelLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The coordinator's authoritative copy of lifecycle state.
///
/// Only coordinator handlers write it; everyone else gets clones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    pub lifecycle: ModelLifecycle,
    pub current_model_id: Option<String>,
    pub sections: BTreeMap<String, Section>,
    pub selected_ids: BTreeSet<String>,
    pub isolated_ids: BTreeSet<String>,
    pub highlighted_ids: BTreeSet<String>,
    pub focused_id: Option<String>,
}

impl Mirror {
    pub fn has_section(&self, section_id: &str) -> bool {
        self.sections.contains_key(section_id)
    }

    pub fn is_loaded(&self) -> bool {
        self.lifecycle == ModelLifecycle::Loaded
    }

    pub fn is_current_model(&self, model_id: &str) -> bool {
        self.current_model_id.as_deref() == Some(model_id)
    }

    /// Clear then repopulate `sections`, dropping state that pointed at
    /// sections which no longer exist.
    pub(crate) fn replace_sections(&mut self, sections: Vec<Section>) {
        let previous: BTreeSet<String> = self.sections.keys().cloned().collect();
        self.sections.clear();
        for section in sections {
            self.sections.insert(section.id.clone(), section);
        }

        let current = &self.sections;
        self.isolated_ids.retain(|id| current.contains_key(id));
        self.highlighted_ids.retain(|id| current.contains_key(id));
        self.selected_ids
            .retain(|id| !previous.contains(id) || current.contains_key(id));
        let focus_dropped = self
            .focused_id
            .as_ref()
            .is_some_and(|focused| previous.contains(focused) && !self.sections.contains_key(focused));
        if focus_dropped {
            self.focused_id = None;
        }
    }

    /// Drop everything tied to the loaded scene, keeping lifecycle and model id.
    pub(crate) fn clear_scene(&mut self) {
        self.sections.clear();
        self.selected_ids.clear();
        self.isolated_ids.clear();
        self.highlighted_ids.clear();
        self.focused_id = None;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Deep, independent copy of the mirror at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSnapshot {
    pub mirror: Mirror,
    pub taken_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacing_sections_prunes_dangling_references() {
        let mut mirror = Mirror {
            lifecycle: ModelLifecycle::Loaded,
            current_model_id: Some("m1".into()),
            ..Mirror::default()
        };
        mirror.replace_sections(vec![Section::new("s1", "Base"), Section::new("s2", "Lid")]);
        mirror.selected_ids.extend(["s1".to_string(), "s2".to_string(), "obj-9".to_string()]);
        mirror.isolated_ids.insert("s2".into());
        mirror.highlighted_ids.insert("s2".into());
        mirror.focused_id = Some("s2".into());

        mirror.replace_sections(vec![Section::new("s1", "Base"), Section::new("s3", "Hinge")]);

        assert_eq!(mirror.sections.keys().cloned().collect::<Vec<_>>(), vec!["s1", "s3"]);
        assert_eq!(
            mirror.selected_ids.iter().cloned().collect::<Vec<_>>(),
            vec!["obj-9", "s1"]
        );
        assert!(mirror.isolated_ids.is_empty());
        assert!(mirror.highlighted_ids.is_empty());
        assert_eq!(mirror.focused_id, None);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut mirror = Mirror {
            lifecycle: ModelLifecycle::Loaded,
            current_model_id: Some("m1".into()),
            ..Mirror::default()
        };
        mirror.selected_ids.insert("a".into());
        mirror.reset();
        assert_eq!(mirror, Mirror::default());
    }
}
