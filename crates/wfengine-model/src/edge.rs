//! Directed edges between steps.

use serde::{Deserialize, Serialize};

/// A directed connector between two steps.
///
/// `label` carries the branch tag for `condition` (`"true"`/`"false"`) and
/// `switch` (a case value, or `"default"`) sources; it is absent for every
/// other source kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub workflow_id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    pub fn new(workflow_id: impl Into<String>, source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Well-known edge labels for `condition` sources.
pub const LABEL_TRUE: &str = "true";
pub const LABEL_FALSE: &str = "false";
/// Fallback label for `switch` sources with no matching case.
pub const LABEL_DEFAULT: &str = "default";
