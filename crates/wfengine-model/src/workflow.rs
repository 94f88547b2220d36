//! Workflow definition and graph utilities.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::edge::Edge;
use crate::error::WorkflowError;
use crate::step::Step;

/// A persistent, declarative workflow graph.
///
/// Purely declarative: never mutated by the engine (§3 "Lifecycle"). Steps
/// and edges are loaded alongside it by `Store::GetSteps`/`GetEdges` rather
/// than embedded, since the Store contract (§4.6) fetches them separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The full graph of a workflow: its steps and edges, loaded together.
///
/// Invariant 1 (§3): every step id appearing in an edge must belong to this
/// workflow. `WorkflowGraph::new` enforces it.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    pub workflow: Workflow,
    pub steps: Vec<Step>,
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    pub fn new(workflow: Workflow, mut steps: Vec<Step>, edges: Vec<Edge>) -> Result<Self, WorkflowError> {
        steps.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));

        let ids: HashSet<&str> = steps.iter().map(|s| s.id.as_str()).collect();
        for edge in &edges {
            if !ids.contains(edge.source_id.as_str()) {
                return Err(WorkflowError::DanglingEdge(edge.source_id.clone()));
            }
            if !ids.contains(edge.target_id.as_str()) {
                return Err(WorkflowError::DanglingEdge(edge.target_id.clone()));
            }
        }

        Ok(Self { workflow, steps, edges })
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Outgoing edges of `id`, ordered by the target step's `(order, id)` —
    /// the same deterministic ascending order used for the start set (§4.2
    /// "Traversal order"), not the edge's own randomly-generated id.
    pub fn outgoing(&self, id: &str) -> Vec<&Edge> {
        let mut out: Vec<&Edge> = self.edges.iter().filter(|e| e.source_id == id).collect();
        out.sort_by_key(|e| self.step(&e.target_id).map(|s| (s.order, s.id.clone())));
        out
    }

    /// Direct predecessor step ids of `id`.
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.target_id == id)
            .map(|e| e.source_id.as_str())
            .collect()
    }

    /// Steps with no incoming edge — the start set (§4.1 step 4).
    ///
    /// Stable-ordered by `Step.order` then `Step.id` (§4.2 "Traversal
    /// order"), since `steps` is sorted that way on construction.
    pub fn start_steps(&self) -> Vec<&Step> {
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.target_id.as_str()).collect();
        self.steps.iter().filter(|s| !targets.contains(s.id.as_str())).collect()
    }

    /// Find the trigger step matching an admitted trigger kind, if any.
    pub fn trigger_step(&self, kind: crate::step::StepKind) -> Option<&Step> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    /// Adjacency map from source step id to its outgoing edges, built once
    /// per run per §4.1 step 3.
    pub fn adjacency(&self) -> HashMap<&str, Vec<&Edge>> {
        let mut map: HashMap<&str, Vec<&Edge>> = HashMap::new();
        for edge in &self.edges {
            map.entry(edge.source_id.as_str()).or_default().push(edge);
        }
        for edges in map.values_mut() {
            edges.sort_by(|a, b| a.id.cmp(&b.id));
        }
        map
    }
}
