//! Step (node) definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The closed set of step kinds the engine knows how to dispatch.
///
/// Triggers are re-entrant pass-throughs (the real trigger payload is seeded
/// by the engine at run start); AI kinds shape a prompt and call the
/// `LLMProvider`; flow kinds implement branching/looping/merging; `code`
/// runs a user body in the sandbox.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ManualTrigger,
    ScheduleTrigger,
    WebhookTrigger,
    AppEventTrigger,
    WorkflowTrigger,

    BasicLlmChain,
    AiTransform,
    InformationExtractor,
    QaChain,
    SentimentAnalysis,
    SummarizationChain,
    TextClassifier,

    Condition,
    Switch,
    Loop,
    Filter,
    Merge,

    Code,
}

impl StepKind {
    /// Whether this kind is one of the five trigger kinds.
    pub fn is_trigger(&self) -> bool {
        matches!(
            self,
            StepKind::ManualTrigger
                | StepKind::ScheduleTrigger
                | StepKind::WebhookTrigger
                | StepKind::AppEventTrigger
                | StepKind::WorkflowTrigger
        )
    }
}

/// A node in a workflow graph.
///
/// `config` is a kind-specific structured map (schema given per-kind in the
/// handler catalog); the engine itself only interprets `kind`, `order`, and
/// dispatch-agnostic config keys like `retryOnFail`/`continueOnFail`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub workflow_id: String,
    pub kind: StepKind,
    pub label: String,
    /// Opaque UI hint (canvas position); the engine never reads this.
    #[serde(default)]
    pub position: Value,
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Tie-breaker for stable default topological order among ready
    /// siblings with no data dependency (§4.2 "Traversal order").
    pub order: i64,
}

impl Step {
    pub fn new(workflow_id: impl Into<String>, kind: StepKind, label: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            kind,
            label: label.into(),
            position: Value::Null,
            config: Map::new(),
            order: 0,
        }
    }

    /// Retry count from `config.maxTries`, defaulting to 3 when
    /// `retryOnFail` is set and no explicit count is given.
    pub fn max_tries(&self) -> u32 {
        if !self.retry_on_fail() {
            return 1;
        }
        self.config
            .get("maxTries")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or(3)
    }

    pub fn retry_on_fail(&self) -> bool {
        self.config
            .get("retryOnFail")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn wait_between_tries_ms(&self) -> u64 {
        self.config
            .get("waitBetweenTries")
            .and_then(Value::as_u64)
            .unwrap_or(1000)
    }

    /// A step marked `continueOnFail` does not fail the run when it fails
    /// itself (§10 "Supplemented, not in spec.md's distillation").
    pub fn continue_on_fail(&self) -> bool {
        self.config
            .get("continueOnFail")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
