//! Stable engine-level error kinds (§7).

use thiserror::Error;

/// Engine-level errors, named to match the stable kinds in §7 exactly so
/// callers and tests can match on the discriminant rather than parse
/// messages.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("WORKFLOW_NOT_FOUND: {0}")]
    WorkflowNotFound(String),

    #[error("STEP_NOT_FOUND: {0}")]
    StepNotFound(String),

    #[error("CYCLE_DETECTED: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("TYPE_ERROR: {0}")]
    TypeError(String),

    /// Non-fatal at engine level (§7): the dispatcher surfaces it on the
    /// step but the run does not fail.
    #[error("BRANCH_UNRESOLVED: step {0} has no matching or default edge")]
    BranchUnresolved(String),

    #[error("SANDBOX_ERROR: {0}")]
    SandboxError(String),

    #[error("SANDBOX_TIMEOUT")]
    SandboxTimeout,

    #[error("LLM_ERROR: {0}")]
    LlmError(String),

    #[error("WEBHOOK_SIGNATURE_MISSING")]
    WebhookSignatureMissing,

    #[error("WEBHOOK_SIGNATURE_INVALID")]
    WebhookSignatureInvalid,

    #[error("CANCELLED")]
    Cancelled,

    #[error("DEADLINE_EXCEEDED")]
    DeadlineExceeded,

    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    /// The stable kind name, independent of message formatting — used by
    /// the dispatcher to populate `StepExecution.error` and by the HTTP
    /// layer to classify a response status.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::WorkflowNotFound(_) => "WORKFLOW_NOT_FOUND",
            EngineError::StepNotFound(_) => "STEP_NOT_FOUND",
            EngineError::CycleDetected { .. } => "CYCLE_DETECTED",
            EngineError::TypeError(_) => "TYPE_ERROR",
            EngineError::BranchUnresolved(_) => "BRANCH_UNRESOLVED",
            EngineError::SandboxError(_) => "SANDBOX_ERROR",
            EngineError::SandboxTimeout => "SANDBOX_TIMEOUT",
            EngineError::LlmError(_) => "LLM_ERROR",
            EngineError::WebhookSignatureMissing => "WEBHOOK_SIGNATURE_MISSING",
            EngineError::WebhookSignatureInvalid => "WEBHOOK_SIGNATURE_INVALID",
            EngineError::Cancelled => "CANCELLED",
            EngineError::DeadlineExceeded => "DEADLINE_EXCEEDED",
            EngineError::Store(_) => "STORE_ERROR",
        }
    }
}
