//! Error types shared by the data model crate.

use thiserror::Error;

/// Errors raised while building or validating a declarative workflow graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("edge references step outside its workflow: {0}")]
    DanglingEdge(String),
}
