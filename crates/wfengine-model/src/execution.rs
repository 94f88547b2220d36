//! Run-time execution records: `WorkflowExecution` and `StepExecution`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Status of a `WorkflowExecution` (a run).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

/// Status of a `StepExecution` (one dispatch of one step within a run).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// One execution of a workflow, from a trigger to a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub start_time: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Mapping from step id to its committed output (§3 invariant 3).
    pub outputs: HashMap<String, Value>,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            start_time: chrono::Utc::now(),
            end_time: None,
            error: None,
            outputs: HashMap::new(),
        }
    }

    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.end_time = Some(chrono::Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.end_time = Some(chrono::Utc::now());
    }
}

/// One dispatch of one step within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepExecution {
    pub id: String,
    pub workflow_execution_id: String,
    pub step_id: String,
    pub status: StepStatus,
    pub start_time: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Snapshot of the inputs view at dispatch time.
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl StepExecution {
    pub fn new(workflow_execution_id: impl Into<String>, step_id: impl Into<String>, input: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_execution_id: workflow_execution_id.into(),
            step_id: step_id.into(),
            status: StepStatus::Running,
            start_time: chrono::Utc::now(),
            end_time: None,
            error: None,
            input,
            output: None,
        }
    }

    pub fn complete(&mut self, output: Value) {
        self.status = StepStatus::Completed;
        self.output = Some(output);
        self.end_time = Some(chrono::Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
        self.end_time = Some(chrono::Utc::now());
    }
}
