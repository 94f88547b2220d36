//! # wfengine-store
//!
//! The `Store` capability contract (§4.6): CRUD over workflows, steps,
//! edges, runs, and credentials. Two backends ship here — `MemoryStore`
//! for tests and `DATABASE_URL`-less development, and `PostgresStore` for
//! production, mirroring the teacher's `MemoryWorkflowStorage` /
//! `n8n-db` split.

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;

use wfengine_model::credential::Credential;
use wfengine_model::edge::Edge;
use wfengine_model::execution::{StepExecution, WorkflowExecution};
use wfengine_model::step::Step;
use wfengine_model::workflow::Workflow;

/// All operations are scoped acquisitions: callers never hold a `Store`
/// resource across a step dispatch (§4.6) — every call here is short and
/// independent, safe to invoke concurrently from different runs.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_workflow(&self, id: &str) -> StoreResult<Option<Workflow>>;
    async fn list_workflows(&self) -> StoreResult<Vec<Workflow>>;
    async fn create_workflow(&self, workflow: Workflow) -> StoreResult<Workflow>;
    /// Replaces `workflow`'s own row, and atomically replaces its full
    /// step/edge set with `steps`/`edges` (delete edges, then steps, then
    /// re-insert both — §4.6's "advisable around update-with-graph").
    async fn update_workflow(&self, workflow: Workflow, steps: Vec<Step>, edges: Vec<Edge>) -> StoreResult<()>;
    /// Cascades to this workflow's steps, edges, and runs.
    async fn delete_workflow(&self, id: &str) -> StoreResult<bool>;

    /// Stable order: `order` ascending, then `id` ascending.
    async fn get_steps(&self, workflow_id: &str) -> StoreResult<Vec<Step>>;
    async fn get_edges(&self, workflow_id: &str) -> StoreResult<Vec<Edge>>;

    async fn create_execution(&self, execution: WorkflowExecution) -> StoreResult<WorkflowExecution>;
    async fn update_execution(&self, execution: WorkflowExecution) -> StoreResult<()>;
    async fn get_execution(&self, id: &str) -> StoreResult<Option<WorkflowExecution>>;
    /// Newest-first.
    async fn list_executions(&self, workflow_id: &str) -> StoreResult<Vec<WorkflowExecution>>;

    async fn create_step_execution(&self, step_execution: StepExecution) -> StoreResult<StepExecution>;
    async fn update_step_execution(&self, step_execution: StepExecution) -> StoreResult<()>;

    async fn list_credentials(&self) -> StoreResult<Vec<Credential>>;
    async fn create_credential(&self, credential: Credential) -> StoreResult<Credential>;
    async fn delete_credential(&self, id: &str) -> StoreResult<bool>;
}
