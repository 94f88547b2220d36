//! In-memory `Store`, selected when `DATABASE_URL` is unset — used by
//! default in tests and local development, grounded on the teacher's
//! `MemoryWorkflowStorage`/`MemoryExecutionStorage` split.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use wfengine_model::credential::Credential;
use wfengine_model::edge::Edge;
use wfengine_model::execution::{StepExecution, WorkflowExecution};
use wfengine_model::step::Step;
use wfengine_model::workflow::Workflow;

use crate::error::{StoreError, StoreResult};
use crate::Store;

#[derive(Default)]
struct Inner {
    workflows: HashMap<String, Workflow>,
    steps: HashMap<String, Vec<Step>>,
    edges: HashMap<String, Vec<Edge>>,
    executions: HashMap<String, WorkflowExecution>,
    step_executions: HashMap<String, StepExecution>,
    credentials: HashMap<String, Credential>,
}

/// `Arc<RwLock<...>>`-backed `Store`. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_workflow(&self, id: &str) -> StoreResult<Option<Workflow>> {
        Ok(self.inner.read().await.workflows.get(id).cloned())
    }

    async fn list_workflows(&self) -> StoreResult<Vec<Workflow>> {
        Ok(self.inner.read().await.workflows.values().cloned().collect())
    }

    async fn create_workflow(&self, workflow: Workflow) -> StoreResult<Workflow> {
        let mut inner = self.inner.write().await;
        inner.steps.entry(workflow.id.clone()).or_default();
        inner.edges.entry(workflow.id.clone()).or_default();
        inner.workflows.insert(workflow.id.clone(), workflow.clone());
        Ok(workflow)
    }

    async fn update_workflow(&self, workflow: Workflow, steps: Vec<Step>, edges: Vec<Edge>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.workflows.contains_key(&workflow.id) {
            return Err(StoreError::NotFound);
        }
        inner.edges.insert(workflow.id.clone(), edges);
        inner.steps.insert(workflow.id.clone(), steps);
        inner.workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    async fn delete_workflow(&self, id: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        inner.steps.remove(id);
        inner.edges.remove(id);
        inner.executions.retain(|_, e| e.workflow_id != id);
        Ok(inner.workflows.remove(id).is_some())
    }

    async fn get_steps(&self, workflow_id: &str) -> StoreResult<Vec<Step>> {
        let mut steps = self.inner.read().await.steps.get(workflow_id).cloned().unwrap_or_default();
        steps.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        Ok(steps)
    }

    async fn get_edges(&self, workflow_id: &str) -> StoreResult<Vec<Edge>> {
        Ok(self.inner.read().await.edges.get(workflow_id).cloned().unwrap_or_default())
    }

    async fn create_execution(&self, execution: WorkflowExecution) -> StoreResult<WorkflowExecution> {
        let mut inner = self.inner.write().await;
        inner.executions.insert(execution.id.clone(), execution.clone());
        Ok(execution)
    }

    async fn update_execution(&self, execution: WorkflowExecution) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.executions.contains_key(&execution.id) {
            return Err(StoreError::NotFound);
        }
        inner.executions.insert(execution.id.clone(), execution);
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> StoreResult<Option<WorkflowExecution>> {
        Ok(self.inner.read().await.executions.get(id).cloned())
    }

    async fn list_executions(&self, workflow_id: &str) -> StoreResult<Vec<WorkflowExecution>> {
        let inner = self.inner.read().await;
        let mut executions: Vec<WorkflowExecution> =
            inner.executions.values().filter(|e| e.workflow_id == workflow_id).cloned().collect();
        executions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(executions)
    }

    async fn create_step_execution(&self, step_execution: StepExecution) -> StoreResult<StepExecution> {
        let mut inner = self.inner.write().await;
        inner.step_executions.insert(step_execution.id.clone(), step_execution.clone());
        Ok(step_execution)
    }

    async fn update_step_execution(&self, step_execution: StepExecution) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.step_executions.contains_key(&step_execution.id) {
            return Err(StoreError::NotFound);
        }
        inner.step_executions.insert(step_execution.id.clone(), step_execution);
        Ok(())
    }

    async fn list_credentials(&self) -> StoreResult<Vec<Credential>> {
        Ok(self.inner.read().await.credentials.values().cloned().collect())
    }

    async fn create_credential(&self, credential: Credential) -> StoreResult<Credential> {
        let mut inner = self.inner.write().await;
        inner.credentials.insert(credential.id.clone(), credential.clone());
        Ok(credential)
    }

    async fn delete_credential(&self, id: &str) -> StoreResult<bool> {
        Ok(self.inner.write().await.credentials.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_get_workflow_round_trips() {
        let store = MemoryStore::new();
        let workflow = Workflow::new("test");
        let id = workflow.id.clone();
        store.create_workflow(workflow).await.unwrap();

        let fetched = store.get_workflow(&id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn update_workflow_replaces_steps_and_edges() {
        let store = MemoryStore::new();
        let workflow = Workflow::new("graph");
        let id = workflow.id.clone();
        store.create_workflow(workflow.clone()).await.unwrap();

        let step = Step::new(&id, wfengine_model::step::StepKind::ManualTrigger, "start");
        store.update_workflow(workflow, vec![step.clone()], vec![]).await.unwrap();

        let steps = store.get_steps(&id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].id, step.id);
    }

    #[tokio::test]
    async fn delete_workflow_cascades_to_steps_and_edges() {
        let store = MemoryStore::new();
        let workflow = Workflow::new("cascade");
        let id = workflow.id.clone();
        store.create_workflow(workflow).await.unwrap();

        assert!(store.delete_workflow(&id).await.unwrap());
        assert!(store.get_steps(&id).await.unwrap().is_empty());
        assert!(store.get_workflow(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_executions_is_newest_first() {
        let store = MemoryStore::new();
        let workflow_id = "wf-1".to_string();

        let mut first = WorkflowExecution::new(&workflow_id);
        first.start_time = chrono::Utc::now() - chrono::Duration::seconds(10);
        let second = WorkflowExecution::new(&workflow_id);

        store.create_execution(first.clone()).await.unwrap();
        store.create_execution(second.clone()).await.unwrap();

        let executions = store.list_executions(&workflow_id).await.unwrap();
        assert_eq!(executions[0].id, second.id);
        assert_eq!(executions[1].id, first.id);
    }
}
