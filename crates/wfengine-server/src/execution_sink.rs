//! Adapts the real `Store` to `wfengine_core::engine::ExecutionSink`, the
//! narrow interface the engine persists through (§4.3: handlers, and by
//! extension the engine's own observer, never touch Store directly except
//! through this seam).

use std::sync::Arc;

use async_trait::async_trait;

use wfengine_core::engine::ExecutionSink;
use wfengine_core::error::EngineError;
use wfengine_model::execution::{StepExecution, WorkflowExecution};
use wfengine_store::Store;

pub struct StoreExecutionSink {
    store: Arc<dyn Store>,
}

impl StoreExecutionSink {
    pub fn new(store: Arc<dyn Store>) -> Self {
        StoreExecutionSink { store }
    }
}

#[async_trait]
impl ExecutionSink for StoreExecutionSink {
    async fn create_execution(&self, execution: WorkflowExecution) -> Result<(), EngineError> {
        self.store.create_execution(execution).await.map(|_| ()).map_err(|e| EngineError::Store(e.to_string()))
    }

    async fn update_execution(&self, execution: WorkflowExecution) -> Result<(), EngineError> {
        self.store.update_execution(execution).await.map_err(|e| EngineError::Store(e.to_string()))
    }

    async fn create_step_execution(&self, step_execution: StepExecution) -> Result<(), EngineError> {
        self.store.create_step_execution(step_execution).await.map(|_| ()).map_err(|e| EngineError::Store(e.to_string()))
    }

    async fn update_step_execution(&self, step_execution: StepExecution) -> Result<(), EngineError> {
        self.store.update_step_execution(step_execution).await.map_err(|e| EngineError::Store(e.to_string()))
    }
}
