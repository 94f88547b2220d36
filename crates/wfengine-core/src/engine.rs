//! `Engine` (§4.1): loads a workflow graph, seeds the trigger step's output
//! from a `TriggerEnvelope`, and drives `FlowController` to completion,
//! persisting `WorkflowExecution`/`StepExecution` rows through a `Store`
//! along the way. Grounded on the teacher's `WorkflowEngine::execute_with_events`
//! in `n8n-core::engine`, adapted from its stack-based loop to a thin
//! wrapper around the graph-recursive `FlowController`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use wfengine_model::execution::{StepExecution, WorkflowExecution};
use wfengine_model::step::{Step, StepKind};
use wfengine_model::trigger::TriggerEnvelope;
use wfengine_model::workflow::WorkflowGraph;

use crate::dispatcher::StepDispatcher;
use crate::error::EngineError;
use crate::expression::SandboxedExpr;
use crate::flow::{FlowController, StepObserver};
use crate::llm::LLMProvider;
use crate::runtime::RunHandle;

/// Store operations the engine needs to persist a run. A narrower trait
/// than the full `wfengine-store::Store` so this crate does not depend on
/// it directly — `wfengine-server` supplies an adapter over the real Store.
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn create_execution(&self, execution: WorkflowExecution) -> Result<(), EngineError>;
    async fn update_execution(&self, execution: WorkflowExecution) -> Result<(), EngineError>;
    async fn create_step_execution(&self, step_execution: StepExecution) -> Result<(), EngineError>;
    async fn update_step_execution(&self, step_execution: StepExecution) -> Result<(), EngineError>;
}

/// Bridges `FlowController`'s `StepObserver` callbacks to an `ExecutionSink`,
/// tracking the in-flight `StepExecution` id per step so `on_step_complete`/
/// `on_step_failed` can update the row `on_step_start` created (§4.3: handlers
/// never touch Store directly, only the engine does, through this observer).
struct StoreObserver<'a> {
    sink: &'a dyn ExecutionSink,
    workflow_execution_id: String,
    in_flight: tokio::sync::Mutex<HashMap<String, StepExecution>>,
}

impl<'a> StoreObserver<'a> {
    fn new(sink: &'a dyn ExecutionSink, workflow_execution_id: String) -> Self {
        StoreObserver { sink, workflow_execution_id, in_flight: tokio::sync::Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl<'a> StepObserver for StoreObserver<'a> {
    async fn on_step_start(&self, step: &Step, input: &Value) {
        let record = StepExecution::new(self.workflow_execution_id.clone(), step.id.clone(), input.clone());
        self.in_flight.lock().await.insert(step.id.clone(), record.clone());
        if let Err(err) = self.sink.create_step_execution(record).await {
            warn!(step = %step.id, error = %err, "failed to persist step execution start");
        }
    }

    async fn on_step_complete(&self, step: &Step, output: &Value) {
        let Some(mut record) = self.in_flight.lock().await.remove(&step.id) else { return };
        record.complete(output.clone());
        if let Err(err) = self.sink.update_step_execution(record).await {
            warn!(step = %step.id, error = %err, "failed to persist step execution completion");
        }
    }

    async fn on_step_failed(&self, step: &Step, error: &EngineError) {
        let Some(mut record) = self.in_flight.lock().await.remove(&step.id) else { return };
        record.fail(error.to_string());
        if let Err(err) = self.sink.update_step_execution(record).await {
            warn!(step = %step.id, error = %err, "failed to persist step execution failure");
        }
    }
}

/// Drives one workflow run end to end (§4.1 "StartRun").
pub struct Engine {
    dispatcher: StepDispatcher,
    llm: Arc<dyn LLMProvider>,
    sandbox: SandboxedExpr,
}

impl Engine {
    pub fn new(dispatcher: StepDispatcher, llm: Arc<dyn LLMProvider>, sandbox: SandboxedExpr) -> Self {
        Engine { dispatcher, llm, sandbox }
    }

    /// Starts a run against `graph` for the trigger envelope's matching
    /// trigger step, persisting the run and its step executions through
    /// `sink`, and returns the finalized `WorkflowExecution`.
    ///
    /// Steps, in order (§4.1):
    /// 1. Find the trigger step matching the envelope's kind.
    /// 2. Create a `Running` `WorkflowExecution` row.
    /// 3. Seed the trigger step's output and any prior-run outputs (workflow
    ///    chain trigger only).
    /// 4. Run the flow controller from the trigger step.
    /// 5. Finalize the execution as `Completed` or `Failed`.
    pub async fn start_run(
        &self,
        graph: &WorkflowGraph,
        envelope: TriggerEnvelope,
        sink: &dyn ExecutionSink,
        run_handle: &RunHandle,
    ) -> Result<WorkflowExecution, EngineError> {
        let trigger_kind = envelope.step_kind();
        let trigger_step = graph
            .trigger_step(trigger_kind)
            .ok_or_else(|| EngineError::StepNotFound(format!("no {trigger_kind:?} step in workflow {}", graph.workflow.id)))?;

        let mut execution = WorkflowExecution::new(graph.workflow.id.clone());
        info!(run_id = %execution.id, workflow_id = %graph.workflow.id, "starting run");
        sink.create_execution(execution.clone()).await?;

        let mut seeded = envelope.prior_outputs();
        seeded.insert(trigger_step.id.clone(), envelope.seed_value());

        let observer = StoreObserver::new(sink, execution.id.clone());
        let controller = FlowController::new();
        // Start steps are every step with no incoming edge, not just the
        // matched trigger (§4.1 step 4) — the trigger is one of them, but a
        // workflow may have other no-incoming-edge steps that must also run.
        // The trigger is always included even if it isn't itself edge-free
        // (a trigger step can sit inside a cycle; it must still be entered
        // so cycle detection has a chance to fire).
        let mut start_ids: Vec<String> = graph.start_steps().into_iter().map(|s| s.id.clone()).collect();
        if !start_ids.contains(&trigger_step.id) {
            start_ids.push(trigger_step.id.clone());
        }

        let outcome = controller
            .run(graph, &self.dispatcher, self.llm.as_ref(), &self.sandbox, run_handle, &observer, seeded, &start_ids)
            .await;

        match outcome {
            Ok(outcome) => {
                for warning in &outcome.warnings {
                    warn!(run_id = %execution.id, %warning, "non-fatal condition during run");
                }
                execution.outputs = outcome.outputs;
                execution.complete();
                info!(run_id = %execution.id, workflow_id = %graph.workflow.id, "run completed");
                sink.update_execution(execution.clone()).await?;
                Ok(execution)
            }
            Err(err) => {
                execution.fail(err.to_string());
                error!(run_id = %execution.id, workflow_id = %graph.workflow.id, error = %err, "run failed");
                sink.update_execution(execution.clone()).await?;
                Ok(execution)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use wfengine_model::edge::Edge;
    use wfengine_model::step::Step;
    use wfengine_model::workflow::Workflow;

    use crate::llm::MockLlmProvider;

    #[derive(Default)]
    struct RecordingSink {
        executions: StdMutex<Vec<WorkflowExecution>>,
        step_executions: StdMutex<Vec<StepExecution>>,
    }

    #[async_trait]
    impl ExecutionSink for RecordingSink {
        async fn create_execution(&self, execution: WorkflowExecution) -> Result<(), EngineError> {
            self.executions.lock().unwrap().push(execution);
            Ok(())
        }
        async fn update_execution(&self, execution: WorkflowExecution) -> Result<(), EngineError> {
            self.executions.lock().unwrap().push(execution);
            Ok(())
        }
        async fn create_step_execution(&self, step_execution: StepExecution) -> Result<(), EngineError> {
            self.step_executions.lock().unwrap().push(step_execution);
            Ok(())
        }
        async fn update_step_execution(&self, step_execution: StepExecution) -> Result<(), EngineError> {
            self.step_executions.lock().unwrap().push(step_execution);
            Ok(())
        }
    }

    fn build_engine() -> Engine {
        Engine::new(StepDispatcher::new(), Arc::new(MockLlmProvider), SandboxedExpr::new(Duration::from_secs(2)))
    }

    #[tokio::test]
    async fn start_run_completes_a_manual_trigger_workflow() {
        let wf = Workflow::new("manual-run");
        let trigger = Step::new(&wf.id, StepKind::ManualTrigger, "start");
        let mut code = Step::new(&wf.id, StepKind::Code, "double");
        code.config = serde_json::json!({"code": "return inputs.start.triggered;"}).as_object().cloned().unwrap();
        let edge = Edge::new(&wf.id, &trigger.id, &code.id);

        let graph = WorkflowGraph::new(wf, vec![trigger, code.clone()], vec![edge]).unwrap();

        let engine = build_engine();
        let sink = RecordingSink::default();
        let run_handle = RunHandle::new(None);

        let execution = engine.start_run(&graph, TriggerEnvelope::Manual, &sink, &run_handle).await.unwrap();

        assert_eq!(execution.status, wfengine_model::execution::ExecutionStatus::Completed);
        assert_eq!(execution.outputs.get(&code.id), Some(&Value::Bool(true)));
        assert!(!sink.executions.lock().unwrap().is_empty());
        assert!(!sink.step_executions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_run_fails_when_no_trigger_step_matches() {
        let wf = Workflow::new("no-trigger");
        let only_step = Step::new(&wf.id, StepKind::Code, "solo");
        let graph = WorkflowGraph::new(wf, vec![only_step], vec![]).unwrap();

        let engine = build_engine();
        let sink = RecordingSink::default();
        let run_handle = RunHandle::new(None);

        let err = engine.start_run(&graph, TriggerEnvelope::Manual, &sink, &run_handle).await.unwrap_err();
        assert_eq!(err.kind(), "STEP_NOT_FOUND");
    }

    #[tokio::test]
    async fn start_run_records_failure_status_on_sandbox_error() {
        let wf = Workflow::new("bad-code");
        let trigger = Step::new(&wf.id, StepKind::ManualTrigger, "start");
        let mut bad = Step::new(&wf.id, StepKind::Code, "boom");
        bad.config = serde_json::json!({"code": "not valid syntax {{{"}).as_object().cloned().unwrap();
        let edge = Edge::new(&wf.id, &trigger.id, &bad.id);

        let graph = WorkflowGraph::new(wf, vec![trigger, bad], vec![edge]).unwrap();

        let engine = build_engine();
        let sink = RecordingSink::default();
        let run_handle = RunHandle::new(None);

        let execution = engine.start_run(&graph, TriggerEnvelope::Manual, &sink, &run_handle).await.unwrap();
        assert_eq!(execution.status, wfengine_model::execution::ExecutionStatus::Failed);
        assert!(execution.error.is_some());
    }
}
