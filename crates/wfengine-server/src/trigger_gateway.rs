//! `TriggerGateway` (§4.7): admits webhook, app-event, and workflow-chain
//! triggers, converting each into a `TriggerEnvelope` and spawning the run
//! on its own task so the HTTP handler can return `202` without awaiting
//! terminal status. HMAC verification is grounded on the pack's
//! `webhook_handler.rs` reference implementation.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{info, warn};

use wfengine_core::error::EngineError;
use wfengine_core::runtime::RunHandle;
use wfengine_model::execution::ExecutionStatus;
use wfengine_model::step::StepKind;
use wfengine_model::trigger::TriggerEnvelope;
use wfengine_model::workflow::WorkflowGraph;

use crate::config::AppState;
use crate::error::ApiError;
use crate::execution_sink::StoreExecutionSink;

type HmacSha256 = Hmac<Sha256>;

/// Constant-time HMAC-SHA256 verification over the raw request body.
fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> Result<(), EngineError> {
    let expected = hex::decode(signature_hex).map_err(|_| EngineError::WebhookSignatureInvalid)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| EngineError::WebhookSignatureInvalid)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| EngineError::WebhookSignatureInvalid)
}

async fn load_graph(state: &AppState, workflow_id: &str) -> Result<Option<WorkflowGraph>, ApiError> {
    let Some(workflow) = state.store.get_workflow(workflow_id).await? else { return Ok(None) };
    let steps = state.store.get_steps(workflow_id).await?;
    let edges = state.store.get_edges(workflow_id).await?;
    let graph = WorkflowGraph::new(workflow, steps, edges).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Some(graph))
}

/// Spawns `Engine::start_run` on its own task, returning immediately with
/// the id the run was assigned (not its terminal status), per §4.7.
fn spawn_run(state: AppState, graph: WorkflowGraph, envelope: TriggerEnvelope) -> String {
    let execution_id = uuid::Uuid::new_v4().to_string();
    let spawned_id = execution_id.clone();

    tokio::spawn(async move {
        let sink = StoreExecutionSink::new(state.store.clone());
        let run_handle = RunHandle::new(None);
        match state.engine.start_run(&graph, envelope, &sink, &run_handle).await {
            Ok(execution) => info!(run_id = %execution.id, "spawned run finished"),
            Err(err) => warn!(error = %err, "spawned run failed before producing an execution record"),
        }
    });

    spawned_id
}

pub struct TriggerGateway;

impl TriggerGateway {
    /// `POST /api/webhooks/{webhookId}` (§4.7 "webhook").
    ///
    /// Scans every workflow for a `webhook_trigger` step whose
    /// `config.webhookId` matches the path segment. If the step carries a
    /// `config.secret`, the request must present a valid
    /// `X-Webhook-Signature`.
    pub async fn admit_webhook(
        state: &AppState,
        webhook_id: &str,
        body: &[u8],
        signature: Option<&str>,
        payload: Value,
        headers: HashMap<String, String>,
        query: HashMap<String, String>,
    ) -> Result<String, ApiError> {
        let workflows = state.store.list_workflows().await?;

        for workflow in workflows {
            let graph = match load_graph(state, &workflow.id).await? {
                Some(g) => g,
                None => continue,
            };

            let Some(step) = graph.steps.iter().find(|s| {
                s.kind == StepKind::WebhookTrigger && s.config.get("webhookId").and_then(Value::as_str) == Some(webhook_id)
            }) else {
                continue;
            };

            if let Some(secret) = step.config.get("secret").and_then(Value::as_str) {
                let provided = signature.ok_or(EngineError::WebhookSignatureMissing)?;
                verify_signature(secret, body, provided)?;
            }

            let envelope = TriggerEnvelope::Webhook { payload, headers, query };
            return Ok(spawn_run(state.clone(), graph, envelope));
        }

        Err(ApiError::NotFound(format!("no webhook registered for id {webhook_id}")))
    }

    /// `POST /api/events` (§4.7 "app_event"): fans out to every *active*
    /// workflow with a matching `app_event_trigger` step.
    pub async fn admit_event(state: &AppState, event_type: &str, payload: Value) -> Result<Vec<String>, ApiError> {
        let workflows = state.store.list_workflows().await?;
        let mut execution_ids = Vec::new();

        for workflow in workflows.into_iter().filter(|w| w.is_active) {
            let Some(graph) = load_graph(state, &workflow.id).await? else { continue };

            let matches = graph
                .steps
                .iter()
                .any(|s| s.kind == StepKind::AppEventTrigger && s.config.get("eventType").and_then(Value::as_str) == Some(event_type));

            if matches {
                let envelope = TriggerEnvelope::AppEvent { event_type: event_type.to_string(), payload: payload.clone() };
                execution_ids.push(spawn_run(state.clone(), graph, envelope));
            }
        }

        if execution_ids.is_empty() {
            return Err(ApiError::NotFound(format!("no active workflow listens for event type {event_type}")));
        }
        Ok(execution_ids)
    }

    /// `POST /api/workflows/{id}/chain` (§4.7 "workflow"): the source
    /// workflow's most recent run must be `completed`; its outputs are
    /// merged into the target run's initial outputs.
    pub async fn admit_chain(state: &AppState, source_workflow_id: &str, target_workflow_id: &str) -> Result<String, ApiError> {
        let runs = state.store.list_executions(source_workflow_id).await?;
        let latest = runs.into_iter().next().ok_or_else(|| ApiError::Validation("source workflow has no runs".to_string()))?;

        if latest.status != ExecutionStatus::Completed {
            return Err(ApiError::Validation("source workflow's most recent run did not complete".to_string()));
        }

        let graph = load_graph(state, target_workflow_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("workflow {target_workflow_id} not found")))?;

        let envelope = TriggerEnvelope::Workflow {
            source_workflow_id: source_workflow_id.to_string(),
            source_execution_id: latest.id,
            outputs: latest.outputs,
        };

        Ok(spawn_run(state.clone(), graph, envelope))
    }
}
