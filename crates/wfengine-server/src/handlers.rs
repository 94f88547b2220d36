//! HTTP handlers for the workflow/execution/credential surface (§6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use wfengine_core::runtime::RunHandle;
use wfengine_model::credential::Credential;
use wfengine_model::edge::Edge;
use wfengine_model::step::Step;
use wfengine_model::trigger::TriggerEnvelope;
use wfengine_model::workflow::{Workflow, WorkflowGraph};

use crate::config::AppState;
use crate::error::ApiError;
use crate::execution_sink::StoreExecutionSink;
use crate::trigger_gateway::TriggerGateway;

// ─── workflows ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WorkflowWithGraph {
    #[serde(flatten)]
    workflow: Workflow,
    steps: Vec<Step>,
    edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn list_workflows(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let workflows = state.store.list_workflows().await?;
    Ok(Json(workflows))
}

pub async fn get_workflow(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.store.get_workflow(&id).await?.ok_or_else(|| ApiError::NotFound(format!("workflow {id} not found")))?;
    let steps = state.store.get_steps(&id).await?;
    let edges = state.store.get_edges(&id).await?;
    Ok(Json(WorkflowWithGraph { workflow, steps, edges }))
}

pub async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<CreateWorkflowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut workflow = Workflow::new(body.name);
    workflow.description = body.description;
    let created = state.store.create_workflow(workflow).await?;
    Ok(Json(created))
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkflowRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    /// When present, fully replaces the step/edge graph (§6 PATCH semantics).
    #[serde(default)]
    pub steps: Option<Vec<Step>>,
    #[serde(default)]
    pub edges: Option<Vec<Edge>>,
}

pub async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateWorkflowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut workflow = state.store.get_workflow(&id).await?.ok_or_else(|| ApiError::NotFound(format!("workflow {id} not found")))?;

    if let Some(name) = body.name {
        workflow.name = name;
    }
    if let Some(description) = body.description {
        workflow.description = Some(description);
    }
    if let Some(is_active) = body.is_active {
        workflow.is_active = is_active;
    }
    workflow.updated_at = chrono::Utc::now();

    let steps = match body.steps {
        Some(steps) => steps,
        None => state.store.get_steps(&id).await?,
    };
    let edges = match body.edges {
        Some(edges) => edges,
        None => state.store.get_edges(&id).await?,
    };

    // Validate before persisting so a dangling-edge PATCH never reaches Store.
    WorkflowGraph::new(workflow.clone(), steps.clone(), edges.clone()).map_err(|e| ApiError::Validation(e.to_string()))?;

    state.store.update_workflow(workflow.clone(), steps, edges).await?;
    Ok(Json(workflow))
}

pub async fn delete_workflow(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.store.delete_workflow(&id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("workflow {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn load_graph(state: &AppState, workflow_id: &str) -> Result<WorkflowGraph, ApiError> {
    let workflow = state.store.get_workflow(workflow_id).await?.ok_or_else(|| ApiError::NotFound(format!("workflow {workflow_id} not found")))?;
    let steps = state.store.get_steps(workflow_id).await?;
    let edges = state.store.get_edges(workflow_id).await?;
    WorkflowGraph::new(workflow, steps, edges).map_err(|e| ApiError::Internal(e.to_string()))
}

/// `POST /api/workflows/{id}/execute`: starts a manual run synchronously and
/// returns its terminal state (§4.1, §6).
pub async fn execute_workflow(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let graph = load_graph(&state, &id).await?;
    let sink = StoreExecutionSink::new(state.store.clone());
    let run_handle = RunHandle::new(None);

    let execution = state.engine.start_run(&graph, TriggerEnvelope::Manual, &sink, &run_handle).await?;
    Ok(Json(execution))
}

// ─── executions ─────────────────────────────────────────────────────────

pub async fn get_execution(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let execution = state.store.get_execution(&id).await?.ok_or_else(|| ApiError::NotFound(format!("execution {id} not found")))?;
    Ok(Json(execution))
}

// ─── trigger admission ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AdmittedRun {
    execution_id: String,
}

#[derive(Debug, Serialize)]
struct AdmittedRuns {
    execution_ids: Vec<String>,
}

pub async fn webhook_trigger(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    axum::extract::Query(query): axum::extract::Query<HashMap<String, String>>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers.get("x-webhook-signature").and_then(|v| v.to_str().ok());
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let header_map: HashMap<String, String> =
        headers.iter().filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string()))).collect();

    let execution_id = TriggerGateway::admit_webhook(&state, &webhook_id, &body, signature, payload, header_map, query).await?;
    Ok((StatusCode::ACCEPTED, Json(AdmittedRun { execution_id })))
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

pub async fn event_trigger(State(state): State<AppState>, Json(body): Json<EventRequest>) -> Result<impl IntoResponse, ApiError> {
    let execution_ids = TriggerGateway::admit_event(&state, &body.event_type, body.payload).await?;
    Ok((StatusCode::ACCEPTED, Json(AdmittedRuns { execution_ids })))
}

#[derive(Debug, Deserialize)]
pub struct ChainRequest {
    pub target_workflow_id: String,
}

pub async fn chain_trigger(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ChainRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let execution_id = TriggerGateway::admit_chain(&state, &id, &body.target_workflow_id).await?;
    Ok((StatusCode::ACCEPTED, Json(AdmittedRun { execution_id })))
}

// ─── credentials ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CredentialSummary {
    id: String,
    name: String,
    kind: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Credential> for CredentialSummary {
    fn from(c: Credential) -> Self {
        CredentialSummary { id: c.id, name: c.name, kind: c.kind, created_at: c.created_at }
    }
}

pub async fn list_credentials(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let credentials = state.store.list_credentials().await?;
    let summaries: Vec<CredentialSummary> = credentials.into_iter().map(CredentialSummary::from).collect();
    Ok(Json(summaries))
}

#[derive(Debug, Deserialize)]
pub struct CreateCredentialRequest {
    pub name: String,
    pub kind: String,
    /// Plaintext provider data (e.g. `{"apiKey": "..."}`), encrypted before
    /// it ever reaches Store.
    pub data: Value,
}

pub async fn create_credential(
    State(state): State<AppState>,
    Json(body): Json<CreateCredentialRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let encrypted = state.credentials.encrypt(&body.data).map_err(|e| ApiError::Internal(e.to_string()))?;
    let credential = Credential::new(body.name, body.kind, encrypted);
    let created = state.store.create_credential(credential).await?;
    Ok(Json(CredentialSummary::from(created)))
}

pub async fn delete_credential(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.store.delete_credential(&id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("credential {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ─── health ─────────────────────────────────────────────────────────────

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}
