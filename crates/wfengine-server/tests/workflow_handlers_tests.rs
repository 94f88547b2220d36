//! Round-trip property: `PATCH` a workflow's graph, then `GET` it back, and
//! the steps/edges returned must match what was sent (§8 property 7). Calls
//! the handler functions directly with hand-built extractors, the same way
//! `tests/webhook_tests.rs` drives `TriggerGateway` without an HTTP server.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use serde_json::{json, Value};

use wfengine_model::edge::Edge;
use wfengine_model::step::{Step, StepKind};
use wfengine_model::workflow::Workflow;
use wfengine_server::config::{AppState, Config};
use wfengine_server::handlers::{create_workflow, get_workflow, update_workflow, CreateWorkflowRequest, UpdateWorkflowRequest};

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: None,
        anthropic_api_key: None,
        credential_encryption_key: "test-only-key".to_string(),
    }
}

async fn response_body(response: impl IntoResponse) -> Value {
    let response = response.into_response();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn patch_then_get_returns_the_graph_exactly_as_sent() {
    let state = AppState::new(test_config()).await.unwrap();

    let created = create_workflow(
        State(state.clone()),
        axum::Json(CreateWorkflowRequest { name: "round-trip".to_string(), description: None }),
    )
    .await
    .unwrap();
    let created: Workflow = serde_json::from_value(response_body(created).await).unwrap();

    let trigger = Step::new(&created.id, StepKind::ManualTrigger, "start");
    let mut code = Step::new(&created.id, StepKind::Code, "double");
    code.config = json!({"code": "return 2 * 2;"}).as_object().cloned().unwrap();
    let edge = Edge::new(&created.id, &trigger.id, &code.id).with_label("next");

    let patch_body = UpdateWorkflowRequest {
        name: Some("round-trip-renamed".to_string()),
        description: Some("now has a description".to_string()),
        is_active: Some(true),
        steps: Some(vec![trigger.clone(), code.clone()]),
        edges: Some(vec![edge.clone()]),
    };

    update_workflow(State(state.clone()), Path(created.id.clone()), axum::Json(patch_body)).await.unwrap();

    let fetched = get_workflow(State(state.clone()), Path(created.id.clone())).await.unwrap();
    let fetched = response_body(fetched).await;

    assert_eq!(fetched["name"], json!("round-trip-renamed"));
    assert_eq!(fetched["description"], json!("now has a description"));
    assert_eq!(fetched["isActive"], json!(true));

    let steps = fetched["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().any(|s| s["id"] == json!(trigger.id) && s["label"] == json!("start")));
    assert!(steps.iter().any(|s| s["id"] == json!(code.id) && s["config"]["code"] == json!("return 2 * 2;")));

    let edges = fetched["edges"].as_array().unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0]["sourceId"], json!(trigger.id));
    assert_eq!(edges[0]["targetId"], json!(code.id));
    assert_eq!(edges[0]["label"], json!("next"));
}

#[tokio::test]
async fn patch_without_a_graph_preserves_the_existing_steps_and_edges() {
    let state = AppState::new(test_config()).await.unwrap();

    let created = create_workflow(
        State(state.clone()),
        axum::Json(CreateWorkflowRequest { name: "preserve".to_string(), description: None }),
    )
    .await
    .unwrap();
    let created: Workflow = serde_json::from_value(response_body(created).await).unwrap();

    let trigger = Step::new(&created.id, StepKind::ManualTrigger, "start");
    update_workflow(
        State(state.clone()),
        Path(created.id.clone()),
        axum::Json(UpdateWorkflowRequest {
            name: None,
            description: None,
            is_active: None,
            steps: Some(vec![trigger.clone()]),
            edges: Some(vec![]),
        }),
    )
    .await
    .unwrap();

    update_workflow(
        State(state.clone()),
        Path(created.id.clone()),
        axum::Json(UpdateWorkflowRequest {
            name: Some("preserve-renamed".to_string()),
            description: None,
            is_active: None,
            steps: None,
            edges: None,
        }),
    )
    .await
    .unwrap();

    let fetched = response_body(get_workflow(State(state.clone()), Path(created.id.clone())).await.unwrap()).await;
    assert_eq!(fetched["name"], json!("preserve-renamed"));
    let steps = fetched["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["id"], json!(trigger.id));
}
