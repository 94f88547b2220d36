//! S5 (webhook signed trigger) and the paired auth-failure invariant (§8.5):
//! exercised directly against `TriggerGateway::admit_webhook` over a
//! `MemoryStore`-backed `AppState`, the same way the handlers themselves
//! call it, without spinning up a TCP listener.

use std::collections::HashMap;
use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use wfengine_model::execution::ExecutionStatus;
use wfengine_model::step::{Step, StepKind};
use wfengine_model::workflow::Workflow;
use wfengine_server::config::{AppState, Config};
use wfengine_server::trigger_gateway::TriggerGateway;

type HmacSha256 = Hmac<Sha256>;

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: None,
        anthropic_api_key: None,
        credential_encryption_key: "test-only-key".to_string(),
    }
}

async fn seed_webhook_workflow(state: &AppState, webhook_id: &str, secret: &str) -> Workflow {
    let workflow = state.store.create_workflow(Workflow::new("webhook-wf")).await.unwrap();

    let mut trigger = Step::new(&workflow.id, StepKind::WebhookTrigger, "incoming");
    trigger.config = serde_json::json!({"webhookId": webhook_id, "secret": secret}).as_object().cloned().unwrap();

    let mut transform = Step::new(&workflow.id, StepKind::AiTransform, "transform");
    transform.config =
        serde_json::json!({"input": format!("{}.payload", trigger.id), "prompt": "Transformed: {{_all}}"})
            .as_object()
            .cloned()
            .unwrap();

    let edge = wfengine_model::edge::Edge::new(&workflow.id, &trigger.id, &transform.id);

    state.store.update_workflow(workflow.clone(), vec![trigger, transform], vec![edge]).await.unwrap();
    workflow
}

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

async fn wait_for_completion(state: &AppState, workflow_id: &str) -> wfengine_model::execution::WorkflowExecution {
    for _ in 0..50 {
        let mut runs = state.store.list_executions(workflow_id).await.unwrap();
        if let Some(run) = runs.pop() {
            if run.status != ExecutionStatus::Running {
                return run;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("webhook-triggered run did not finish in time");
}

#[tokio::test]
async fn s5_correctly_signed_webhook_admits_and_completes_the_run() {
    let state = AppState::new(test_config()).await.unwrap();
    let workflow = seed_webhook_workflow(&state, "w1", "k").await;

    let body = br#"{"m":"hi"}"#;
    let signature = sign("k", body);

    TriggerGateway::admit_webhook(
        &state,
        "w1",
        body,
        Some(&signature),
        serde_json::json!({"m": "hi"}),
        HashMap::new(),
        HashMap::new(),
    )
    .await
    .unwrap();

    let run = wait_for_completion(&state, &workflow.id).await;
    assert_eq!(run.status, ExecutionStatus::Completed);

    let transform_output = run.outputs.values().find_map(|v| v.as_str()).expect("transform step produced a string output");
    assert!(transform_output.starts_with("[MOCK] Transformed:"), "got: {transform_output}");
}

#[tokio::test]
async fn s5_tampered_signature_is_rejected_and_creates_no_run() {
    let state = AppState::new(test_config()).await.unwrap();
    let workflow = seed_webhook_workflow(&state, "w2", "k").await;

    let body = br#"{"m":"hi"}"#;
    let mut signature = sign("k", body);
    let last = signature.pop().unwrap();
    signature.push(if last == '0' { '1' } else { '0' });

    let result = TriggerGateway::admit_webhook(
        &state,
        "w2",
        body,
        Some(&signature),
        serde_json::json!({"m": "hi"}),
        HashMap::new(),
        HashMap::new(),
    )
    .await;

    assert!(result.is_err());
    let runs = state.store.list_executions(&workflow.id).await.unwrap();
    assert!(runs.is_empty(), "a tampered signature must not start a run");
}

#[tokio::test]
async fn s5_missing_signature_is_rejected_when_a_secret_is_configured() {
    let state = AppState::new(test_config()).await.unwrap();
    seed_webhook_workflow(&state, "w3", "k").await;

    let body = br#"{"m":"hi"}"#;
    let result =
        TriggerGateway::admit_webhook(&state, "w3", body, None, serde_json::json!({"m": "hi"}), HashMap::new(), HashMap::new())
            .await;

    assert!(result.is_err());
}
