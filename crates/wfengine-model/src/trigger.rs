//! The `TriggerEnvelope` admitted by the trigger gateway (§4.7, §9).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::step::StepKind;

/// A typed payload admitted by the trigger gateway and handed to the
/// engine to seed the matching trigger step's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEnvelope {
    Manual,
    Webhook {
        payload: Value,
        headers: HashMap<String, String>,
        query: HashMap<String, String>,
    },
    Schedule {
        fired_at: chrono::DateTime<chrono::Utc>,
    },
    AppEvent {
        event_type: String,
        payload: Value,
    },
    Workflow {
        source_workflow_id: String,
        source_execution_id: String,
        outputs: HashMap<String, Value>,
    },
}

impl TriggerEnvelope {
    /// The step kind this envelope matches, per the table in §4.7.
    pub fn step_kind(&self) -> StepKind {
        match self {
            TriggerEnvelope::Manual => StepKind::ManualTrigger,
            TriggerEnvelope::Webhook { .. } => StepKind::WebhookTrigger,
            TriggerEnvelope::Schedule { .. } => StepKind::ScheduleTrigger,
            TriggerEnvelope::AppEvent { .. } => StepKind::AppEventTrigger,
            TriggerEnvelope::Workflow { .. } => StepKind::WorkflowTrigger,
        }
    }

    /// `triggerType` discriminant string seeded into the trigger step's
    /// output object (§4.1 step 4: `{triggered: true, triggerType, ...}`).
    pub fn trigger_type(&self) -> &'static str {
        match self {
            TriggerEnvelope::Manual => "manual",
            TriggerEnvelope::Webhook { .. } => "webhook",
            TriggerEnvelope::Schedule { .. } => "schedule",
            TriggerEnvelope::AppEvent { .. } => "app_event",
            TriggerEnvelope::Workflow { .. } => "workflow",
        }
    }

    /// Build the seeded output object for the trigger step:
    /// `{triggered: true, triggerType, ...envelope}`.
    pub fn seed_value(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("triggered".to_string(), Value::Bool(true));
        obj.insert("triggerType".to_string(), Value::String(self.trigger_type().to_string()));

        match self {
            TriggerEnvelope::Manual => {}
            TriggerEnvelope::Webhook { payload, headers, query } => {
                obj.insert("payload".to_string(), payload.clone());
                obj.insert("headers".to_string(), serde_json::to_value(headers).unwrap_or(Value::Null));
                obj.insert("query".to_string(), serde_json::to_value(query).unwrap_or(Value::Null));
            }
            TriggerEnvelope::Schedule { fired_at } => {
                obj.insert("firedAt".to_string(), Value::String(fired_at.to_rfc3339()));
            }
            TriggerEnvelope::AppEvent { event_type, payload } => {
                obj.insert("eventType".to_string(), Value::String(event_type.clone()));
                obj.insert("payload".to_string(), payload.clone());
            }
            TriggerEnvelope::Workflow {
                source_workflow_id,
                source_execution_id,
                ..
            } => {
                obj.insert("sourceWorkflowId".to_string(), Value::String(source_workflow_id.clone()));
                obj.insert("sourceExecutionId".to_string(), Value::String(source_execution_id.clone()));
            }
        }

        Value::Object(obj)
    }

    /// Prior outputs to merge into the new run (only non-empty for a
    /// workflow-chain trigger).
    pub fn prior_outputs(&self) -> HashMap<String, Value> {
        match self {
            TriggerEnvelope::Workflow { outputs, .. } => outputs.clone(),
            _ => HashMap::new(),
        }
    }
}
