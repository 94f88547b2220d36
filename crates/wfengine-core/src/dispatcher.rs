//! `StepDispatcher` and the non-branching handler catalog (§4.3). The
//! branching/fan-in kinds (`condition`, `switch`, `loop`, `filter`,
//! `merge`) need direct access to the graph and recursive dispatch, so
//! `FlowController` executes them inline; everything here is the closed
//! set of "leaf" kinds dispatched through a `NodeExecutorRegistry`-style
//! handler map, grounded on the teacher's `NodeExecutorRegistry` in
//! `n8n-core::engine`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use wfengine_model::step::{Step, StepKind};

use crate::error::EngineError;
use crate::expression::TemplateResolver;
use crate::llm::{CompletionRequest, LLMProvider, ResponseHint};

/// Everything a handler needs besides the step itself: the resolved
/// inputs view (§4.3 "Inputs view"), a read-only snapshot of the run's
/// outputs so far, and the LLM capability.
pub struct DispatchContext<'a> {
    pub inputs: HashMap<String, Value>,
    pub outputs: &'a HashMap<String, Value>,
    pub llm: &'a dyn LLMProvider,
}

impl<'a> DispatchContext<'a> {
    pub fn new(inputs: HashMap<String, Value>, outputs: &'a HashMap<String, Value>, llm: &'a dyn LLMProvider) -> Self {
        DispatchContext { inputs, outputs, llm }
    }

    fn resolve(&self, template: &str) -> String {
        TemplateResolver::resolve(template, &self.inputs)
    }

    fn config_str<'s>(step: &'s Step, key: &str, default: &'s str) -> &'s str {
        step.config.get(key).and_then(|v| v.as_str()).unwrap_or(default)
    }
}

#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn handle(&self, step: &Step, ctx: &DispatchContext<'_>) -> Result<Value, EngineError>;
}

/// Dispatches a non-branching step kind to its registered handler.
pub struct StepDispatcher {
    handlers: HashMap<StepKind, Arc<dyn StepHandler>>,
}

impl Default for StepDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StepDispatcher {
    /// The LLM provider is not bound here — it travels per-call inside
    /// `DispatchContext`, since a single dispatcher instance is shared
    /// across runs that may use different providers (e.g. a per-run
    /// credential override).
    pub fn new() -> Self {
        let mut handlers: HashMap<StepKind, Arc<dyn StepHandler>> = HashMap::new();

        handlers.insert(StepKind::ManualTrigger, Arc::new(TriggerPassthroughHandler));
        handlers.insert(StepKind::ScheduleTrigger, Arc::new(TriggerPassthroughHandler));
        handlers.insert(StepKind::WebhookTrigger, Arc::new(TriggerPassthroughHandler));
        handlers.insert(StepKind::AppEventTrigger, Arc::new(TriggerPassthroughHandler));
        handlers.insert(StepKind::WorkflowTrigger, Arc::new(TriggerPassthroughHandler));

        handlers.insert(StepKind::BasicLlmChain, Arc::new(BasicLlmChainHandler));
        handlers.insert(StepKind::AiTransform, Arc::new(AiTransformHandler));
        handlers.insert(StepKind::InformationExtractor, Arc::new(InformationExtractorHandler));
        handlers.insert(StepKind::QaChain, Arc::new(QaChainHandler));
        handlers.insert(StepKind::SentimentAnalysis, Arc::new(SentimentAnalysisHandler));
        handlers.insert(StepKind::SummarizationChain, Arc::new(SummarizationChainHandler));
        handlers.insert(StepKind::TextClassifier, Arc::new(TextClassifierHandler));

        StepDispatcher { handlers }
    }

    /// Register or replace a handler — used by tests to substitute a
    /// deterministic stand-in for an AI kind.
    pub fn register(&mut self, kind: StepKind, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub async fn dispatch(&self, step: &Step, ctx: &DispatchContext<'_>) -> Result<Value, EngineError> {
        let handler = self
            .handlers
            .get(&step.kind)
            .ok_or_else(|| EngineError::TypeError(format!("no handler registered for step kind {:?}", step.kind)))?;
        handler.handle(step, ctx).await
    }
}

/// Triggers are seeded by the engine at run start (§4.1 step 4); if a
/// trigger step is dispatched again (e.g. re-entered as an ordinary
/// successor of another step), it simply returns what is already in its
/// own output slot.
struct TriggerPassthroughHandler;

#[async_trait]
impl StepHandler for TriggerPassthroughHandler {
    async fn handle(&self, step: &Step, ctx: &DispatchContext<'_>) -> Result<Value, EngineError> {
        Ok(ctx.outputs.get(&step.id).cloned().unwrap_or(Value::Null))
    }
}

fn max_tokens(step: &Step) -> u32 {
    step.config.get("maxTokens").and_then(|v| v.as_u64()).unwrap_or(1000) as u32
}

fn temperature(step: &Step, default: f32) -> f32 {
    step.config.get("temperature").and_then(|v| v.as_f64()).map(|v| v as f32).unwrap_or(default)
}

/// Extracts the first fenced code block, or the first `{...}` substring,
/// and parses it as JSON. Falls back to `None` on any failure so callers
/// can apply their own sentinel fallback per §4.3.
fn try_parse_json_response(text: &str) -> Option<Value> {
    if let Some(start) = text.find("```") {
        let after_fence = &text[start + 3..];
        let after_fence = after_fence.strip_prefix("json").unwrap_or(after_fence);
        if let Some(end) = after_fence.find("```") {
            let candidate = after_fence[..end].trim();
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Some(value);
            }
        }
    }

    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end > start {
                let candidate = &text[start..=end];
                if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                    return Some(value);
                }
            }
        }
    }

    None
}

struct BasicLlmChainHandler;

#[async_trait]
impl StepHandler for BasicLlmChainHandler {
    async fn handle(&self, step: &Step, ctx: &DispatchContext<'_>) -> Result<Value, EngineError> {
        let template = DispatchContext::config_str(step, "prompt", "");
        let prompt = ctx.resolve(template);

        let request = CompletionRequest::new("", prompt)
            .with_max_tokens(max_tokens(step))
            .with_temperature(temperature(step, 0.7));

        let text = ctx.llm.complete(request).await?;
        Ok(Value::String(text))
    }
}

struct AiTransformHandler;

#[async_trait]
impl StepHandler for AiTransformHandler {
    async fn handle(&self, step: &Step, ctx: &DispatchContext<'_>) -> Result<Value, EngineError> {
        let input_path = DispatchContext::config_str(step, "input", "_all");
        let input_value = crate::expression::resolve_path(input_path, &ctx.inputs).unwrap_or(Value::Null);

        let template = DispatchContext::config_str(step, "prompt", "Transform this: {{_all}}");
        let mut scoped_inputs = ctx.inputs.clone();
        scoped_inputs.insert("_all".to_string(), input_value);
        let prompt = TemplateResolver::resolve(template, &scoped_inputs);

        let request = CompletionRequest::new("", prompt)
            .with_max_tokens(max_tokens(step))
            .with_temperature(temperature(step, 0.7));

        let text = ctx.llm.complete(request).await?;
        Ok(Value::String(text))
    }
}

struct InformationExtractorHandler;

#[async_trait]
impl StepHandler for InformationExtractorHandler {
    async fn handle(&self, step: &Step, ctx: &DispatchContext<'_>) -> Result<Value, EngineError> {
        let schema = step.config.get("schema").cloned().unwrap_or(Value::Null);
        let system = format!(
            "Extract structured information matching this JSON schema and respond with only the JSON object: {schema}"
        );
        let input_text = ctx.resolve(DispatchContext::config_str(step, "prompt", "{{_all}}"));

        let request = CompletionRequest::new(system, input_text)
            .with_max_tokens(max_tokens(step))
            .with_temperature(0.1)
            .with_response_hint(ResponseHint::Extraction);

        let text = ctx.llm.complete(request).await?;
        Ok(try_parse_json_response(&text).unwrap_or(Value::String(text)))
    }
}

struct QaChainHandler;

#[async_trait]
impl StepHandler for QaChainHandler {
    async fn handle(&self, step: &Step, ctx: &DispatchContext<'_>) -> Result<Value, EngineError> {
        let context_path = DispatchContext::config_str(step, "context", "_all");
        let context_value = crate::expression::resolve_path(context_path, &ctx.inputs).unwrap_or(Value::Null);

        let question_template = DispatchContext::config_str(step, "question", "");
        let question = ctx.resolve(question_template);

        let system = "Answer the question using only the provided context.".to_string();
        let user_content = format!(
            "Context: {}\nQuestion: {question}",
            serde_json::to_string(&context_value).unwrap_or_default()
        );

        let request = CompletionRequest::new(system, user_content)
            .with_max_tokens(max_tokens(step))
            .with_temperature(temperature(step, 0.7));

        let text = ctx.llm.complete(request).await?;
        Ok(Value::String(text))
    }
}

struct SentimentAnalysisHandler;

#[async_trait]
impl StepHandler for SentimentAnalysisHandler {
    async fn handle(&self, step: &Step, ctx: &DispatchContext<'_>) -> Result<Value, EngineError> {
        let input_text = ctx.resolve(DispatchContext::config_str(step, "input", "{{_all}}"));

        let system = "Analyze the sentiment of the given text. Respond with a JSON object \
            {\"sentiment\": \"positive\"|\"negative\"|\"neutral\", \"score\": number between -1 and 1, \
            \"explanation\": string}."
            .to_string();

        let request = CompletionRequest::new(system, input_text)
            .with_max_tokens(max_tokens(step))
            .with_temperature(0.2)
            .with_response_hint(ResponseHint::Sentiment);

        let text = ctx.llm.complete(request).await?;
        Ok(try_parse_json_response(&text).unwrap_or_else(|| {
            let mut fallback = Map::new();
            fallback.insert("sentiment".to_string(), Value::String("neutral".to_string()));
            fallback.insert("score".to_string(), Value::from(0));
            fallback.insert("explanation".to_string(), Value::String(text));
            Value::Object(fallback)
        }))
    }
}

struct SummarizationChainHandler;

#[async_trait]
impl StepHandler for SummarizationChainHandler {
    async fn handle(&self, step: &Step, ctx: &DispatchContext<'_>) -> Result<Value, EngineError> {
        let length = DispatchContext::config_str(step, "length", "medium");
        let input_text = ctx.resolve(DispatchContext::config_str(step, "input", "{{_all}}"));

        let system = format!("Summarize the following text at {length} length.");

        let request = CompletionRequest::new(system, input_text)
            .with_max_tokens(max_tokens(step))
            .with_temperature(temperature(step, 0.5));

        let text = ctx.llm.complete(request).await?;
        Ok(Value::String(text))
    }
}

struct TextClassifierHandler;

#[async_trait]
impl StepHandler for TextClassifierHandler {
    async fn handle(&self, step: &Step, ctx: &DispatchContext<'_>) -> Result<Value, EngineError> {
        let categories: Vec<String> = step
            .config
            .get("categories")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_else(|| vec!["positive".to_string(), "negative".to_string(), "neutral".to_string()]);

        let input_text = ctx.resolve(DispatchContext::config_str(step, "input", "{{_all}}"));
        let system = format!(
            "Classify the following text into exactly one of: {}. Respond with a JSON object \
            {{\"category\": string, \"confidence\": number, \"explanation\": string}}.",
            categories.join(", ")
        );

        let request = CompletionRequest::new(system, input_text)
            .with_max_tokens(max_tokens(step))
            .with_temperature(0.2)
            .with_response_hint(ResponseHint::Classification { categories: categories.clone() });

        let text = ctx.llm.complete(request).await?;
        Ok(try_parse_json_response(&text).unwrap_or_else(|| {
            let mut fallback = Map::new();
            fallback.insert("category".to_string(), Value::String(categories.first().cloned().unwrap_or_default()));
            fallback.insert("confidence".to_string(), Value::from(0));
            fallback.insert("explanation".to_string(), Value::String(text));
            Value::Object(fallback)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmProvider;
    use wfengine_model::step::StepKind;

    fn step_with_config(kind: StepKind, config: Value) -> Step {
        let mut step = Step::new("wf-1", kind, "test step");
        step.config = config.as_object().cloned().unwrap_or_default();
        step
    }

    #[tokio::test]
    async fn basic_llm_chain_resolves_template_and_calls_provider() {
        let llm = MockLlmProvider;
        let outputs = HashMap::new();
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), Value::String("world".to_string()));

        let step = step_with_config(StepKind::BasicLlmChain, serde_json::json!({"prompt": "hello {{a}}"}));
        let ctx = DispatchContext::new(inputs, &outputs, &llm);

        let dispatcher = StepDispatcher::new();
        let result = dispatcher.dispatch(&step, &ctx).await.unwrap();
        assert_eq!(result, Value::String("[MOCK] hello world".to_string()));
    }

    #[tokio::test]
    async fn sentiment_analysis_falls_back_on_unparseable_mock_json() {
        // The mock provider returns a parseable sentiment sentinel, so this
        // exercises the happy structured-parse path rather than the fallback.
        let llm = MockLlmProvider;
        let outputs = HashMap::new();
        let inputs = HashMap::new();
        let step = step_with_config(StepKind::SentimentAnalysis, serde_json::json!({}));
        let ctx = DispatchContext::new(inputs, &outputs, &llm);

        let dispatcher = StepDispatcher::new();
        let result = dispatcher.dispatch(&step, &ctx).await.unwrap();
        assert_eq!(result["sentiment"], Value::String("positive".to_string()));
    }

    #[tokio::test]
    async fn trigger_passthrough_returns_seeded_output() {
        let llm = MockLlmProvider;
        let mut outputs = HashMap::new();
        let step = step_with_config(StepKind::ManualTrigger, serde_json::json!({}));
        outputs.insert(step.id.clone(), serde_json::json!({"triggered": true}));
        let inputs = HashMap::new();
        let ctx = DispatchContext::new(inputs, &outputs, &llm);

        let dispatcher = StepDispatcher::new();
        let result = dispatcher.dispatch(&step, &ctx).await.unwrap();
        assert_eq!(result, serde_json::json!({"triggered": true}));
    }
}
