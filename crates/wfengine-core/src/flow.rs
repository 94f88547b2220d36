//! `FlowController` (§4.2): traverses a workflow from a start set, dispatching
//! non-branching steps through `StepDispatcher` and handling the
//! branching/fan-in kinds (`condition`, `switch`, `loop`, `filter`, `merge`)
//! inline, since they need direct graph and recursion access that a leaf
//! `StepHandler` does not have.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::{Map, Value};

use wfengine_model::step::{Step, StepKind};
use wfengine_model::workflow::WorkflowGraph;

use crate::dispatcher::{DispatchContext, StepDispatcher};
use crate::error::EngineError;
use crate::expression::evaluator::Scope;
use crate::expression::{resolve_path, SandboxedExpr};
use crate::llm::LLMProvider;
use crate::runtime::RunHandle;

/// Observes step transitions as the flow controller walks the graph, so the
/// engine can persist `StepExecution` rows without the flow controller
/// touching Store directly (§4.3 "Handlers must not touch Store directly" —
/// the same boundary applies to the controller itself).
#[async_trait]
pub trait StepObserver: Send + Sync {
    async fn on_step_start(&self, step: &Step, input: &Value);
    async fn on_step_complete(&self, step: &Step, output: &Value);
    async fn on_step_failed(&self, step: &Step, error: &EngineError);
}

/// A `StepObserver` that records nothing — used by tests that only care
/// about the final outputs map.
pub struct NullObserver;

#[async_trait]
impl StepObserver for NullObserver {
    async fn on_step_start(&self, _step: &Step, _input: &Value) {}
    async fn on_step_complete(&self, _step: &Step, _output: &Value) {}
    async fn on_step_failed(&self, _step: &Step, _error: &EngineError) {}
}

pub struct FlowOutcome {
    pub outputs: HashMap<String, Value>,
    /// Non-fatal conditions encountered during the run (currently only
    /// `BRANCH_UNRESOLVED`), for the engine to `tracing::warn!`.
    pub warnings: Vec<String>,
}

/// Everything `dispatch_step` and its kind handlers need, bundled so the
/// recursive boxed-future signatures stay readable. All fields are
/// references, so `Deps` itself is `Copy` and travels by value through the
/// recursive calls rather than needing its own borrow lifetime threaded
/// alongside `RunState`'s.
#[derive(Clone, Copy)]
struct Deps<'a> {
    dispatcher: &'a StepDispatcher,
    llm: &'a dyn LLMProvider,
    sandbox: &'a SandboxedExpr,
    run_handle: &'a RunHandle,
    observer: &'a dyn StepObserver,
}

struct RunState<'g> {
    graph: &'g WorkflowGraph,
    outputs: HashMap<String, Value>,
    visited: HashSet<String>,
    call_path: Vec<String>,
    warnings: Vec<String>,
}

#[derive(Default)]
pub struct FlowController;

impl FlowController {
    pub fn new() -> Self {
        FlowController
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        graph: &WorkflowGraph,
        dispatcher: &StepDispatcher,
        llm: &dyn LLMProvider,
        sandbox: &SandboxedExpr,
        run_handle: &RunHandle,
        observer: &dyn StepObserver,
        seeded_outputs: HashMap<String, Value>,
        start_ids: &[String],
    ) -> Result<FlowOutcome, EngineError> {
        let deps = Deps { dispatcher, llm, sandbox, run_handle, observer };

        let mut state = RunState {
            graph,
            outputs: seeded_outputs,
            visited: HashSet::new(),
            call_path: Vec::new(),
            warnings: Vec::new(),
        };

        let mut starts: Vec<&Step> = start_ids.iter().filter_map(|id| graph.step(id)).collect();
        starts.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        let ordered_ids: Vec<String> = starts.into_iter().map(|s| s.id.clone()).collect();

        for step_id in ordered_ids {
            dispatch_step(step_id, &mut state, deps).await?;
        }

        Ok(FlowOutcome { outputs: state.outputs, warnings: state.warnings })
    }
}

fn build_inputs(step: &Step, state: &RunState<'_>) -> HashMap<String, Value> {
    let mut inputs = HashMap::new();
    let all: Map<String, Value> = state.outputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    inputs.insert("_all".to_string(), Value::Object(all));

    for pred_id in state.graph.predecessors(&step.id) {
        if let Some(v) = state.outputs.get(pred_id) {
            inputs.insert(pred_id.to_string(), v.clone());
        }
    }

    if let Some(item) = state.outputs.get("currentItem") {
        inputs.insert("currentItem".to_string(), item.clone());
    }

    inputs
}

fn sandbox_scope(inputs: &HashMap<String, Value>, outputs: &HashMap<String, Value>) -> Scope {
    let inputs_obj: Map<String, Value> = inputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let outputs_obj: Map<String, Value> = outputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    Scope::new()
        .bind("inputs", Value::Object(inputs_obj))
        .bind("context", Value::Object(Map::from_iter([("outputs".to_string(), Value::Object(outputs_obj))])))
}

fn stringify_switch_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Recursively dispatches one step (and, for non-branching kinds, its
/// successors) against the shared run state. Boxed because async fns
/// cannot be directly recursive.
fn dispatch_step<'a>(
    step_id: String,
    state: &'a mut RunState<'_>,
    deps: Deps<'a>,
) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>> {
    Box::pin(async move {
        if state.visited.contains(&step_id) {
            // Fan-in: first predecessor to reach a step wins (§4.2, §9).
            return Ok(());
        }
        if state.call_path.contains(&step_id) {
            let mut path = state.call_path.clone();
            path.push(step_id.clone());
            return Err(EngineError::CycleDetected { path });
        }

        deps.run_handle.check()?;

        let step = state
            .graph
            .step(&step_id)
            .cloned()
            .ok_or_else(|| EngineError::StepNotFound(step_id.clone()))?;

        state.call_path.push(step_id.clone());
        let result = dispatch_kind(&step, state, deps).await;
        state.call_path.pop();

        result?;
        // `merge` manages its own visited-insertion: it only commits once
        // every predecessor has arrived, so an early arrival must not be
        // marked visited (it would permanently block later arrivals from
        // ever re-entering it).
        if step.kind != StepKind::Merge {
            state.visited.insert(step_id);
        }
        Ok(())
    })
}

async fn dispatch_kind<'a>(step: &Step, state: &mut RunState<'a>, deps: Deps<'a>) -> Result<(), EngineError> {
    match step.kind {
        StepKind::Condition => handle_condition(step, state, deps).await,
        StepKind::Switch => handle_switch(step, state, deps).await,
        StepKind::Loop => handle_loop(step, state, deps).await,
        StepKind::Filter => handle_filter(step, state, deps).await,
        StepKind::Merge => handle_merge(step, state, deps).await,
        StepKind::Code => handle_code(step, state, deps).await,
        _ => handle_leaf(step, state, deps).await,
    }
}

async fn recurse_successors<'a>(step: &Step, state: &mut RunState<'a>, deps: Deps<'a>) -> Result<(), EngineError> {
    let targets: Vec<String> = state.graph.outgoing(&step.id).into_iter().map(|e| e.target_id.clone()).collect();
    for target in targets {
        dispatch_step(target, state, deps).await?;
    }
    Ok(())
}

async fn handle_leaf<'a>(step: &Step, state: &mut RunState<'a>, deps: Deps<'a>) -> Result<(), EngineError> {
    let inputs = build_inputs(step, state);
    let input_snapshot = Value::Object(inputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    deps.observer.on_step_start(step, &input_snapshot).await;

    let attempts = step.max_tries().max(1);
    let mut last_err: Option<EngineError> = None;
    let mut output = None;

    for attempt in 0..attempts {
        let ctx = DispatchContext::new(inputs.clone(), &state.outputs, deps.llm);
        match deps.dispatcher.dispatch(step, &ctx).await {
            Ok(value) => {
                output = Some(value);
                break;
            }
            Err(err) => {
                last_err = Some(err);
                if attempt + 1 < attempts {
                    tokio::time::sleep(std::time::Duration::from_millis(step.wait_between_tries_ms())).await;
                }
            }
        }
    }

    match output {
        Some(value) => {
            deps.observer.on_step_complete(step, &value).await;
            state.outputs.insert(step.id.clone(), value);
            recurse_successors(step, state, deps).await
        }
        None => {
            let err = last_err.expect("loop runs at least once");
            deps.observer.on_step_failed(step, &err).await;
            if step.continue_on_fail() {
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

async fn handle_condition<'a>(step: &Step, state: &mut RunState<'a>, deps: Deps<'a>) -> Result<(), EngineError> {
    let inputs = build_inputs(step, state);
    let input_snapshot = Value::Object(inputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    deps.observer.on_step_start(step, &input_snapshot).await;

    let condition_src = step.config.get("condition").and_then(|v| v.as_str()).unwrap_or("false").to_string();
    let scope = sandbox_scope(&inputs, &state.outputs);

    let result = match deps.sandbox.eval_bool(&condition_src, scope).await {
        Ok(v) => v,
        Err(err) => {
            deps.observer.on_step_failed(step, &err).await;
            return Err(err);
        }
    };

    let output = serde_json::json!({"condition": result, "result": result});
    deps.observer.on_step_complete(step, &output).await;
    state.outputs.insert(step.id.clone(), output);

    let label = if result { "true" } else { "false" };
    let targets: Vec<String> = state
        .graph
        .outgoing(&step.id)
        .into_iter()
        .filter(|e| e.label.as_deref() == Some(label))
        .map(|e| e.target_id.clone())
        .collect();

    for target in targets {
        dispatch_step(target, state, deps).await?;
    }
    Ok(())
}

async fn handle_switch<'a>(step: &Step, state: &mut RunState<'a>, deps: Deps<'a>) -> Result<(), EngineError> {
    let inputs = build_inputs(step, state);
    let input_snapshot = Value::Object(inputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    deps.observer.on_step_start(step, &input_snapshot).await;

    let expr_src = step.config.get("expression").and_then(|v| v.as_str()).unwrap_or("null").to_string();
    let scope = sandbox_scope(&inputs, &state.outputs);

    let value = match deps.sandbox.eval_expr(&expr_src, scope).await {
        Ok(v) => v,
        Err(err) => {
            deps.observer.on_step_failed(step, &err).await;
            return Err(err);
        }
    };

    let switch_value = stringify_switch_value(&value);
    let output = serde_json::json!({"switchValue": switch_value});
    deps.observer.on_step_complete(step, &output).await;
    state.outputs.insert(step.id.clone(), output);

    let edges = state.graph.outgoing(&step.id);
    let matched_target = edges
        .iter()
        .find(|e| e.label.as_deref() == Some(switch_value.as_str()))
        .or_else(|| edges.iter().find(|e| e.label.as_deref() == Some("default")))
        .map(|e| e.target_id.clone());

    match matched_target {
        Some(target) => dispatch_step(target, state, deps).await,
        None => {
            state
                .warnings
                .push(format!("BRANCH_UNRESOLVED: switch step {} matched no edge for value '{switch_value}'", step.id));
            Ok(())
        }
    }
}

async fn handle_loop<'a>(step: &Step, state: &mut RunState<'a>, deps: Deps<'a>) -> Result<(), EngineError> {
    let inputs = build_inputs(step, state);
    let input_snapshot = Value::Object(inputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    deps.observer.on_step_start(step, &input_snapshot).await;

    let input_path = step.config.get("input").and_then(|v| v.as_str()).unwrap_or("_all");
    let resolved = resolve_path(input_path, &inputs);

    let items = match resolved {
        Some(Value::Array(items)) => items,
        _ => {
            let err = EngineError::TypeError(format!("loop step {}: config.input did not resolve to an array", step.id));
            deps.observer.on_step_failed(step, &err).await;
            return Err(err);
        }
    };

    let targets: Vec<String> = state.graph.outgoing(&step.id).into_iter().map(|e| e.target_id.clone()).collect();
    let mut outer = Vec::with_capacity(items.len());

    for item in items {
        let mut overlay_outputs = state.outputs.clone();
        overlay_outputs.insert("currentItem".to_string(), item);

        let mut overlay_state = RunState {
            graph: state.graph,
            outputs: overlay_outputs,
            visited: HashSet::new(),
            call_path: Vec::new(),
            warnings: Vec::new(),
        };

        for target in &targets {
            dispatch_step(target.clone(), &mut overlay_state, deps).await?;
        }

        let inner: Vec<Value> = targets.iter().map(|t| overlay_state.outputs.get(t).cloned().unwrap_or(Value::Null)).collect();
        state.warnings.extend(overlay_state.warnings);
        outer.push(Value::Array(inner));
    }

    let output = Value::Array(outer);
    deps.observer.on_step_complete(step, &output).await;
    state.outputs.insert(step.id.clone(), output);
    Ok(())
}

async fn handle_filter<'a>(step: &Step, state: &mut RunState<'a>, deps: Deps<'a>) -> Result<(), EngineError> {
    let inputs = build_inputs(step, state);
    let input_snapshot = Value::Object(inputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    deps.observer.on_step_start(step, &input_snapshot).await;

    let input_path = step.config.get("input").and_then(|v| v.as_str()).unwrap_or("_all");
    let resolved = resolve_path(input_path, &inputs);

    let items = match resolved {
        Some(Value::Array(items)) => items,
        _ => {
            let err = EngineError::TypeError(format!("filter step {}: config.input did not resolve to an array", step.id));
            deps.observer.on_step_failed(step, &err).await;
            return Err(err);
        }
    };

    let predicate = step.config.get("predicate").and_then(|v| v.as_str()).unwrap_or("true").to_string();
    let mut kept = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let scope = sandbox_scope(&inputs, &state.outputs)
            .bind("item", item.clone())
            .bind("index", Value::from(index as u64))
            .bind("array", Value::Array(items.clone()));

        match deps.sandbox.eval_bool(&predicate, scope).await {
            Ok(true) => kept.push(item.clone()),
            Ok(false) => {}
            Err(err) => {
                deps.observer.on_step_failed(step, &err).await;
                return Err(err);
            }
        }
    }

    let output = Value::Array(kept);
    deps.observer.on_step_complete(step, &output).await;
    state.outputs.insert(step.id.clone(), output);
    recurse_successors(step, state, deps).await
}

/// `code` runs `config.code` in the sandbox with `inputs`/`context` bound,
/// same as a condition or switch expression, so it is handled here rather
/// than through `StepDispatcher` (which has no sandbox access).
async fn handle_code<'a>(step: &Step, state: &mut RunState<'a>, deps: Deps<'a>) -> Result<(), EngineError> {
    let inputs = build_inputs(step, state);
    let input_snapshot = Value::Object(inputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    deps.observer.on_step_start(step, &input_snapshot).await;

    let code = step.config.get("code").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let scope = sandbox_scope(&inputs, &state.outputs);

    let output = match deps.sandbox.eval_code(&code, scope).await {
        Ok(v) => v,
        Err(err) => {
            deps.observer.on_step_failed(step, &err).await;
            return Err(err);
        }
    };

    deps.observer.on_step_complete(step, &output).await;
    state.outputs.insert(step.id.clone(), output);
    recurse_successors(step, state, deps).await
}

/// `merge` is a fan-in point: it must not commit until every one of its
/// graph predecessors has produced an output, or an eager arrival (the
/// DFS-style traversal can reach merge through one predecessor long before
/// its siblings run) would commit a partial merge and permanently block
/// later predecessors via `visited` (§8 S4, §9 "fan-in"). An arrival that
/// finds a sibling still missing just returns without executing or marking
/// merge visited, so the predecessor that completes last is the one that
/// actually runs it.
async fn handle_merge<'a>(step: &Step, state: &mut RunState<'a>, deps: Deps<'a>) -> Result<(), EngineError> {
    let all_predecessors_ready = state.graph.predecessors(&step.id).into_iter().all(|pred_id| state.outputs.contains_key(pred_id));
    if !all_predecessors_ready {
        return Ok(());
    }

    let inputs = build_inputs(step, state);
    let input_snapshot = Value::Object(inputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    deps.observer.on_step_start(step, &input_snapshot).await;

    let paths: Vec<String> = step
        .config
        .get("inputs")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let mut result = Map::new();
    for path in &paths {
        let Some(value) = resolve_path(path, &inputs) else { continue };

        match path.rsplit_once('.') {
            Some((_, last_segment)) => {
                result.insert(last_segment.to_string(), value);
            }
            None => {
                if let Value::Object(map) = value {
                    for (k, v) in map {
                        result.insert(k, v);
                    }
                } else {
                    result.insert(path.clone(), value);
                }
            }
        }
    }

    let output = Value::Object(result);
    deps.observer.on_step_complete(step, &output).await;
    state.outputs.insert(step.id.clone(), output);
    state.visited.insert(step.id.clone());
    recurse_successors(step, state, deps).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use wfengine_model::edge::Edge;
    use wfengine_model::workflow::Workflow;

    use crate::llm::MockLlmProvider;
    use crate::runtime::RunHandle;

    fn step(workflow_id: &str, kind: StepKind, label: &str, config: Value) -> Step {
        let mut s = Step::new(workflow_id, kind, label);
        s.config = config.as_object().cloned().unwrap_or_default();
        s
    }

    async fn run_graph(graph: &WorkflowGraph, seeded: HashMap<String, Value>) -> FlowOutcome {
        let dispatcher = StepDispatcher::new();
        let llm = MockLlmProvider;
        let sandbox = SandboxedExpr::new(Duration::from_secs(2));
        let run_handle = RunHandle::new(None);
        let observer = NullObserver;
        let controller = FlowController::new();
        let start_ids: Vec<String> = graph.start_steps().into_iter().map(|s| s.id.clone()).collect();
        controller
            .run(graph, &dispatcher, &llm, &sandbox, &run_handle, &observer, seeded, &start_ids)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn condition_prunes_the_false_branch() {
        let wf = Workflow::new("cond");
        let trigger = step(&wf.id, StepKind::ManualTrigger, "start", serde_json::json!({}));
        let cond = step(&wf.id, StepKind::Condition, "check", serde_json::json!({"condition": "true"}));
        let on_true = step(&wf.id, StepKind::Code, "on-true", serde_json::json!({"code": "return 1;"}));
        let on_false = step(&wf.id, StepKind::Code, "on-false", serde_json::json!({"code": "return 2;"}));

        let edges = vec![
            Edge::new(&wf.id, &trigger.id, &cond.id),
            Edge::new(&wf.id, &cond.id, &on_true.id).with_label("true"),
            Edge::new(&wf.id, &cond.id, &on_false.id).with_label("false"),
        ];
        let graph = WorkflowGraph::new(wf, vec![trigger.clone(), cond, on_true.clone(), on_false.clone()], edges).unwrap();

        let mut seeded = HashMap::new();
        seeded.insert(trigger.id.clone(), Value::Null);

        let outcome = run_graph(&graph, seeded).await;
        assert_eq!(outcome.outputs.get(&on_true.id), Some(&Value::from(1)));
        assert!(!outcome.outputs.contains_key(&on_false.id));
    }

    #[tokio::test]
    async fn switch_falls_back_to_default_edge() {
        let wf = Workflow::new("switch");
        let trigger = step(&wf.id, StepKind::ManualTrigger, "start", serde_json::json!({}));
        let switch = step(&wf.id, StepKind::Switch, "route", serde_json::json!({"expression": "\"gamma\""}));
        let beta = step(&wf.id, StepKind::Code, "beta", serde_json::json!({"code": "return \"beta\";"}));
        let default_branch = step(&wf.id, StepKind::Code, "fallback", serde_json::json!({"code": "return \"fell-through\";"}));

        let edges = vec![
            Edge::new(&wf.id, &trigger.id, &switch.id),
            Edge::new(&wf.id, &switch.id, &beta.id).with_label("beta"),
            Edge::new(&wf.id, &switch.id, &default_branch.id).with_label("default"),
        ];
        let graph =
            WorkflowGraph::new(wf, vec![trigger.clone(), switch.clone(), beta, default_branch.clone()], edges).unwrap();

        let mut seeded = HashMap::new();
        seeded.insert(trigger.id.clone(), Value::Null);

        let outcome = run_graph(&graph, seeded).await;
        assert_eq!(
            outcome.outputs.get(&default_branch.id),
            Some(&Value::String("fell-through".to_string()))
        );
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn switch_with_no_matching_edge_records_a_warning() {
        let wf = Workflow::new("switch-unresolved");
        let trigger = step(&wf.id, StepKind::ManualTrigger, "start", serde_json::json!({}));
        let switch = step(&wf.id, StepKind::Switch, "route", serde_json::json!({"expression": "\"gamma\""}));
        let beta = step(&wf.id, StepKind::Code, "beta", serde_json::json!({"code": "return \"beta\";"}));

        let edges = vec![
            Edge::new(&wf.id, &trigger.id, &switch.id),
            Edge::new(&wf.id, &switch.id, &beta.id).with_label("beta"),
        ];
        let graph = WorkflowGraph::new(wf, vec![trigger.clone(), switch, beta], edges).unwrap();

        let mut seeded = HashMap::new();
        seeded.insert(trigger.id.clone(), Value::Null);

        let outcome = run_graph(&graph, seeded).await;
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("BRANCH_UNRESOLVED"));
    }

    #[tokio::test]
    async fn loop_isolates_current_item_per_iteration() {
        let wf = Workflow::new("loop");
        let trigger = step(&wf.id, StepKind::ManualTrigger, "start", serde_json::json!({"items": [1, 2, 3]}));
        let looper = step(&wf.id, StepKind::Loop, "for-each", serde_json::json!({"input": &trigger.id}));
        let double = step(
            &wf.id,
            StepKind::Code,
            "double",
            serde_json::json!({"code": "return inputs.currentItem * 2;"}),
        );

        let edges = vec![
            Edge::new(&wf.id, &trigger.id, &looper.id),
            Edge::new(&wf.id, &looper.id, &double.id),
        ];
        let graph = WorkflowGraph::new(wf, vec![trigger.clone(), looper.clone(), double.clone()], edges).unwrap();

        let mut seeded = HashMap::new();
        seeded.insert(trigger.id.clone(), serde_json::json!([1, 2, 3]));

        let outcome = run_graph(&graph, seeded).await;
        assert_eq!(
            outcome.outputs.get(&looper.id),
            Some(&serde_json::json!([[2], [4], [6]]))
        );
        assert!(!outcome.outputs.contains_key("currentItem"));
    }

    #[tokio::test]
    async fn filter_keeps_only_matching_items() {
        let wf = Workflow::new("filter");
        let trigger = step(&wf.id, StepKind::ManualTrigger, "start", serde_json::json!({}));
        let filter = step(
            &wf.id,
            StepKind::Filter,
            "evens",
            serde_json::json!({"input": &trigger.id, "predicate": "item % 2 == 0"}),
        );

        let edges = vec![Edge::new(&wf.id, &trigger.id, &filter.id)];
        let graph = WorkflowGraph::new(wf, vec![trigger.clone(), filter.clone()], edges).unwrap();

        let mut seeded = HashMap::new();
        seeded.insert(trigger.id.clone(), serde_json::json!([1, 2, 3, 4, 5, 6]));

        let outcome = run_graph(&graph, seeded).await;
        assert_eq!(outcome.outputs.get(&filter.id), Some(&serde_json::json!([2, 4, 6])));
    }

    #[tokio::test]
    async fn merge_combines_named_predecessor_outputs() {
        let wf = Workflow::new("merge");
        let trigger = step(&wf.id, StepKind::ManualTrigger, "start", serde_json::json!({}));
        let a = step(&wf.id, StepKind::Code, "a", serde_json::json!({"code": "return {x: 1};"}));
        let b = step(&wf.id, StepKind::Code, "b", serde_json::json!({"code": "return {y: 2};"}));
        let merge = step(
            &wf.id,
            StepKind::Merge,
            "combine",
            serde_json::json!({"inputs": [a.id.clone(), b.id.clone()]}),
        );

        let edges = vec![
            Edge::new(&wf.id, &trigger.id, &a.id),
            Edge::new(&wf.id, &trigger.id, &b.id),
            Edge::new(&wf.id, &a.id, &merge.id),
            Edge::new(&wf.id, &b.id, &merge.id),
        ];
        let graph = WorkflowGraph::new(wf, vec![trigger.clone(), a, b, merge.clone()], edges).unwrap();

        let mut seeded = HashMap::new();
        seeded.insert(trigger.id.clone(), Value::Null);

        let outcome = run_graph(&graph, seeded).await;
        let merged = outcome.outputs.get(&merge.id).unwrap();
        assert_eq!(merged.get("x"), Some(&Value::from(1)));
        assert_eq!(merged.get("y"), Some(&Value::from(2)));
    }

    #[tokio::test]
    async fn code_step_evaluates_and_continues_to_successors() {
        let wf = Workflow::new("code");
        let trigger = step(&wf.id, StepKind::ManualTrigger, "start", serde_json::json!({}));
        let code = step(&wf.id, StepKind::Code, "compute", serde_json::json!({"code": "let x = 2; return x + 3;"}));

        let edges = vec![Edge::new(&wf.id, &trigger.id, &code.id)];
        let graph = WorkflowGraph::new(wf, vec![trigger.clone(), code.clone()], edges).unwrap();

        let mut seeded = HashMap::new();
        seeded.insert(trigger.id.clone(), Value::Null);

        let outcome = run_graph(&graph, seeded).await;
        assert_eq!(outcome.outputs.get(&code.id), Some(&Value::from(5)));
    }
}
