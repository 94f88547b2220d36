//! The sandboxed expression/code evaluator (§4.4 SandboxedExpr). No ambient
//! I/O is reachable from the grammar — it has no function-call syntax at
//! all, so there is nothing to import or invoke. Evaluation runs on the
//! blocking pool and is raced against a timeout; the evaluator itself also
//! bounds its own reduction steps (`evaluator::MAX_STEPS`) so a
//! pathological body fails with `SANDBOX_ERROR` even if it never yields
//! back to the runtime for the timeout to observe.

use std::time::Duration;

use serde_json::Value;

use super::evaluator::{self, Scope};
use super::lexer::tokenize;
use super::parser::{parse_expr_only, parse_program};
use crate::error::EngineError;

#[derive(Clone, Copy)]
pub struct SandboxedExpr {
    timeout: Duration,
}

impl SandboxedExpr {
    pub fn new(timeout: Duration) -> Self {
        SandboxedExpr { timeout }
    }

    /// Evaluate `src` as a single expression and coerce the result to a
    /// bool via JS-like truthiness. Used by `condition`, `switch`'s
    /// per-case predicates, and `filter`/`loop` predicates.
    pub async fn eval_bool(&self, src: &str, scope: Scope) -> Result<bool, EngineError> {
        let value = self.eval_expr(src, scope).await?;
        Ok(evaluator::truthy(&value))
    }

    /// Evaluate `src` as a single expression and return its value. Used for
    /// `merge` path-free literal config and anywhere a bare value is
    /// wanted rather than a bool.
    pub async fn eval_expr(&self, src: &str, scope: Scope) -> Result<Value, EngineError> {
        let src = src.to_string();
        self.run(move || {
            let tokens = tokenize(&src)?;
            let expr = parse_expr_only(&tokens)?;
            evaluator::eval_program(&[super::ast::Stmt::Expr(expr)], &scope)
        })
        .await
    }

    /// Evaluate `src` as a full statement sequence (`let` bindings, an
    /// optional `return`, falling back to the last bare expression). Used
    /// by the `code` step kind.
    pub async fn eval_code(&self, src: &str, scope: Scope) -> Result<Value, EngineError> {
        let src = src.to_string();
        self.run(move || {
            let tokens = tokenize(&src)?;
            let stmts = parse_program(&tokens)?;
            evaluator::eval_program(&stmts, &scope)
        })
        .await
    }

    async fn run<F>(&self, f: F) -> Result<Value, EngineError>
    where
        F: FnOnce() -> Result<Value, EngineError> + Send + 'static,
    {
        let join = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(self.timeout, join).await {
            Ok(Ok(result)) => result,
            Ok(Err(_join_err)) => Err(EngineError::SandboxError("evaluator task panicked".into())),
            Err(_elapsed) => Err(EngineError::SandboxTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expr() -> SandboxedExpr {
        SandboxedExpr::new(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn evaluates_comparison() {
        let scope = Scope::new().bind("inputs", json!({"score": 42}));
        let result = expr().eval_bool("inputs.score > 10", scope).await.unwrap();
        assert!(result);
    }

    #[tokio::test]
    async fn evaluates_ternary_and_logical() {
        let scope = Scope::new().bind("inputs", json!({"a": true, "b": false}));
        let result = expr()
            .eval_expr("inputs.a && !inputs.b ? \"yes\" : \"no\"", scope)
            .await
            .unwrap();
        assert_eq!(result, json!("yes"));
    }

    #[tokio::test]
    async fn code_supports_let_and_return() {
        let scope = Scope::new().bind("inputs", json!({"n": 3}));
        let result = expr()
            .eval_code("let doubled = inputs.n * 2; return { value: doubled };", scope)
            .await
            .unwrap();
        assert_eq!(result, json!({"value": 6}));
    }

    #[tokio::test]
    async fn code_without_return_uses_last_expression() {
        let scope = Scope::new().bind("item", json!(5));
        let result = expr().eval_code("item * 2", scope).await.unwrap();
        assert_eq!(result, json!(10));
    }

    #[tokio::test]
    async fn malformed_source_is_sandbox_error() {
        let scope = Scope::new();
        let err = expr().eval_bool("inputs.a ===", scope).await.unwrap_err();
        assert_eq!(err.kind(), "SANDBOX_ERROR");
    }

    #[tokio::test]
    async fn array_index_and_object_literal() {
        let scope = Scope::new().bind("inputs", json!({"items": [1, 2, 3]}));
        let result = expr().eval_code("return { items: inputs.items };", scope).await.unwrap();
        assert_eq!(result, json!({"items": [1, 2, 3]}));
    }
}
