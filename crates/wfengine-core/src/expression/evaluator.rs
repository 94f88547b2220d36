//! Tree-walking evaluator over the sandbox AST, bounded by a reduction-step
//! counter so a pathological expression (e.g. a deeply nested ternary
//! built to blow the stack, or a body that would otherwise spin) fails
//! fast with `SANDBOX_ERROR` instead of the caller's `tokio::time::timeout`
//! being the only backstop.

use std::collections::HashMap;

use serde_json::Value;

use super::ast::{BinOp, Expr, Stmt, UnOp};
use crate::error::EngineError;

/// Reduction-step ceiling per evaluation call. Generous for any body the
/// step kinds in §4.3 produce; exists to bound pathological input, not to
/// constrain legitimate expressions.
const MAX_STEPS: u32 = 100_000;

pub struct Scope {
    vars: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Scope { vars: HashMap::new() }
    }

    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.vars.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

struct Evaluator {
    steps: u32,
}

pub fn eval_program(stmts: &[Stmt], scope: &Scope) -> Result<Value, EngineError> {
    let mut eval = Evaluator { steps: 0 };
    let mut locals: HashMap<String, Value> = HashMap::new();
    let mut last = Value::Null;

    for stmt in stmts {
        match stmt {
            Stmt::Let(name, expr) => {
                let v = eval.eval(expr, scope, &locals)?;
                locals.insert(name.clone(), v);
            }
            Stmt::Return(expr) => {
                return eval.eval(expr, scope, &locals);
            }
            Stmt::Expr(expr) => {
                last = eval.eval(expr, scope, &locals)?;
            }
        }
    }

    Ok(last)
}

impl Evaluator {
    fn tick(&mut self) -> Result<(), EngineError> {
        self.steps += 1;
        if self.steps > MAX_STEPS {
            return Err(EngineError::SandboxError("reduction step limit exceeded".into()));
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr, scope: &Scope, locals: &HashMap<String, Value>) -> Result<Value, EngineError> {
        self.tick()?;

        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Ident(name) => {
                if let Some(v) = locals.get(name) {
                    Ok(v.clone())
                } else if let Some(v) = scope.get(name) {
                    Ok(v.clone())
                } else {
                    Ok(Value::Null)
                }
            }
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, scope, locals)?);
                }
                Ok(Value::Array(out))
            }
            Expr::Object(fields) => {
                let mut map = serde_json::Map::new();
                for (key, value) in fields {
                    map.insert(key.clone(), self.eval(value, scope, locals)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Member(base, name) => {
                let base_val = self.eval(base, scope, locals)?;
                Ok(base_val.get(name).cloned().unwrap_or(Value::Null))
            }
            Expr::Index(base, index) => {
                let base_val = self.eval(base, scope, locals)?;
                let index_val = self.eval(index, scope, locals)?;
                Ok(index_value(&base_val, &index_val))
            }
            Expr::Unary(op, inner) => {
                let v = self.eval(inner, scope, locals)?;
                Ok(match op {
                    UnOp::Not => Value::Bool(!truthy(&v)),
                    UnOp::Neg => Value::from(-as_number(&v)?),
                })
            }
            Expr::Binary(left, op, right) => {
                // Short-circuit && / || before evaluating the right side.
                if *op == BinOp::And {
                    let l = self.eval(left, scope, locals)?;
                    if !truthy(&l) {
                        return Ok(Value::Bool(false));
                    }
                    let r = self.eval(right, scope, locals)?;
                    return Ok(Value::Bool(truthy(&r)));
                }
                if *op == BinOp::Or {
                    let l = self.eval(left, scope, locals)?;
                    if truthy(&l) {
                        return Ok(Value::Bool(true));
                    }
                    let r = self.eval(right, scope, locals)?;
                    return Ok(Value::Bool(truthy(&r)));
                }

                let l = self.eval(left, scope, locals)?;
                let r = self.eval(right, scope, locals)?;
                eval_binary(*op, &l, &r)
            }
            Expr::Ternary(cond, then_branch, else_branch) => {
                let c = self.eval(cond, scope, locals)?;
                if truthy(&c) {
                    self.eval(then_branch, scope, locals)
                } else {
                    self.eval(else_branch, scope, locals)
                }
            }
        }
    }
}

fn index_value(base: &Value, index: &Value) -> Value {
    match (base, index) {
        (Value::Array(items), Value::Number(n)) => {
            let i = n.as_f64().unwrap_or(-1.0) as i64;
            if i < 0 {
                Value::Null
            } else {
                items.get(i as usize).cloned().unwrap_or(Value::Null)
            }
        }
        (Value::Object(map), Value::String(key)) => map.get(key).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn as_number(v: &Value) -> Result<f64, EngineError> {
    v.as_f64().ok_or_else(|| EngineError::TypeError(format!("expected number, found {v}")))
}

fn eval_binary(op: BinOp, l: &Value, r: &Value) -> Result<Value, EngineError> {
    use BinOp::*;

    Ok(match op {
        Add => match (l, r) {
            (Value::String(a), _) => Value::String(format!("{a}{}", stringify(r))),
            (_, Value::String(b)) => Value::String(format!("{}{b}", stringify(l))),
            _ => Value::from(as_number(l)? + as_number(r)?),
        },
        Sub => Value::from(as_number(l)? - as_number(r)?),
        Mul => Value::from(as_number(l)? * as_number(r)?),
        Div => Value::from(as_number(l)? / as_number(r)?),
        Mod => Value::from(as_number(l)? % as_number(r)?),
        Eq => Value::Bool(values_equal(l, r)),
        NotEq => Value::Bool(!values_equal(l, r)),
        Lt => Value::Bool(as_number(l)? < as_number(r)?),
        Lte => Value::Bool(as_number(l)? <= as_number(r)?),
        Gt => Value::Bool(as_number(l)? > as_number(r)?),
        Gte => Value::Bool(as_number(l)? >= as_number(r)?),
        And | Or => unreachable!("short-circuited above"),
    })
}

fn values_equal(l: &Value, r: &Value) -> bool {
    l == r
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
