//! Runtime expression evaluation
//!
//! - `evaluate`: one string; non-expressions come back unchanged
//! - `traverse_and_evaluate`: every string leaf of a nested structure
//! - `check_if`: guard semantics (absent ⇒ true, non-boolean ⇒ error)

use std::sync::Arc;

use serde_json::Value;

use super::functions::build_jexl;
use super::wrapper::{EvaluationWrapper, PassThrough};
use crate::ast::value_kind;
use crate::error::{BraidError, Result};
use crate::store::ExecutionState;

thread_local! {
    // jexl_eval::Evaluator holds boxed transforms; one per thread avoids Sync bounds.
    static JEXL: jexl_eval::Evaluator<'static> = build_jexl();
}

/// `${ ... }` with surrounding whitespace allowed
pub fn is_runtime_expression(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.starts_with("${") && trimmed.ends_with('}')
}

/// Body of a runtime expression, delimiters removed
fn sanitize(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("${")
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(trimmed)
        .trim()
}

/// Evaluates runtime expressions against an [`ExecutionState`]
#[derive(Clone)]
pub struct Evaluator {
    wrapper: Arc<dyn EvaluationWrapper>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator").finish_non_exhaustive()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            wrapper: Arc::new(PassThrough),
        }
    }

    pub fn with_wrapper(wrapper: Arc<dyn EvaluationWrapper>) -> Self {
        Self { wrapper }
    }

    pub fn evaluate(&self, raw: &str, state: &ExecutionState) -> Result<Value> {
        self.evaluate_with(raw, state, &[])
    }

    /// Evaluate with task-local bindings layered over the state document
    pub fn evaluate_with(
        &self,
        raw: &str,
        state: &ExecutionState,
        locals: &[(&str, &Value)],
    ) -> Result<Value> {
        if !is_runtime_expression(raw) {
            return Ok(Value::String(raw.to_string()));
        }
        let document = state.expression_document(locals);
        self.evaluate_in(raw, &document)
    }

    /// Evaluate one expression against an already-built document
    pub fn evaluate_in(&self, raw: &str, document: &Value) -> Result<Value> {
        if !is_runtime_expression(raw) {
            return Ok(Value::String(raw.to_string()));
        }

        let body = sanitize(raw);
        if body.is_empty() {
            return Err(BraidError::ExpressionFailed {
                expression: raw.to_string(),
                reason: "expression produced no result".to_string(),
            });
        }

        self.wrapper.wrap(raw, &mut || {
            JEXL.with(|jexl| jexl.eval_in_context(body, document))
                .map(integral_numbers)
                .map_err(|e| BraidError::ExpressionFailed {
                    expression: raw.to_string(),
                    reason: e.to_string(),
                })
        })
    }

    /// Evaluate every string leaf; other leaves pass through
    pub fn traverse_and_evaluate(&self, node: Value, state: &ExecutionState) -> Result<Value> {
        self.traverse_with(node, state, &[])
    }

    pub fn traverse_with(
        &self,
        node: Value,
        state: &ExecutionState,
        locals: &[(&str, &Value)],
    ) -> Result<Value> {
        if !contains_expression(&node) {
            return Ok(node);
        }
        let document = state.expression_document(locals);
        self.traverse_in(node, &document)
    }

    fn traverse_in(&self, node: Value, document: &Value) -> Result<Value> {
        match node {
            Value::String(s) => self.evaluate_in(&s, document),
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.traverse_in(item, document))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key, self.traverse_in(value, document)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other),
        }
    }

    /// Guard evaluation
    ///
    /// Absent ⇒ true. Booleans are taken as-is; strings are true when they
    /// read "true" (any case) or "1". Any other result is a non-retryable error.
    pub fn check_if(&self, guard: Option<&str>, state: &ExecutionState) -> Result<bool> {
        self.check_if_with(guard, state, &[])
    }

    pub fn check_if_with(
        &self,
        guard: Option<&str>,
        state: &ExecutionState,
        locals: &[(&str, &Value)],
    ) -> Result<bool> {
        let Some(guard) = guard else {
            return Ok(true);
        };

        match self.evaluate_with(guard, state, locals)? {
            Value::Bool(b) => Ok(b),
            Value::String(s) => Ok(s.eq_ignore_ascii_case("true") || s == "1"),
            other => Err(BraidError::GuardNotBoolean {
                guard: guard.to_string(),
                found: value_kind(&other).to_string(),
            }),
        }
    }
}

/// JEXL computes in f64; whole results go back to integers (`1 + 1` is `2`, not `2.0`)
fn integral_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::from(f as i64),
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(integral_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, integral_numbers(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Skip building the document for structures with nothing to evaluate
fn contains_expression(node: &Value) -> bool {
    match node {
        Value::String(s) => is_runtime_expression(s),
        Value::Array(items) => items.iter().any(contains_expression),
        Value::Object(map) => map.values().any(contains_expression),
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════
