//! ExecutionState - the mutable document threaded through a task graph
//!
//! One state per graph scope:
//! - `input`: value handed to the scope on entry
//! - `data`: task name → last result
//! - `env`: process environment snapshot, shared read-only across clones
//! - `output`: last exported value
//! - `resume_marker`: child identifier a restarted run must reach before executing
//!
//! Isolated sub-graphs never share a state; they get [`ExecutionState::clone_scope`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Arc so every clone shares one copy; tasks only read it
    #[serde(default)]
    pub env: Arc<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_marker: Option<String>,
}

impl ExecutionState {
    pub fn new(input: Value, env: Arc<Map<String, Value>>) -> Self {
        Self {
            input,
            env,
            ..Default::default()
        }
    }

    /// Copy for an isolated sub-graph.
    ///
    /// `data` is deep-copied so the child cannot write into this scope,
    /// `env` is shared, `output` is cleared and the resume marker stays behind.
    pub fn clone_scope(&self) -> Self {
        Self {
            input: self.input.clone(),
            data: self.data.clone(),
            env: Arc::clone(&self.env),
            output: None,
            resume_marker: None,
        }
    }

    /// Same as [`clone_scope`](Self::clone_scope) with a new scoped input
    pub fn clone_scope_with_input(&self, input: Value) -> Self {
        Self {
            input,
            ..self.clone_scope()
        }
    }

    /// Record a task result (overwrites a previous result of the same name)
    pub fn set_data(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Merge every key of an object into `data`; non-objects are ignored
    pub fn merge_data(&mut self, value: &Value) -> bool {
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    self.data.insert(k.clone(), v.clone());
                }
                true
            }
            _ => false,
        }
    }

    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set_output(&mut self, value: Value) {
        self.output = Some(value);
    }

    pub fn clear_output(&mut self) {
        self.output = None;
    }

    /// Exported value, or null when nothing was exported in this scope
    pub fn output_or_null(&self) -> Value {
        self.output.clone().unwrap_or(Value::Null)
    }

    pub fn is_resuming(&self) -> bool {
        self.resume_marker.is_some()
    }

    /// Document expressions are evaluated against
    ///
    /// `locals` are task-local bindings layered on top (`task`, `result`, ...).
    pub fn expression_document(&self, locals: &[(&str, &Value)]) -> Value {
        let mut doc = Map::with_capacity(4 + locals.len());
        doc.insert("input".into(), self.input.clone());
        doc.insert("data".into(), Value::Object(self.data.clone()));
        doc.insert("env".into(), Value::Object((*self.env).clone()));
        doc.insert("output".into(), self.output_or_null());
        for (key, value) in locals {
            doc.insert((*key).to_string(), (*value).clone());
        }
        Value::Object(doc)
    }
}

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════
