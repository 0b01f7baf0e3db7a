//! Iteration (`for`)
//!
//! ```yaml
//! - each_order:
//!     for:
//!       each: order
//!       in: ${ input.orders }
//!       at: position
//!     while: ${ data.position < 10 }
//!     do:
//!       - ship: ...
//! ```
//!
//! The body is an isolated sub-graph; each element runs against its own
//! cloned state holding the index and item bindings.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use super::compiler::Compiler;
use super::context::ExecContext;
use super::registry::{wrong_variant, TaskBuilder};
use super::Executable;
use crate::ast::{value_kind, ForSpec, ForTask, Task, TaskDefinition};
use crate::error::{BraidError, Result};
use crate::store::ExecutionState;
use crate::util::child_graph_name;

/// Source collection after evaluation
#[derive(Debug)]
enum Source {
    Object(Map<String, Value>),
    List(Vec<Value>),
}

impl Source {
    fn from_value(task: &str, value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::Object(map)),
            Value::Array(items) => Ok(Self::List(items)),
            Value::Number(n) => {
                let count = n
                    .as_u64()
                    .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64));
                match count {
                    Some(count) => Ok(Self::List((0..count).map(Value::from).collect())),
                    None => Err(BraidError::NotIterable {
                        task: task.to_string(),
                        found: format!("number {}", n),
                    }),
                }
            }
            other => Err(BraidError::NotIterable {
                task: task.to_string(),
                found: value_kind(&other).to_string(),
            }),
        }
    }
}

struct IterateTask {
    name: String,
    spec: ForSpec,
    while_guard: Option<String>,
    body: String,
}

impl IterateTask {
    /// Run one element; `None` when the `while` predicate stops the loop
    async fn iteration(
        &self,
        ctx: &ExecContext,
        state: &ExecutionState,
        key: Value,
        item: Value,
    ) -> Result<Option<Value>> {
        let mut scope = state.clone_scope();
        scope.set_data(self.spec.index_var(), key);
        scope.set_data(self.spec.item_var(), item);

        if let Some(guard) = &self.while_guard {
            match ctx.evaluator().evaluate(guard, &scope)? {
                Value::Bool(true) => {}
                Value::Bool(false) => return Ok(None),
                other => {
                    warn!(task = %self.name, found = value_kind(&other), "while did not yield a boolean, stopping");
                    return Ok(None);
                }
            }
        }

        let input = scope.input.clone();
        ctx.substrate()
            .execute_sub_graph(ctx, &self.body, input, scope)
            .await
            .map(Some)
    }
}

#[async_trait]
impl Executable for IterateTask {
    #[instrument(name = "for", skip_all, fields(task = %self.name))]
    async fn execute(
        &self,
        ctx: &ExecContext,
        _input: &Value,
        state: &mut ExecutionState,
    ) -> Result<Option<Value>> {
        let evaluated = ctx
            .evaluator()
            .traverse_and_evaluate(self.spec.source.clone(), state)?;

        match Source::from_value(&self.name, evaluated)? {
            Source::Object(entries) => {
                debug!(count = entries.len(), "iterating object");
                let mut output = Map::with_capacity(entries.len());
                for (key, item) in entries {
                    match self.iteration(ctx, state, Value::String(key.clone()), item).await? {
                        Some(result) => output.insert(key, result),
                        None => break,
                    };
                }
                Ok(Some(Value::Object(output)))
            }
            Source::List(items) => {
                debug!(count = items.len(), "iterating list");
                let mut output = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    match self.iteration(ctx, state, Value::from(index), item).await? {
                        Some(result) => output.push(result),
                        None => break,
                    }
                }
                Ok(Some(Value::Array(output)))
            }
        }
    }
}

pub struct ForBuilder {
    name: String,
    task: ForTask,
}

impl ForBuilder {
    pub fn boxed(name: &str, task: &Arc<Task>) -> Result<Box<dyn TaskBuilder>> {
        match &task.definition {
            TaskDefinition::For(for_task) => Ok(Box::new(Self {
                name: name.to_string(),
                task: for_task.clone(),
            })),
            _ => Err(wrong_variant(name, "for", task)),
        }
    }
}

impl TaskBuilder for ForBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, compiler: &Compiler, parent: &str) -> Result<Arc<dyn Executable>> {
        let body = child_graph_name("for", parent, &self.name, None);
        compiler.compile_sub_graph(&body, &self.task.body)?;
        Ok(Arc::new(IterateTask {
            name: self.name.clone(),
            spec: self.task.iteration.clone(),
            while_guard: self.task.while_guard.clone(),
            body,
        }))
    }
}
