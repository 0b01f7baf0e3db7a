//! Assign values (`set`)
//!
//! The interpolated map is merged key by key into `data` and also returned,
//! so it is recorded under the task's own name.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::compiler::Compiler;
use super::context::ExecContext;
use super::registry::{wrong_variant, TaskBuilder};
use super::Executable;
use crate::ast::{Task, TaskDefinition};
use crate::error::Result;
use crate::store::ExecutionState;

struct SetTask {
    values: Value,
}

#[async_trait]
impl Executable for SetTask {
    async fn execute(
        &self,
        ctx: &ExecContext,
        _input: &Value,
        state: &mut ExecutionState,
    ) -> Result<Option<Value>> {
        let values = ctx
            .evaluator()
            .traverse_and_evaluate(self.values.clone(), state)?;
        state.merge_data(&values);
        Ok(Some(values))
    }
}

pub struct SetBuilder {
    name: String,
    values: Value,
}

impl SetBuilder {
    pub fn boxed(name: &str, task: &Arc<Task>) -> Result<Box<dyn TaskBuilder>> {
        match &task.definition {
            TaskDefinition::Set(values) => Ok(Box::new(Self {
                name: name.to_string(),
                values: values.clone(),
            })),
            _ => Err(wrong_variant(name, "set", task)),
        }
    }
}

impl TaskBuilder for SetBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, _compiler: &Compiler, _parent: &str) -> Result<Arc<dyn Executable>> {
        Ok(Arc::new(SetTask {
            values: self.values.clone(),
        }))
    }
}
