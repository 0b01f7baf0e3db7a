//! Durable sleep (`wait`)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::call::invalid;
use super::compiler::Compiler;
use super::context::ExecContext;
use super::registry::{wrong_variant, TaskBuilder};
use super::Executable;
use crate::ast::{Task, TaskDefinition};
use crate::error::Result;
use crate::store::ExecutionState;

struct WaitTask {
    name: String,
    duration: Duration,
}

#[async_trait]
impl Executable for WaitTask {
    async fn execute(
        &self,
        ctx: &ExecContext,
        _input: &Value,
        _state: &mut ExecutionState,
    ) -> Result<Option<Value>> {
        debug!(task = %self.name, duration_ms = self.duration.as_millis() as u64, "waiting");
        ctx.substrate().sleep(ctx, self.duration).await?;
        Ok(None)
    }
}

pub struct WaitBuilder {
    name: String,
    task: Arc<Task>,
}

impl WaitBuilder {
    pub fn boxed(name: &str, task: &Arc<Task>) -> Result<Box<dyn TaskBuilder>> {
        match &task.definition {
            TaskDefinition::Wait(_) => Ok(Box::new(Self {
                name: name.to_string(),
                task: Arc::clone(task),
            })),
            _ => Err(wrong_variant(name, "wait", task)),
        }
    }
}

impl TaskBuilder for WaitBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, _compiler: &Compiler, _parent: &str) -> Result<Arc<dyn Executable>> {
        let TaskDefinition::Wait(spec) = &self.task.definition else {
            return Err(wrong_variant(&self.name, "wait", &self.task));
        };
        let duration = spec
            .to_duration()
            .map_err(|e| invalid(&self.name, e.to_string()))?;
        Ok(Arc::new(WaitTask {
            name: self.name.clone(),
            duration,
        }))
    }
}
