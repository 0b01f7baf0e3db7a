//! Raise a workflow error (`raise`)
//!
//! Raised errors are never retried; a `try` around the task can catch them.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::call::interpolate;
use super::compiler::Compiler;
use super::context::ExecContext;
use super::registry::{wrong_variant, TaskBuilder};
use super::Executable;
use crate::ast::{RaiseError, Task, TaskDefinition};
use crate::error::{BraidError, Result};
use crate::store::ExecutionState;

struct RaiseTask {
    name: String,
    error: RaiseError,
}

#[async_trait]
impl Executable for RaiseTask {
    async fn execute(
        &self,
        ctx: &ExecContext,
        _input: &Value,
        state: &mut ExecutionState,
    ) -> Result<Option<Value>> {
        let error = interpolate(ctx, &self.name, &self.error, state)?;
        warn!(task = %self.name, error_type = %error.error_type, status = error.status, "raising error");
        Err(BraidError::Raised {
            error_type: error.error_type,
            status: error.status,
            title: error.title,
            detail: error.detail,
        })
    }
}

pub struct RaiseBuilder {
    name: String,
    error: RaiseError,
}

impl RaiseBuilder {
    pub fn boxed(name: &str, task: &Arc<Task>) -> Result<Box<dyn TaskBuilder>> {
        match &task.definition {
            TaskDefinition::Raise(raise) => Ok(Box::new(Self {
                name: name.to_string(),
                error: raise.error.clone(),
            })),
            _ => Err(wrong_variant(name, "raise", task)),
        }
    }
}

impl TaskBuilder for RaiseBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, _compiler: &Compiler, _parent: &str) -> Result<Arc<dyn Executable>> {
        Ok(Arc::new(RaiseTask {
            name: self.name.clone(),
            error: self.error.clone(),
        }))
    }
}
