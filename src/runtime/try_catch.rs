//! Error boundary (`try` / `catch`)
//!
//! ```yaml
//! - guarded:
//!     try:
//!       - charge: ...
//!     catch:
//!       as: failure
//!       do:
//!         - refund: ...
//! ```
//!
//! Both lists are isolated sub-graphs. The catch list sees the caught error
//! as `data.<as>` (default `error`). Cancellation and continue-as-new are
//! never caught.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::compiler::Compiler;
use super::context::ExecContext;
use super::registry::{wrong_variant, TaskBuilder};
use super::Executable;
use crate::ast::{Task, TaskDefinition, TryTask};
use crate::error::Result;
use crate::store::ExecutionState;
use crate::util::child_graph_name;

struct TryCatchTask {
    name: String,
    try_graph: Option<String>,
    catch_graph: Option<String>,
    error_var: String,
}

#[async_trait]
impl Executable for TryCatchTask {
    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &Value,
        state: &mut ExecutionState,
    ) -> Result<Option<Value>> {
        let Some(try_graph) = &self.try_graph else {
            return Ok(None);
        };

        let substrate = ctx.substrate();
        let err = match substrate
            .execute_sub_graph(ctx, try_graph, input.clone(), state.clone_scope())
            .await
        {
            Ok(result) => return Ok((!result.is_null()).then_some(result)),
            Err(err) if substrate.is_cancelled(&err) => {
                debug!(task = %self.name, "try body cancelled");
                return Ok(None);
            }
            Err(err) if err.is_continuation() => return Err(err),
            Err(err) => err,
        };

        let Some(catch_graph) = &self.catch_graph else {
            warn!(task = %self.name, error = %err, "error swallowed by empty catch");
            return Ok(None);
        };

        warn!(task = %self.name, error = %err, "try body failed, running catch");
        let mut scope = state.clone_scope();
        scope.set_data(self.error_var.as_str(), err.to_value());
        let result = substrate
            .execute_sub_graph(ctx, catch_graph, input.clone(), scope)
            .await?;
        Ok((!result.is_null()).then_some(result))
    }
}

pub struct TryBuilder {
    name: String,
    task: TryTask,
}

impl TryBuilder {
    pub fn boxed(name: &str, task: &Arc<Task>) -> Result<Box<dyn TaskBuilder>> {
        match &task.definition {
            TaskDefinition::Try(try_task) => Ok(Box::new(Self {
                name: name.to_string(),
                task: try_task.clone(),
            })),
            _ => Err(wrong_variant(name, "try", task)),
        }
    }
}

impl TaskBuilder for TryBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, compiler: &Compiler, parent: &str) -> Result<Arc<dyn Executable>> {
        let try_graph = if self.task.body.is_empty() {
            warn!(task = %self.name, "try has no tasks");
            None
        } else {
            let graph = child_graph_name("try", parent, &self.name, None);
            compiler.compile_sub_graph(&graph, &self.task.body)?;
            Some(graph)
        };

        let catch_graph = if self.task.catch.body.is_empty() {
            None
        } else {
            let graph = child_graph_name("catch", parent, &self.name, None);
            compiler.compile_sub_graph(&graph, &self.task.catch.body)?;
            Some(graph)
        };

        Ok(Arc::new(TryCatchTask {
            name: self.name.clone(),
            try_graph,
            catch_graph,
            error_var: self.task.catch.error_var().to_string(),
        }))
    }
}
