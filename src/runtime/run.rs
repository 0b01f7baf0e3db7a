//! Processes and sub-workflows (`run: shell | script | container | workflow`)
//!
//! Shell, script and container runs are calls like any other: the substrate
//! executes them and returns trimmed stdout. `run.workflow` invokes a
//! registered sub-graph, detached when `await: false`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::call::{interpolate, invalid, task_timeout};
use super::compiler::Compiler;
use super::context::ExecContext;
use super::registry::{wrong_variant, TaskBuilder};
use super::{metadata, Executable};
use crate::ast::{RunProcess, RunTask, Task, TaskDefinition};
use crate::binding::is_runtime_expression;
use crate::error::Result;
use crate::store::ExecutionState;
use crate::substrate::{CallKind, CallRequest};

struct RunExecutable {
    name: String,
    task: Arc<Task>,
    run: RunTask,
    timeout: Option<Duration>,
}

impl RunExecutable {
    async fn run_workflow(
        &self,
        ctx: &ExecContext,
        input: &Value,
        state: &ExecutionState,
        process: &RunProcess,
    ) -> Result<Option<Value>> {
        let RunProcess::Workflow(workflow) = interpolate(ctx, &self.name, process, state)? else {
            return Ok(None);
        };
        let child_input = workflow.input.unwrap_or_else(|| input.clone());
        let scope = state.clone_scope_with_input(child_input.clone());
        let substrate = ctx.substrate();

        if !self.run.await_completion {
            info!(task = %self.name, workflow = %workflow.name, "starting detached sub-graph");
            substrate
                .start_sub_graph(ctx, &workflow.name, child_input, scope)
                .await?;
            return Ok(None);
        }

        let result = substrate
            .execute_sub_graph(ctx, &workflow.name, child_input, scope)
            .await?;
        Ok(Some(result))
    }
}

#[async_trait]
impl Executable for RunExecutable {
    #[instrument(name = "run", skip_all, fields(task = %self.name, kind = self.run.process.kind()))]
    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &Value,
        state: &mut ExecutionState,
    ) -> Result<Option<Value>> {
        let kind = match &self.run.process {
            process @ RunProcess::Workflow(_) => {
                return self.run_workflow(ctx, input, state, process).await;
            }
            RunProcess::Shell(shell) => CallKind::Shell(interpolate(ctx, &self.name, shell, state)?),
            RunProcess::Script(script) => {
                CallKind::Script(interpolate(ctx, &self.name, script, state)?)
            }
            RunProcess::Container(container) => {
                CallKind::Container(interpolate(ctx, &self.name, container, state)?)
            }
        };

        debug!(call = %kind.identifier(), "running process");
        let _heartbeat = metadata::start_heartbeat(ctx, &self.name, &self.task);
        let output = ctx
            .substrate()
            .execute_call(
                ctx,
                CallRequest {
                    task: self.name.clone(),
                    kind,
                    timeout: self.timeout,
                },
            )
            .await?;
        Ok(Some(output))
    }
}

pub struct RunBuilder {
    name: String,
    task: Arc<Task>,
    run: RunTask,
}

impl RunBuilder {
    pub fn boxed(name: &str, task: &Arc<Task>) -> Result<Box<dyn TaskBuilder>> {
        match &task.definition {
            TaskDefinition::Run(run) => Ok(Box::new(Self {
                name: name.to_string(),
                task: Arc::clone(task),
                run: run.clone(),
            })),
            _ => Err(wrong_variant(name, "run", task)),
        }
    }
}

impl TaskBuilder for RunBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, compiler: &Compiler, _parent: &str) -> Result<Arc<dyn Executable>> {
        match &self.run.process {
            RunProcess::Workflow(workflow) => {
                if workflow.name.is_empty() {
                    return Err(invalid(&self.name, "run.workflow needs a name"));
                }
                if !is_runtime_expression(&workflow.name) {
                    compiler.require_sub_graph(&self.name, &workflow.name);
                }
            }
            process if !self.run.await_completion => {
                return Err(invalid(
                    &self.name,
                    format!("run.{} must be awaited", process.kind()),
                ));
            }
            RunProcess::Shell(shell) if shell.command.trim().is_empty() => {
                return Err(invalid(&self.name, "run.shell needs a command"));
            }
            RunProcess::Script(script) if script.code.trim().is_empty() => {
                return Err(invalid(&self.name, "run.script needs code"));
            }
            RunProcess::Container(container) if container.image.trim().is_empty() => {
                return Err(invalid(&self.name, "run.container needs an image"));
            }
            _ => {}
        }

        Ok(Arc::new(RunExecutable {
            name: self.name.clone(),
            task: Arc::clone(&self.task),
            run: self.run.clone(),
            timeout: task_timeout(&self.name, &self.task)?,
        }))
    }
}
