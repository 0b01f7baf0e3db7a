//! Sequence - ordered execution of a task list (`do`)
//!
//! Per child, in order:
//! 1. checkpoint (entry-point sequences only, never before the first child)
//! 2. skip while a resumed run has not reached its marker; never-skip children
//!    replay instead, leaving the carried state untouched
//! 3. skip towards a pending `then` target
//! 4. guard (`if`)
//! 5. input validation, metadata
//! 6. execute; record the result under the child's name; export
//! 7. follow the flow directive

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::compiler::{CompileOptions, Compiler};
use super::context::ExecContext;
use super::registry::{wrong_variant, TaskBuilder};
use super::continuation::ResumeStep;
use super::{continuation, metadata, Executable};
use crate::ast::{FlowDirective, Task, TaskDefinition, TaskList};
use crate::error::{BraidError, Result};
use crate::store::ExecutionState;
use crate::util::child_id;

/// Whether a sequence may continue as new
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpointing {
    /// Entry point of a run: the restart target
    Enabled,
    /// Inline nested list
    Disabled,
}

pub struct SequenceChild {
    name: String,
    task: Arc<Task>,
    executable: Arc<dyn Executable>,
    never_skip: bool,
}

impl SequenceChild {
    pub fn new(
        name: String,
        task: Arc<Task>,
        executable: Arc<dyn Executable>,
        never_skip: bool,
    ) -> Self {
        Self {
            name,
            task,
            executable,
            never_skip,
        }
    }
}

pub struct Sequence {
    name: String,
    children: Vec<SequenceChild>,
    options: Arc<CompileOptions>,
}

impl Sequence {
    pub fn new(name: &str, children: Vec<SequenceChild>, options: Arc<CompileOptions>) -> Self {
        Self {
            name: name.to_string(),
            children,
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    #[instrument(name = "sequence", skip_all, fields(graph = %self.name))]
    pub async fn run(
        &self,
        ctx: &ExecContext,
        input: &Value,
        state: &mut ExecutionState,
        checkpointing: Checkpointing,
    ) -> Result<()> {
        let mut pending_target: Option<&str> = None;

        for (ordinal, child) in self.children.iter().enumerate() {
            let id = child_id(&child.name, ordinal);

            // A run still skipping towards its marker never checkpoints again,
            // and a restart at the first child would make no progress.
            if checkpointing == Checkpointing::Enabled
                && ordinal > 0
                && !state.is_resuming()
                && continuation::is_due(ctx, self.options.max_history_length)
            {
                return Err(continuation::suspend(ctx, &self.name, &id, input, state).await);
            }

            let owns_marker = checkpointing == Checkpointing::Enabled;
            let replay = match continuation::resume_step(&id, child.never_skip, owns_marker, state) {
                ResumeStep::Skip => continue,
                ResumeStep::Replay => true,
                ResumeStep::Run => false,
            };

            if let Some(target) = pending_target {
                if child.name != target {
                    debug!(task = %child.name, target, "skipping towards flow target");
                    continue;
                }
                pending_target = None;
            }

            let task_binding = json!({ "name": child.name });
            let guard = child.task.base.guard.as_deref();
            if !ctx
                .evaluator()
                .check_if_with(guard, state, &[("task", &task_binding)])?
            {
                debug!(task = %child.name, "guard is false, skipping");
                continue;
            }

            if replay {
                // Completed before the restart: its result, export and
                // metadata are already part of the carried state
                debug!(task = %child.name, id = %id, "replaying task");
                match child.executable.execute(ctx, input, state).await {
                    Ok(_) => {}
                    Err(err) if ctx.substrate().is_cancelled(&err) && ctx.is_cancelled() => {
                        return Ok(());
                    }
                    Err(err) if ctx.substrate().is_cancelled(&err) => {}
                    Err(err) => return Err(err),
                }
                continue;
            }

            if self.options.validate_input {
                if let Some(schema) = child.task.base.input.as_ref().and_then(|i| i.schema.as_ref()) {
                    self.options
                        .validator
                        .validate(&child.name, &state.input, schema)?;
                }
            }

            metadata::apply(ctx, &child.name, &child.task, state)?;

            debug!(task = %child.name, id = %id, "running task");
            let result = match child.executable.execute(ctx, input, state).await {
                Ok(result) => result,
                Err(err) if ctx.substrate().is_cancelled(&err) => {
                    if ctx.is_cancelled() {
                        debug!(task = %child.name, "scope cancelled, stopping sequence");
                        return Ok(());
                    }
                    debug!(task = %child.name, "task cancelled, continuing");
                    None
                }
                Err(err) => return Err(err),
            };

            if let Some(value) = &result {
                state.set_data(child.name.as_str(), value.clone());
            }

            if let Some(export) = &child.task.base.export {
                let result_binding = result.clone().unwrap_or(Value::Null);
                let exported = ctx.evaluator().traverse_with(
                    export.value.clone(),
                    state,
                    &[("task", &task_binding), ("result", &result_binding)],
                )?;
                state.set_output(exported);
            }

            match &child.task.base.then {
                Some(FlowDirective::Terminate) => {
                    debug!(task = %child.name, "flow directive ends sequence");
                    return Ok(());
                }
                Some(FlowDirective::Target(target)) => pending_target = Some(target.as_str()),
                Some(FlowDirective::Continue) | None => {}
            }
        }

        match pending_target {
            Some(target) => Err(BraidError::FlowTargetNotFound {
                target: target.to_string(),
            }),
            None => Ok(()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// Nested `do`
// ═══════════════════════════════════════════════════════════════

/// A nested list running inline, sharing the parent's state
struct InlineSequence {
    sequence: Arc<Sequence>,
}

#[async_trait]
impl Executable for InlineSequence {
    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &Value,
        state: &mut ExecutionState,
    ) -> Result<Option<Value>> {
        self.sequence
            .run(ctx, input, state, Checkpointing::Disabled)
            .await?;
        Ok(state.output.clone())
    }
}

pub struct DoBuilder {
    name: String,
    tasks: TaskList,
}

impl DoBuilder {
    pub fn boxed(name: &str, task: &Arc<Task>) -> Result<Box<dyn TaskBuilder>> {
        match &task.definition {
            TaskDefinition::Do(tasks) => Ok(Box::new(Self {
                name: name.to_string(),
                tasks: tasks.clone(),
            })),
            _ => Err(wrong_variant(name, "do", task)),
        }
    }
}

impl TaskBuilder for DoBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    /// Nested lists run while a resumed parent is skipping, so listeners inside
    /// them are registered again
    fn never_skip_on_resume(&self) -> bool {
        true
    }

    fn build(&self, compiler: &Compiler, _parent: &str) -> Result<Arc<dyn Executable>> {
        // Also addressable as a sub-graph (switch targets, `run.workflow`)
        let sequence = compiler.compile_sub_graph(&self.name, &self.tasks)?;
        Ok(Arc::new(InlineSequence { sequence }))
    }
}
