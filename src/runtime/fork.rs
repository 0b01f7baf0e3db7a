//! Fork-join (`fork`)
//!
//! Every branch is an isolated sub-graph started against its own clone of one
//! pre-fork snapshot. Nothing a branch writes is visible to the parent until
//! the join.
//!
//! - competing: the first successful branch wins; the rest are cancelled
//! - non-competing: every branch must succeed; results are merged in
//!   declaration order

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use super::compiler::Compiler;
use super::context::ExecContext;
use super::registry::{wrong_variant, TaskBuilder};
use super::Executable;
use crate::ast::{ForkSpec, Task, TaskDefinition, TaskList};
use crate::error::{BraidError, Result};
use crate::store::ExecutionState;
use crate::util::child_graph_name;

/// Whether a join is finished, given what the branches reported so far
///
/// - `failed`: the join itself has failed (always finishes it)
/// - competing: finished once a winner exists, or every branch replied without one
/// - non-competing: finished once every branch replied
pub fn join_complete(replied: &[bool], has_winner: bool, failed: bool, competing: bool) -> bool {
    if failed {
        return true;
    }
    let all_replied = replied.iter().all(|r| *r);
    if competing {
        has_winner || all_replied
    } else {
        all_replied
    }
}

struct Branch {
    key: String,
    graph: String,
}

struct ForkTask {
    name: String,
    compete: bool,
    branches: Vec<Branch>,
}

#[async_trait]
impl Executable for ForkTask {
    #[instrument(name = "fork", skip_all, fields(task = %self.name, compete = self.compete))]
    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &Value,
        state: &mut ExecutionState,
    ) -> Result<Option<Value>> {
        let snapshot = state.clone_scope();
        let substrate = ctx.substrate();

        let contexts: Vec<ExecContext> = self.branches.iter().map(|_| ctx.child()).collect();
        let mut pending: FuturesUnordered<_> = self
            .branches
            .iter()
            .zip(contexts.iter())
            .enumerate()
            .map(|(index, (branch, branch_ctx))| {
                let branch_state = snapshot.clone();
                let branch_input = input.clone();
                async move {
                    debug!(branch = %branch.key, graph = %branch.graph, "starting branch");
                    let outcome = substrate
                        .execute_sub_graph(branch_ctx, &branch.graph, branch_input, branch_state)
                        .await;
                    (index, outcome)
                }
            })
            .collect();

        let mut replied = vec![false; self.branches.len()];
        let mut results: Vec<Option<Value>> = vec![None; self.branches.len()];
        let mut winner: Option<usize> = None;
        let mut first_error: Option<BraidError> = None;
        let mut settled = false;

        while let Some((index, outcome)) = pending.next().await {
            replied[index] = true;
            let key = &self.branches[index].key;

            match outcome {
                Ok(value) if !settled => {
                    if self.compete {
                        debug!(branch = %key, "winner declared");
                        winner = Some(index);
                    }
                    results[index] = Some(value);
                }
                Ok(_) => debug!(branch = %key, "ignoring result after join settled"),
                Err(err) if substrate.is_cancelled(&err) => {
                    debug!(branch = %key, "branch cancelled");
                }
                Err(err) => {
                    warn!(branch = %key, error = %err, "branch failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }

            let failed = !self.compete && first_error.is_some();
            if !settled && join_complete(&replied, winner.is_some(), failed, self.compete) {
                settled = true;
                // Losers and survivors of a failed join stop at their next await point;
                // the loop keeps draining so none is left running.
                for (i, branch_ctx) in contexts.iter().enumerate() {
                    if !replied[i] {
                        branch_ctx.cancel();
                    }
                }
            }
        }

        if self.compete {
            if let Some(index) = winner {
                let value = results[index].take().unwrap_or(Value::Null);
                state.merge_data(&value);
                return Ok((!value.is_null()).then_some(value));
            }
        } else if first_error.is_none() {
            let mut output = Map::new();
            for (branch, result) in self.branches.iter().zip(results) {
                let Some(value) = result else { continue };
                state.merge_data(&value);
                if !value.is_null() {
                    output.insert(branch.key.clone(), value);
                }
            }
            return Ok(Some(Value::Object(output)));
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        // Every branch was cancelled
        ctx.ensure_active(&self.name)?;
        Ok(None)
    }
}

pub struct ForkBuilder {
    name: String,
    spec: ForkSpec,
}

impl ForkBuilder {
    pub fn boxed(name: &str, task: &Arc<Task>) -> Result<Box<dyn TaskBuilder>> {
        match &task.definition {
            TaskDefinition::Fork(spec) if spec.branches.is_empty() => Err(BraidError::InvalidTask {
                task: name.to_string(),
                reason: "fork declares no branches".to_string(),
            }),
            TaskDefinition::Fork(spec) => Ok(Box::new(Self {
                name: name.to_string(),
                spec: spec.clone(),
            })),
            _ => Err(wrong_variant(name, "fork", task)),
        }
    }
}

impl TaskBuilder for ForkBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, compiler: &Compiler, parent: &str) -> Result<Arc<dyn Executable>> {
        let mut branches = Vec::with_capacity(self.spec.branches.len());
        for item in self.spec.branches.iter() {
            let graph = child_graph_name("fork", parent, &self.name, Some(&item.name));
            match &item.task.definition {
                TaskDefinition::Do(tasks) => compiler.compile_sub_graph(&graph, tasks)?,
                // A single task becomes a one-task sequence
                _ => compiler.compile_sub_graph(&graph, &TaskList(vec![item.clone()]))?,
            };
            branches.push(Branch {
                key: item.name.clone(),
                graph,
            });
        }

        Ok(Arc::new(ForkTask {
            name: self.name.clone(),
            compete: self.spec.compete,
            branches,
        }))
    }
}
