//! Conditional dispatch (`switch`)
//!
//! Cases are checked in order; the first whose `when` holds (an absent `when`
//! always holds) runs its target sub-graph and nothing after it is evaluated.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::compiler::Compiler;
use super::context::ExecContext;
use super::registry::{wrong_variant, TaskBuilder};
use super::Executable;
use crate::ast::{FlowDirective, SwitchCase, Task, TaskDefinition};
use crate::error::{BraidError, Result};
use crate::store::ExecutionState;

struct SwitchTask {
    name: String,
    cases: Vec<SwitchCase>,
}

#[async_trait]
impl Executable for SwitchTask {
    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &Value,
        state: &mut ExecutionState,
    ) -> Result<Option<Value>> {
        for case in &self.cases {
            if !ctx.evaluator().check_if(case.when.as_deref(), state)? {
                debug!(task = %self.name, case = %case.name, "case does not match");
                continue;
            }

            let target = match &case.then {
                Some(FlowDirective::Target(target)) => target,
                _ => {
                    debug!(task = %self.name, case = %case.name, "matched case has no target");
                    return Ok(None);
                }
            };

            info!(task = %self.name, case = %case.name, target = %target, "dispatching switch case");
            let result = ctx
                .substrate()
                .execute_sub_graph(ctx, target, input.clone(), state.clone_scope())
                .await?;
            return Ok((!result.is_null()).then_some(result));
        }

        debug!(task = %self.name, "no case matched");
        Ok(None)
    }
}

pub struct SwitchBuilder {
    name: String,
    cases: Vec<SwitchCase>,
}

impl SwitchBuilder {
    pub fn boxed(name: &str, task: &Arc<Task>) -> Result<Box<dyn TaskBuilder>> {
        match &task.definition {
            TaskDefinition::Switch(cases) => Ok(Box::new(Self {
                name: name.to_string(),
                cases: cases.clone(),
            })),
            _ => Err(wrong_variant(name, "switch", task)),
        }
    }
}

impl TaskBuilder for SwitchBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, compiler: &Compiler, _parent: &str) -> Result<Arc<dyn Executable>> {
        let defaults = self.cases.iter().filter(|c| c.when.is_none()).count();
        if defaults > 1 {
            return Err(BraidError::DuplicateSwitchDefault {
                task: self.name.clone(),
            });
        }
        if defaults == 0 {
            warn!(task = %self.name, "switch has no default case");
        }

        for case in &self.cases {
            if let Some(FlowDirective::Target(target)) = &case.then {
                compiler.require_sub_graph(&self.name, target);
            }
        }

        Ok(Arc::new(SwitchTask {
            name: self.name.clone(),
            cases: self.cases.clone(),
        }))
    }
}
