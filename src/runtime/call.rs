//! Calls (`call: activity | http | grpc`)
//!
//! Arguments are interpolated against the state right before dispatch; the
//! call itself, its retries and its timeout belong to the substrate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::compiler::Compiler;
use super::context::ExecContext;
use super::registry::{wrong_variant, TaskBuilder};
use super::{metadata, Executable};
use crate::ast::{CallTask, Task, TaskDefinition};
use crate::binding::is_runtime_expression;
use crate::error::{BraidError, Result};
use crate::store::ExecutionState;
use crate::substrate::{CallKind, CallRequest};

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Evaluate every expression inside a typed payload
pub(crate) fn interpolate<T>(ctx: &ExecContext, task: &str, payload: &T, state: &ExecutionState) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let raw = serde_json::to_value(payload)?;
    let evaluated = ctx.evaluator().traverse_and_evaluate(raw, state)?;
    serde_json::from_value(evaluated).map_err(|e| BraidError::InvalidTask {
        task: task.to_string(),
        reason: format!("interpolated arguments do not fit the call: {e}"),
    })
}

/// `timeout.after` of a task, checked at build time
pub(crate) fn task_timeout(name: &str, task: &Task) -> Result<Option<Duration>> {
    match &task.base.timeout {
        Some(spec) => spec.after.to_duration().map(Some).map_err(|e| BraidError::InvalidTask {
            task: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(None),
    }
}

pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> BraidError {
    BraidError::InvalidTask {
        task: name.to_string(),
        reason: reason.into(),
    }
}

struct CallExecutable {
    name: String,
    task: Arc<Task>,
    call: CallTask,
    timeout: Option<Duration>,
}

#[async_trait]
impl Executable for CallExecutable {
    #[instrument(name = "call", skip_all, fields(task = %self.name, kind = self.call.kind()))]
    async fn execute(
        &self,
        ctx: &ExecContext,
        _input: &Value,
        state: &mut ExecutionState,
    ) -> Result<Option<Value>> {
        let kind = match &self.call {
            CallTask::Activity(a) => CallKind::Activity(interpolate(ctx, &self.name, a, state)?),
            CallTask::Http(h) => CallKind::Http(interpolate(ctx, &self.name, h, state)?),
            CallTask::Grpc(g) => CallKind::Grpc(interpolate(ctx, &self.name, g, state)?),
        };

        debug!(call = %kind.identifier(), "dispatching call");
        let _heartbeat = metadata::start_heartbeat(ctx, &self.name, &self.task);
        let result = ctx
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
        Ok(Some(result))
    }
}

pub struct CallBuilder {
    name: String,
    task: Arc<Task>,
    call: CallTask,
}

impl CallBuilder {
    pub fn boxed(name: &str, task: &Arc<Task>) -> Result<Box<dyn TaskBuilder>> {
        match &task.definition {
            TaskDefinition::Call(call) => Ok(Box::new(Self {
                name: name.to_string(),
                task: Arc::clone(task),
                call: call.clone(),
            })),
            _ => Err(wrong_variant(name, "call", task)),
        }
    }

    fn check(&self) -> Result<()> {
        match &self.call {
            CallTask::Activity(a) if a.name.trim().is_empty() => {
                Err(invalid(&self.name, "activity name is empty"))
            }
            CallTask::Http(h) if h.endpoint.uri().trim().is_empty() => {
                Err(invalid(&self.name, "http endpoint is empty"))
            }
            CallTask::Http(h)
                if !is_runtime_expression(&h.method)
                    && !HTTP_METHODS.contains(&h.method.to_uppercase().as_str()) =>
            {
                Err(invalid(&self.name, format!("unsupported http method '{}'", h.method)))
            }
            CallTask::Grpc(g) if g.service.name.is_empty() || g.method.is_empty() => {
                Err(invalid(&self.name, "grpc service name and method are required"))
            }
            _ => Ok(()),
        }
    }
}

impl TaskBuilder for CallBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, _compiler: &Compiler, _parent: &str) -> Result<Arc<dyn Executable>> {
        self.check()?;
        Ok(Arc::new(CallExecutable {
            name: self.name.clone(),
            task: Arc::clone(&self.task),
            call: self.call.clone(),
            timeout: task_timeout(&self.name, &self.task)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ActivityCall, Endpoint, HttpCall, HttpOutput, TaskBase};
    use crate::runtime::{BuilderRegistry, CompileOptions};
    use serde_json::Map;

    fn call_task(call: CallTask) -> Arc<Task> {
        Arc::new(Task {
            base: TaskBase::default(),
            definition: TaskDefinition::Call(call),
        })
    }

    fn http(method: &str, uri: &str) -> CallTask {
        CallTask::Http(HttpCall {
            method: method.to_string(),
            endpoint: Endpoint::Uri(uri.to_string()),
            headers: Map::new(),
            query: Map::new(),
            body: None,
            output: HttpOutput::Content,
            redirect: false,
        })
    }

    fn build(task: Arc<Task>) -> Result<Arc<dyn Executable>> {
        let compiler = Compiler::new(BuilderRegistry::default(), CompileOptions::default());
        CallBuilder::boxed("fetch", &task)?.build(&compiler, "root")
    }

    #[test]
    fn test_rejects_empty_activity_name() {
        let task = call_task(CallTask::Activity(ActivityCall {
            name: " ".into(),
            arguments: vec![],
        }));
        assert!(matches!(build(task), Err(BraidError::InvalidTask { .. })));
    }

    #[test]
    fn test_http_method_checked_unless_expression() {
        assert!(build(call_task(http("get", "https://example.com"))).is_ok());
        assert!(build(call_task(http("FETCH", "https://example.com"))).is_err());
        assert!(build(call_task(http("${ input.method }", "https://example.com"))).is_ok());
        assert!(build(call_task(http("GET", ""))).is_err());
    }
}
