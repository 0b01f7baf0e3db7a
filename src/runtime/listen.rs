//! External events (`listen`)
//!
//! ```yaml
//! - approval:
//!     listen:
//!       to:
//!         any:
//!           - with: { id: approve, type: signal }
//!           - with: { id: reject, type: signal }
//! ```
//!
//! Signals and updates block until delivered. Queries register a response
//! computed from the current state and never block.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, select_all};
use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::call::invalid;
use super::compiler::Compiler;
use super::context::ExecContext;
use super::registry::{wrong_variant, TaskBuilder};
use super::Executable;
use crate::ast::{ListenEventType, ListenMode, Task, TaskDefinition};
use crate::error::Result;
use crate::store::ExecutionState;

struct Query {
    id: String,
    response: Option<Value>,
}

struct ListenExecutable {
    name: String,
    mode: ListenMode,
    /// Signal and update ids, in declaration order
    waits: Vec<String>,
    queries: Vec<Query>,
}

impl ListenExecutable {
    fn register_queries(&self, ctx: &ExecContext, state: &ExecutionState) -> Result<()> {
        for query in &self.queries {
            let response = match &query.response {
                Some(raw) => ctx.evaluator().traverse_and_evaluate(raw.clone(), state)?,
                None => Value::Object(state.data.clone()),
            };
            debug!(task = %self.name, query = %query.id, "registering query");
            ctx.substrate().register_query(ctx, &query.id, response)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Executable for ListenExecutable {
    async fn execute(
        &self,
        ctx: &ExecContext,
        _input: &Value,
        state: &mut ExecutionState,
    ) -> Result<Option<Value>> {
        self.register_queries(ctx, state)?;
        if self.waits.is_empty() {
            return Ok(None);
        }

        let substrate = ctx.substrate();
        info!(task = %self.name, events = ?self.waits, "waiting for events");

        match self.mode {
            ListenMode::One => {
                let payload = substrate.await_signal(ctx, &self.waits[0]).await?;
                Ok(Some(payload))
            }
            ListenMode::Any => {
                let pending = self.waits.iter().map(|id| {
                    async move { (id, substrate.await_signal(ctx, id).await) }.boxed()
                });
                let ((id, payload), _, _) = select_all(pending).await;
                let mut received = Map::new();
                received.insert(id.clone(), payload?);
                Ok(Some(Value::Object(received)))
            }
            ListenMode::All => {
                let pending = self
                    .waits
                    .iter()
                    .map(|id| async move { (id, substrate.await_signal(ctx, id).await) });
                let mut received = Map::new();
                for (id, payload) in join_all(pending).await {
                    received.insert(id.clone(), payload?);
                }
                Ok(Some(Value::Object(received)))
            }
        }
    }
}

pub struct ListenBuilder {
    name: String,
    task: Arc<Task>,
}

impl ListenBuilder {
    pub fn boxed(name: &str, task: &Arc<Task>) -> Result<Box<dyn TaskBuilder>> {
        match &task.definition {
            TaskDefinition::Listen(_) => Ok(Box::new(Self {
                name: name.to_string(),
                task: Arc::clone(task),
            })),
            _ => Err(wrong_variant(name, "listen", task)),
        }
    }

    fn only_queries(&self) -> bool {
        match &self.task.definition {
            TaskDefinition::Listen(listen) => {
                let events = listen.to.events();
                !events.is_empty()
                    && events
                        .iter()
                        .all(|e| e.with.event_type == ListenEventType::Query)
            }
            _ => false,
        }
    }
}

impl TaskBuilder for ListenBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    /// Queries must be answerable again after a restart
    fn never_skip_on_resume(&self) -> bool {
        self.only_queries()
    }

    fn build(&self, _compiler: &Compiler, _parent: &str) -> Result<Arc<dyn Executable>> {
        let TaskDefinition::Listen(listen) = &self.task.definition else {
            return Err(wrong_variant(&self.name, "listen", &self.task));
        };
        let mode = listen
            .to
            .mode()
            .ok_or_else(|| invalid(&self.name, "listen.to needs exactly one of one, any or all"))?;

        let mut waits = Vec::new();
        let mut queries = Vec::new();
        for event in listen.to.events() {
            let event = &event.with;
            if event.id.is_empty() {
                return Err(invalid(&self.name, "listen event id is empty"));
            }
            match event.event_type {
                ListenEventType::Signal | ListenEventType::Update => waits.push(event.id.clone()),
                ListenEventType::Query => queries.push(Query {
                    id: event.id.clone(),
                    response: event.data.clone(),
                }),
            }
        }

        Ok(Arc::new(ListenExecutable {
            name: self.name.clone(),
            mode,
            waits,
            queries,
        }))
    }
}
