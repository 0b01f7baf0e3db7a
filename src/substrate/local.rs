//! LocalSubstrate - in-process substrate for the CLI and tests
//!
//! Nothing is persisted. Every run keeps an in-memory [`History`] whose length
//! drives continue-as-new exactly like a durable substrate would, and
//! continue-as-new restarts the entry point in the same process with the
//! carried state.
//!
//! ```rust,ignore
//! let substrate = LocalSubstrate::builder(program)
//!     .activity("greet", |args| async move { Ok(json!(format!("hi {}", args[0]))) })
//!     .build()?;
//! let outcome = substrate.run(json!({"name": "ada"})).await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::http::HttpExecutor;
use super::process::{ProcessRunner, TokioProcessRunner};
use super::retry::{RetryConfig, RetryPolicy};
use super::signals::SignalBoard;
use super::{CallKind, CallRequest, HeartbeatGuard, MetadataSink, Substrate};
use crate::ast::{ActivityCall, ContainerProcess, GrpcCall, ScriptProcess, ShellProcess};
use crate::binding::{EvaluationWrapper, Evaluator};
use crate::config::BraidConfig;
use crate::error::{BraidError, Result};
use crate::event::{History, HistoryEventKind};
use crate::runtime::{ExecContext, Program, RunInfo};
use crate::store::ExecutionState;
use crate::util::constants::MAX_CONTINUATIONS;

/// Activity handler: positional arguments in, result out
pub type ActivityFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// RPC handler registered under `service/method`
pub type RpcFn = Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// How often `await_condition` re-checks its predicate without a wake-up
const CONDITION_POLL: Duration = Duration::from_millis(25);

// ═══════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════

pub struct LocalSubstrateBuilder {
    program: Program,
    config: BraidConfig,
    activities: FxHashMap<String, ActivityFn>,
    rpcs: FxHashMap<String, RpcFn>,
    process: Arc<dyn ProcessRunner>,
    env: Option<Map<String, Value>>,
    wrapper: Option<Arc<dyn EvaluationWrapper>>,
    retry: Option<RetryConfig>,
}

impl LocalSubstrateBuilder {
    fn new(program: Program) -> Self {
        Self {
            program,
            config: BraidConfig::default(),
            activities: FxHashMap::default(),
            rpcs: FxHashMap::default(),
            process: Arc::new(TokioProcessRunner),
            env: None,
            wrapper: None,
            retry: None,
        }
    }

    pub fn config(mut self, config: BraidConfig) -> Self {
        self.config = config;
        self
    }

    pub fn activity<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: ActivityFn = Arc::new(move |args| handler(args).boxed());
        self.activities.insert(name.into(), handler);
        self
    }

    pub fn rpc<F, Fut>(mut self, service: &str, method: &str, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: RpcFn = Arc::new(move |args| handler(args).boxed());
        self.rpcs.insert(rpc_key(service, method), handler);
        self
    }

    pub fn process_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.process = runner;
        self
    }

    /// Replace the `env` document (default: prefixed process variables)
    pub fn env(mut self, env: Map<String, Value>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn evaluation_wrapper(mut self, wrapper: Arc<dyn EvaluationWrapper>) -> Self {
        self.wrapper = Some(wrapper);
        self
    }

    /// Override the retry policy derived from `[calls]`
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Result<LocalSubstrate> {
        let env = self.env.unwrap_or_else(|| self.config.load_env_map());
        let retry = self
            .retry
            .unwrap_or_else(|| RetryConfig::from(&self.config.calls));
        let evaluator = match self.wrapper {
            Some(wrapper) => Evaluator::with_wrapper(wrapper),
            None => Evaluator::new(),
        };

        Ok(LocalSubstrate {
            inner: Arc::new(Inner {
                program: self.program,
                config: self.config,
                activities: self.activities,
                rpcs: self.rpcs,
                process: self.process,
                http: HttpExecutor::new()?,
                retry: RetryPolicy::new(retry),
                signals: SignalBoard::new(),
                search_attributes: Mutex::new(Map::new()),
                env: Arc::new(env),
                evaluator,
                cancel: CancellationToken::new(),
            }),
        })
    }
}

fn rpc_key(service: &str, method: &str) -> String {
    format!("{service}/{method}")
}

// ═══════════════════════════════════════════════════════════════
// Substrate
// ═══════════════════════════════════════════════════════════════

struct Inner {
    program: Program,
    config: BraidConfig,
    activities: FxHashMap<String, ActivityFn>,
    rpcs: FxHashMap<String, RpcFn>,
    process: Arc<dyn ProcessRunner>,
    http: HttpExecutor,
    retry: RetryPolicy,
    signals: SignalBoard,
    search_attributes: Mutex<Map<String, Value>>,
    env: Arc<Map<String, Value>>,
    evaluator: Evaluator,
    cancel: CancellationToken,
}

/// Result of a completed local run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Exported output of the entry point (null when nothing was exported)
    pub output: Value,
    pub state: ExecutionState,
    /// History of the last run (earlier runs ended in continue-as-new)
    pub history: History,
    pub continuations: u32,
    pub run_id: String,
}

#[derive(Clone)]
pub struct LocalSubstrate {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LocalSubstrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSubstrate")
            .field("entry_point", &self.inner.program.root_name())
            .field("activities", &self.inner.activities.len())
            .field("rpcs", &self.inner.rpcs.len())
            .finish_non_exhaustive()
    }
}

impl LocalSubstrate {
    pub fn builder(program: Program) -> LocalSubstrateBuilder {
        LocalSubstrateBuilder::new(program)
    }

    pub fn program(&self) -> &Program {
        &self.inner.program
    }

    /// Deliver a signal to the running workflow
    pub fn signal(&self, name: &str, payload: Value) {
        debug!(signal = name, "signal delivered");
        self.inner.signals.deliver(name, payload);
    }

    /// Latest response registered for query `name`
    pub fn query(&self, name: &str) -> Option<Value> {
        self.inner.signals.query(name)
    }

    pub fn search_attributes(&self) -> Map<String, Value> {
        self.inner.search_attributes.lock().clone()
    }

    /// Cancel every in-flight run of this substrate
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    fn root_context(&self, entry_point: &str) -> ExecContext {
        let workflow_id = self.inner.program.root_name().to_string();
        ExecContext::new(
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            self.inner.evaluator.clone(),
            RunInfo::new(workflow_id, entry_point),
        )
        .with_cancellation(self.inner.cancel.child_token())
    }

    /// Run the program's entry point to completion, following continue-as-new
    #[instrument(name = "run", skip_all, fields(workflow = %self.inner.program.root_name()))]
    pub async fn run(&self, input: Value) -> Result<RunOutcome> {
        let mut graph = self.inner.program.root()?;
        let mut state = graph.initial_state(input.clone(), Arc::clone(&self.inner.env))?;
        let mut input = input;
        let mut continuations = 0u32;

        loop {
            let ctx = self.root_context(graph.name());
            let history = ctx.history().clone();
            history.record(HistoryEventKind::RunStarted {
                entry_point: graph.name().into(),
                run_id: ctx.run().run_id.clone(),
                resume_marker: state.resume_marker.clone(),
            });
            info!(entry_point = graph.name(), continuations, "run started");

            match graph.run(&ctx, &input, state).await {
                Ok(final_state) => {
                    let output = final_state.output_or_null();
                    history.record(HistoryEventKind::RunCompleted {
                        output: Arc::new(output.clone()),
                        total_duration_ms: history.elapsed_ms(),
                    });
                    return Ok(RunOutcome {
                        output,
                        state: final_state,
                        history,
                        continuations,
                        run_id: ctx.run().run_id.clone(),
                    });
                }
                Err(BraidError::ContinueAsNew {
                    entry_point,
                    input: next_input,
                    state: next_state,
                }) => {
                    continuations += 1;
                    if continuations > MAX_CONTINUATIONS {
                        let err = BraidError::ContinuationFailed {
                            reason: format!("gave up after {MAX_CONTINUATIONS} restarts"),
                        };
                        history.record(HistoryEventKind::RunFailed {
                            error: err.to_string(),
                        });
                        return Err(err);
                    }
                    history.record(HistoryEventKind::ContinuedAsNew {
                        entry_point: entry_point.as_str().into(),
                        resume_marker: next_state.resume_marker.clone(),
                    });
                    debug!(
                        entry_point = %entry_point,
                        marker = ?next_state.resume_marker,
                        "continuing as new"
                    );
                    graph = self.inner.program.graph(&entry_point)?;
                    input = next_input;
                    state = *next_state;
                }
                Err(e) => {
                    history.record(HistoryEventKind::RunFailed {
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }
    }

    async fn dispatch(&self, kind: &CallKind, timeout: Duration) -> Result<Value> {
        match kind {
            CallKind::Activity(call) => self.call_activity(call).await,
            CallKind::Http(call) => self.inner.http.execute(call, timeout).await,
            CallKind::Grpc(call) => self.call_rpc(call).await,
            CallKind::Shell(shell) => self.run_shell(shell).await,
            CallKind::Script(script) => self.run_script(script).await,
            CallKind::Container(container) => self.run_container(container).await,
        }
    }

    async fn call_activity(&self, call: &ActivityCall) -> Result<Value> {
        let handler = self.inner.activities.get(&call.name).ok_or_else(|| {
            BraidError::HandlerNotFound {
                name: call.name.clone(),
            }
        })?;
        handler(call.arguments.clone()).await
    }

    async fn call_rpc(&self, call: &GrpcCall) -> Result<Value> {
        let key = rpc_key(&call.service.name, &call.method);
        let handler = self
            .inner
            .rpcs
            .get(&key)
            .ok_or(BraidError::HandlerNotFound { name: key })?;
        handler(call.arguments.clone()).await
    }

    async fn run_shell(&self, shell: &ShellProcess) -> Result<Value> {
        let args = string_args(&shell.arguments);
        let env = string_env(&shell.environment);
        self.inner
            .process
            .run(&shell.command, &args, &env, None)
            .await
            .map(Value::String)
    }

    async fn run_script(&self, script: &ScriptProcess) -> Result<Value> {
        let (interpreter, extension) = script.language.interpreter();
        let dir = tempfile::tempdir()?;
        let file = dir.path().join(format!("script.{extension}"));
        tokio::fs::write(&file, &script.code).await?;

        let mut args = vec![file.to_string_lossy().into_owned()];
        args.extend(string_args(&script.arguments));
        let env = string_env(&script.environment);
        let stdout = self
            .inner
            .process
            .run(interpreter, &args, &env, Some(dir.path()))
            .await?;
        Ok(Value::String(stdout))
    }

    async fn run_container(&self, container: &ContainerProcess) -> Result<Value> {
        let args = container_args(container);
        self.inner
            .process
            .run("docker", &args, &FxHashMap::default(), None::<&Path>)
            .await
            .map(Value::String)
    }
}

fn string_args(arguments: &[Value]) -> Vec<String> {
    arguments.iter().map(value_string).collect()
}

fn string_env(environment: &Map<String, Value>) -> FxHashMap<String, String> {
    environment
        .iter()
        .map(|(k, v)| (k.clone(), value_string(v)))
        .collect()
}

fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `docker run --rm -e K=V image [command] args...`
fn container_args(container: &ContainerProcess) -> Vec<String> {
    let mut args = vec!["run".to_string(), "--rm".to_string()];
    for (key, value) in &container.environment {
        args.push("-e".to_string());
        args.push(format!("{key}={}", value_string(value)));
    }
    args.push(container.image.clone());
    if let Some(command) = &container.command {
        args.push(command.clone());
    }
    args.extend(string_args(&container.arguments));
    args
}

#[async_trait]
impl Substrate for LocalSubstrate {
    async fn execute_call(&self, ctx: &ExecContext, request: CallRequest) -> Result<Value> {
        let identifier: Arc<str> = request.kind.identifier().into();
        let timeout = request
            .timeout
            .unwrap_or_else(|| self.inner.config.calls.timeout());
        let request = &request;
        let started = Instant::now();

        let result = self
            .inner
            .retry
            .execute(ctx.cancellation(), |attempt| {
                let identifier = Arc::clone(&identifier);
                async move {
                    ctx.history().record(HistoryEventKind::CallScheduled {
                        call: Arc::clone(&identifier),
                        attempt,
                    });
                    let outcome = tokio::select! {
                        _ = ctx.cancellation().cancelled() => Err(BraidError::Cancelled {
                            scope: request.task.clone(),
                        }),
                        outcome = tokio::time::timeout(timeout, self.dispatch(&request.kind, timeout)) => {
                            outcome.unwrap_or_else(|_| Err(BraidError::CallTimeout {
                                call: identifier.to_string(),
                                timeout_ms: timeout.as_millis() as u64,
                            }))
                        }
                    };
                    if let Err(e) = &outcome {
                        ctx.history().record(HistoryEventKind::CallFailed {
                            call: Arc::clone(&identifier),
                            error: e.to_string(),
                            retryable: e.is_retryable(),
                        });
                    }
                    outcome
                }
            })
            .await?;

        ctx.history().record(HistoryEventKind::CallCompleted {
            call: identifier,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        Ok(result)
    }

    async fn execute_sub_graph(
        &self,
        ctx: &ExecContext,
        name: &str,
        input: Value,
        state: ExecutionState,
    ) -> Result<Value> {
        let mut graph = self.inner.program.graph(name)?;
        let started = Instant::now();
        ctx.history().record(HistoryEventKind::SubGraphStarted {
            name: name.into(),
            detached: false,
        });

        let (mut input, mut state) = (input, state);
        let mut continuations = 0u32;
        let output = loop {
            let child = ctx.for_run(RunInfo::new(ctx.run().workflow_id.clone(), graph.name()));
            match graph.run(&child, &input, state).await {
                Ok(final_state) => break final_state.output_or_null(),
                Err(BraidError::ContinueAsNew {
                    entry_point,
                    input: next_input,
                    state: next_state,
                }) => {
                    continuations += 1;
                    if continuations > MAX_CONTINUATIONS {
                        return Err(BraidError::ContinuationFailed {
                            reason: format!("sub-graph '{name}' restarted {MAX_CONTINUATIONS} times"),
                        });
                    }
                    graph = self.inner.program.graph(&entry_point)?;
                    input = next_input;
                    state = *next_state;
                }
                Err(e) => return Err(e),
            }
        };

        ctx.history().record(HistoryEventKind::SubGraphCompleted {
            name: name.into(),
            duration_ms: started.elapsed().as_millis() as u64,
        });
        Ok(output)
    }

    async fn start_sub_graph(
        &self,
        ctx: &ExecContext,
        name: &str,
        input: Value,
        state: ExecutionState,
    ) -> Result<()> {
        // Fail now on an unknown name rather than inside the detached task
        self.inner.program.graph(name)?;
        ctx.history().record(HistoryEventKind::SubGraphStarted {
            name: name.into(),
            detached: true,
        });

        let substrate = self.clone();
        let slot = ctx.run().handlers.enter();
        let ctx = ctx.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            if let Err(e) = substrate.execute_sub_graph(&ctx, &name, input, state).await {
                warn!(sub_graph = %name, error = %e, "detached sub-graph failed");
            }
            drop(slot);
        });
        Ok(())
    }

    async fn await_condition(
        &self,
        ctx: &ExecContext,
        predicate: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<()> {
        loop {
            ctx.ensure_active("condition")?;
            if predicate() {
                return Ok(());
            }
            tokio::select! {
                biased;
                _ = ctx.cancellation().cancelled() => {}
                _ = self.inner.signals.changed() => {}
                _ = tokio::time::sleep(CONDITION_POLL) => {}
            }
        }
    }

    async fn sleep(&self, ctx: &ExecContext, duration: Duration) -> Result<()> {
        let duration_ms = duration.as_millis() as u64;
        ctx.history()
            .record(HistoryEventKind::TimerStarted { duration_ms });
        tokio::select! {
            _ = ctx.cancellation().cancelled() => {
                return Err(BraidError::Cancelled { scope: "timer".to_string() })
            }
            _ = tokio::time::sleep(duration) => {}
        }
        ctx.history().record(HistoryEventKind::TimerFired { duration_ms });
        Ok(())
    }

    async fn await_signal(&self, ctx: &ExecContext, name: &str) -> Result<Value> {
        let payload = self.inner.signals.wait(name, ctx.cancellation()).await?;
        ctx.history()
            .record(HistoryEventKind::SignalReceived { name: name.into() });
        Ok(payload)
    }

    fn register_query(&self, ctx: &ExecContext, name: &str, response: Value) -> Result<()> {
        self.inner.signals.register_query(name, response);
        ctx.history()
            .record(HistoryEventKind::QueryRegistered { name: name.into() });
        Ok(())
    }

    fn continuation_suggested(&self, ctx: &ExecContext) -> bool {
        let threshold = self.inner.config.runtime.suggest_continuation_after;
        threshold > 0 && ctx.history().len() > threshold
    }

    fn history_length(&self, ctx: &ExecContext) -> usize {
        ctx.history().len()
    }

    /// Detached sub-graphs started by this run have all finished
    fn all_handlers_finished(&self, ctx: &ExecContext) -> bool {
        ctx.run().handlers.is_idle()
    }

    fn request_continuation(
        &self,
        _ctx: &ExecContext,
        entry_point: &str,
        input: Value,
        state: ExecutionState,
    ) -> BraidError {
        BraidError::ContinueAsNew {
            entry_point: entry_point.to_string(),
            input,
            state: Box::new(state),
        }
    }

    fn register_heartbeat(&self, ctx: &ExecContext, interval: Duration) -> HeartbeatGuard {
        let token = ctx.cancellation().child_token();
        let stop = token.clone();
        let history = ctx.history().clone();
        let interval_ms = interval.as_millis() as u64;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        history.record(HistoryEventKind::Heartbeat { interval_ms });
                    }
                }
            }
        });
        HeartbeatGuard::new(token)
    }
}

impl MetadataSink for LocalSubstrate {
    fn apply_search_attributes(
        &self,
        ctx: &ExecContext,
        attributes: &Map<String, Value>,
    ) -> Result<()> {
        let mut current = self.inner.search_attributes.lock();
        for (key, value) in attributes {
            current.insert(key.clone(), value.clone());
        }
        ctx.history()
            .record(HistoryEventKind::SearchAttributesUpserted {
                attributes: Value::Object(attributes.clone()),
            });
        Ok(())
    }
}
