//! Substrate Module - contracts with the durable execution substrate
//!
//! The interpreter never persists, replays or retries anything itself. It
//! drives these traits:
//!
//! - [`Substrate`]: calls, sub-graphs, timers, signals, continue-as-new, heartbeats
//! - [`MetadataSink`]: search-attribute style metadata
//! - [`ProcessRunner`]: local commands behind `run.shell/script/container`
//!
//! [`LocalSubstrate`] implements all of them in-process for the CLI and tests.

mod http;
mod local;
mod process;
mod retry;
mod signals;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::ast::{ActivityCall, ContainerProcess, GrpcCall, HttpCall, ScriptProcess, ShellProcess};
use crate::error::{BraidError, Result};
use crate::runtime::ExecContext;
use crate::store::ExecutionState;

pub use http::HttpExecutor;
pub use local::{ActivityFn, LocalSubstrate, LocalSubstrateBuilder, RpcFn, RunOutcome};
pub use process::{ProcessRunner, TokioProcessRunner};
pub use retry::{RetryConfig, RetryPolicy};
pub use signals::SignalBoard;

// ═══════════════════════════════════════════════════════════════
// Call requests
// ═══════════════════════════════════════════════════════════════

/// A side-effecting call dispatched through the substrate
#[derive(Debug, Clone)]
pub struct CallRequest {
    /// Name of the task issuing the call
    pub task: String,
    pub kind: CallKind,
    /// Per-attempt timeout; substrate default when absent
    pub timeout: Option<Duration>,
}

/// Interpolated call payloads
#[derive(Debug, Clone)]
pub enum CallKind {
    Activity(ActivityCall),
    Http(HttpCall),
    Grpc(GrpcCall),
    Shell(ShellProcess),
    Script(ScriptProcess),
    Container(ContainerProcess),
}

impl CallKind {
    /// Identifier used in history and logs
    pub fn identifier(&self) -> String {
        match self {
            Self::Activity(a) => a.name.clone(),
            Self::Http(h) => format!("{} {}", h.method.to_uppercase(), h.endpoint.uri()),
            Self::Grpc(g) => format!("{}/{}", g.service.name, g.method),
            Self::Shell(s) => s.command.clone(),
            Self::Script(s) => format!("script:{}", s.language.interpreter().0),
            Self::Container(c) => format!("container:{}", c.image),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// Heartbeats
// ═══════════════════════════════════════════════════════════════

/// Stops the heartbeat it was returned for when dropped
#[derive(Debug)]
pub struct HeartbeatGuard {
    token: CancellationToken,
}

impl HeartbeatGuard {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Guard for substrates without heartbeats
    pub fn noop() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// ═══════════════════════════════════════════════════════════════
// Traits
// ═══════════════════════════════════════════════════════════════

/// Durable execution substrate
///
/// Every suspension point of the interpreter goes through here.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Run a side-effecting call (activity, http, rpc, process)
    async fn execute_call(&self, ctx: &ExecContext, request: CallRequest) -> Result<Value>;

    /// Run a registered sub-graph in isolation and return its output
    async fn execute_sub_graph(
        &self,
        ctx: &ExecContext,
        name: &str,
        input: Value,
        state: ExecutionState,
    ) -> Result<Value>;

    /// Start a registered sub-graph without waiting for it
    async fn start_sub_graph(
        &self,
        ctx: &ExecContext,
        name: &str,
        input: Value,
        state: ExecutionState,
    ) -> Result<()>;

    /// Block until `predicate` holds (re-checked on every state change)
    async fn await_condition(
        &self,
        ctx: &ExecContext,
        predicate: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<()>;

    /// Durable timer
    async fn sleep(&self, ctx: &ExecContext, duration: Duration) -> Result<()>;

    /// Wait for a named signal and return its payload
    async fn await_signal(&self, ctx: &ExecContext, name: &str) -> Result<Value>;

    /// Answer queries named `name` with `response` from now on
    fn register_query(&self, ctx: &ExecContext, name: &str, response: Value) -> Result<()>;

    fn is_cancelled(&self, err: &BraidError) -> bool {
        err.is_cancelled()
    }

    /// Substrate heuristic: history is large enough to restart
    fn continuation_suggested(&self, ctx: &ExecContext) -> bool;

    /// Events in the current run's history
    fn history_length(&self, ctx: &ExecContext) -> usize;

    /// No signal/update handler is mid-flight
    fn all_handlers_finished(&self, _ctx: &ExecContext) -> bool {
        true
    }

    /// Build the error that restarts `entry_point` with `input` and `state`
    ///
    /// Returning it up the stack is what performs the restart.
    fn request_continuation(
        &self,
        ctx: &ExecContext,
        entry_point: &str,
        input: Value,
        state: ExecutionState,
    ) -> BraidError;

    fn register_heartbeat(&self, ctx: &ExecContext, interval: Duration) -> HeartbeatGuard;
}

/// Receives interpolated metadata
pub trait MetadataSink: Send + Sync {
    fn apply_search_attributes(&self, ctx: &ExecContext, attributes: &Map<String, Value>)
        -> Result<()>;
}
