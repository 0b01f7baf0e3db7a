//! Runtime Module - compiled task graphs and their execution
//!
//! - `compiler`: workflow → [`Program`] of named [`SubGraph`]s
//! - `registry`: task tag → [`TaskBuilder`]
//! - `sequence`: ordered execution, guards, flow directives, checkpoints
//! - `iterate`, `fork`, `switch`, `try_catch`: composite tasks
//! - `call`, `run`, `wait`, `raise`, `listen`, `set`: leaf tasks
//! - `runner`: load → compile → run on a substrate
//!
//! This module represents the "how" - runtime execution.
//! For static structure, see the `ast` module.

mod call;
mod compiler;
mod context;
mod continuation;
mod fork;
mod iterate;
mod listen;
mod metadata;
mod raise;
mod registry;
mod run;
mod runner;
mod sequence;
mod set;
mod switch;
mod try_catch;
mod wait;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::store::ExecutionState;

pub use compiler::{CompileOptions, Compiler, Program, SubGraph, SubGraphRegistry};
pub use context::{ExecContext, InFlight, InFlightGuard, RunInfo};
pub use continuation::into_continuation;
pub use fork::join_complete;
pub use metadata::{HEARTBEAT_KEY, SEARCH_ATTRIBUTES_KEY};
pub use registry::{BuilderFn, BuilderRegistry, TaskBuilder};
pub use runner::Runner;
pub use sequence::{Checkpointing, Sequence, SequenceChild};

/// A compiled task
///
/// `Ok(None)` means "no result": nothing is recorded under the task's name.
#[async_trait]
pub trait Executable: Send + Sync {
    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &Value,
        state: &mut ExecutionState,
    ) -> Result<Option<Value>>;
}
