//! Braid - declarative workflow interpreter on a durable execution substrate
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  ast/        YAML → Rust types (Workflow, Task, TaskList)    │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  runtime/    Compiler, sub-graphs, executables, Runner       │
//! │  binding/    Runtime expressions (${ ... }, guards)          │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  substrate/  Substrate contract + LocalSubstrate             │
//! │  store/      ExecutionState threaded through a graph         │
//! │  event/      Run history (drives continue-as-new)            │
//! │  util/       Constants, generated names                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`ast`] | YAML parsing → `Workflow`, `Task`, `TaskDefinition` |
//! | [`runtime`] | Compilation into named sub-graphs and their execution |
//! | [`binding`] | JEXL expressions, traversal, guard semantics |
//! | [`substrate`] | Calls, timers, signals, sub-graphs, continue-as-new |
//! | [`store`] | `ExecutionState` (input, data, env, output, resume marker) |
//! | [`event`] | Append-only history per run |
//! | [`util`] | Constants and child naming |
//! | [`error`] | Error types with fix suggestions |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL - YAML → Rust types
// ═══════════════════════════════════════════════════════════════
pub mod ast;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER - Compilation and execution
// ═══════════════════════════════════════════════════════════════
pub mod binding;
pub mod runtime;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER - Substrate, state, history
// ═══════════════════════════════════════════════════════════════
pub mod event;
pub mod store;
pub mod substrate;
pub mod util;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING - Error handling, configuration
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

pub use error::{BraidError, FixSuggestion, Result};

pub use config::BraidConfig;

pub use ast::{FlowDirective, Task, TaskDefinition, TaskList, Workflow};

pub use runtime::{
    CompileOptions, Compiler, ExecContext, Executable, Program, Runner, SubGraph, TaskBuilder,
};

pub use binding::Evaluator;

pub use substrate::{CallKind, CallRequest, LocalSubstrate, MetadataSink, RunOutcome, Substrate};

pub use event::{History, HistoryEvent, HistoryEventKind};

pub use store::ExecutionState;
