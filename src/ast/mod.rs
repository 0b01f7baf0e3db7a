//! AST Module - typed task graph parsed from YAML documents
//!
//! - `workflow`: Workflow, DocumentMeta
//! - `task`: TaskList, Task, TaskBase, TaskDefinition, FlowDirective
//! - `action`: per-variant payloads (for, fork, switch, try, call, run, raise, listen)
//! - `duration`: ISO 8601 and inline durations
//! - `schema_validator`: input schema validation
//!
//! These types represent the "what" - static structure parsed from YAML.
//! For compilation and execution, see the `runtime` module.

pub mod action;
pub mod duration;
pub mod schema_validator;
mod task;
mod workflow;

pub use action::{
    ActivityCall, CallTask, CatchSpec, ContainerProcess, Endpoint, EventFilter, ForSpec, ForTask,
    ForkSpec, GrpcCall, GrpcService, HttpCall, HttpOutput, ListenEvent, ListenEventType,
    ListenMode, ListenTask, ListenTo, RaiseError, RaiseTask, RunProcess, RunTask, ScriptLanguage,
    ScriptProcess, ShellProcess, SwitchCase, TryTask, WorkflowProcess,
};
pub use duration::{DurationSpec, InlineDuration};
pub use schema_validator::{JsonSchemaValidator, SchemaValidator, SchemaViolation};
pub use task::{
    ExportSpec, FlowDirective, InputSpec, Task, TaskBase, TaskDefinition, TaskItem, TaskList,
    TimeoutSpec,
};
pub use workflow::{DocumentMeta, Workflow};

pub(crate) use task::value_kind;
