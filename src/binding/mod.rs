//! Binding Module - runtime expressions over execution state
//!
//! Task parameters reference earlier results with `${ ... }` JEXL expressions:
//!
//! ```yaml
//! with:
//!   arguments:
//!     - ${ data.fetchUser.email }
//!     - ${ env.REGION|lower }
//! ```
//!
//! Expressions see `{ input, data, env, output }` plus task-local bindings.
//!
//! - `evaluate`: `Evaluator` (evaluate, traverse_and_evaluate, check_if)
//! - `wrapper`: replay boundary around every evaluation
//! - `functions`: extension functions (uuid, lower, upper, trim, length, keys)

mod evaluate;
mod functions;
mod wrapper;

pub use evaluate::{is_runtime_expression, Evaluator};
pub use wrapper::{EvaluationWrapper, PassThrough, RecordingWrapper};
