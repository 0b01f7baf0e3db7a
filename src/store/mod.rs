//! Store module - execution state for task graphs

mod state;

pub use state::ExecutionState;
