//! Utility modules

pub mod constants;
pub mod naming;

pub use naming::{child_graph_name, child_id};
