//! Event Module - run history
//!
//! - `history`: History, HistoryEvent, HistoryEventKind

mod history;

pub use history::{History, HistoryEvent, HistoryEventKind};
