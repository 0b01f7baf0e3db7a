//! History - append-only record of one workflow run
//!
//! - HistoryEvent: envelope with id + timestamp + kind
//! - HistoryEventKind: run/call/sub-graph/timer/signal level events
//! - History: thread-safe log; its length drives continue-as-new
//!
//! A continued run starts a fresh history, so the length measures the
//! current run only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in a run history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since run start (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: HistoryEventKind,
}

/// All history event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEventKind {
    // ═══════════════════════════════════════════
    // RUN LEVEL
    // ═══════════════════════════════════════════
    RunStarted {
        entry_point: Arc<str>,
        run_id: String,
        /// Set when this run continues an earlier one
        resume_marker: Option<String>,
    },
    RunCompleted {
        output: Arc<Value>,
        total_duration_ms: u64,
    },
    RunFailed {
        error: String,
    },
    ContinuedAsNew {
        entry_point: Arc<str>,
        resume_marker: Option<String>,
    },

    // ═══════════════════════════════════════════
    // CALLS
    // ═══════════════════════════════════════════
    CallScheduled {
        call: Arc<str>,
        attempt: u32,
    },
    CallCompleted {
        call: Arc<str>,
        duration_ms: u64,
    },
    CallFailed {
        call: Arc<str>,
        error: String,
        retryable: bool,
    },

    // ═══════════════════════════════════════════
    // SUB-GRAPHS
    // ═══════════════════════════════════════════
    SubGraphStarted {
        name: Arc<str>,
        detached: bool,
    },
    SubGraphCompleted {
        name: Arc<str>,
        duration_ms: u64,
    },

    // ═══════════════════════════════════════════
    // TIMERS / SIGNALS / QUERIES
    // ═══════════════════════════════════════════
    TimerStarted {
        duration_ms: u64,
    },
    TimerFired {
        duration_ms: u64,
    },
    SignalReceived {
        name: Arc<str>,
    },
    QueryRegistered {
        name: Arc<str>,
    },
    SearchAttributesUpserted {
        attributes: Value,
    },
    Heartbeat {
        interval_ms: u64,
    },
}

impl HistoryEventKind {
    /// Call name if this is a call event
    pub fn call(&self) -> Option<&str> {
        match self {
            Self::CallScheduled { call, .. }
            | Self::CallCompleted { call, .. }
            | Self::CallFailed { call, .. } => Some(call),
            _ => None,
        }
    }

    /// Check if this is a run-level event
    pub fn is_run_event(&self) -> bool {
        matches!(
            self,
            Self::RunStarted { .. }
                | Self::RunCompleted { .. }
                | Self::RunFailed { .. }
                | Self::ContinuedAsNew { .. }
        )
    }
}

/// Thread-safe, append-only run history
#[derive(Clone)]
pub struct History {
    events: Arc<RwLock<Vec<HistoryEvent>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl History {
    /// Create a new history (call at run start)
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append an event (thread-safe, returns event ID)
    pub fn record(&self, kind: HistoryEventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = HistoryEvent {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event);
        id
    }

    /// Get all events (cloned - use `with_events` for zero-copy access)
    pub fn events(&self) -> Vec<HistoryEvent> {
        self.events.read().clone()
    }

    /// Zero-copy access to events via callback
    ///
    /// Holds read lock for duration of callback - keep it short.
    pub fn with_events<T>(&self, f: impl FnOnce(&[HistoryEvent]) -> T) -> T {
        f(&self.events.read())
    }

    /// Events of one call (zero-copy filtering)
    pub fn filter_call(&self, call: &str) -> Vec<HistoryEvent> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.call() == Some(call))
                .cloned()
                .collect()
        })
    }

    /// Count events matching a predicate (no allocation)
    pub fn count(&self, predicate: impl Fn(&HistoryEventKind) -> bool) -> usize {
        self.with_events(|events| events.iter().filter(|e| predicate(&e.kind)).count())
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    /// Milliseconds since the run started
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History")
            .field("len", &self.len())
            .field("elapsed_ms", &self.elapsed_ms())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_assigns_monotonic_ids() {
        let history = History::new();
        let a = history.record(HistoryEventKind::TimerStarted { duration_ms: 10 });
        let b = history.record(HistoryEventKind::TimerFired { duration_ms: 10 });
        assert_eq!((a, b), (0, 1));
        assert_eq!(history.len(), 2);
        assert!(format!("{history:?}").contains("len: 2"));
    }

    #[test]
    fn test_clones_share_events() {
        let history = History::new();
        let clone = history.clone();
        clone.record(HistoryEventKind::SignalReceived {
            name: "approve".into(),
        });
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_filter_call() {
        let history = History::new();
        history.record(HistoryEventKind::CallScheduled {
            call: "greet".into(),
            attempt: 1,
        });
        history.record(HistoryEventKind::CallScheduled {
            call: "other".into(),
            attempt: 1,
        });
        history.record(HistoryEventKind::CallCompleted {
            call: "greet".into(),
            duration_ms: 3,
        });
        assert_eq!(history.filter_call("greet").len(), 2);
        assert_eq!(
            history.count(|k| matches!(k, HistoryEventKind::CallScheduled { .. })),
            2
        );
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let history = History::new();
        history.record(HistoryEventKind::RunCompleted {
            output: Arc::new(json!({"ok": true})),
            total_duration_ms: 5,
        });
        let raw = history.to_json();
        assert_eq!(raw[0]["kind"]["type"], "run_completed");
        assert_eq!(raw[0]["kind"]["output"]["ok"], true);
    }
}
