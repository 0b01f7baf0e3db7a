//! Evaluation wrappers - the replay boundary around expression evaluation
//!
//! Every evaluation runs as a thunk handed to the active wrapper. The default
//! runs it. [`RecordingWrapper`] memoizes results in order so a replayed run
//! sees exactly the values the first run produced (generated identifiers included).

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Result;

/// Intercepts each evaluation
pub trait EvaluationWrapper: Send + Sync {
    fn wrap(&self, expression: &str, thunk: &mut dyn FnMut() -> Result<Value>) -> Result<Value>;
}

/// Runs every thunk as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl EvaluationWrapper for PassThrough {
    fn wrap(&self, _expression: &str, thunk: &mut dyn FnMut() -> Result<Value>) -> Result<Value> {
        thunk()
    }
}

/// Records evaluation results once, replays them thereafter
///
/// Seeded with a previous recording, the first `n` evaluations return the
/// recorded values without running their thunks. Later evaluations run and
/// are appended to the recording.
#[derive(Debug, Default)]
pub struct RecordingWrapper {
    recorded: Mutex<Vec<Value>>,
    cursor: AtomicUsize,
}

impl RecordingWrapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay `recorded` before evaluating anything new
    pub fn replaying(recorded: Vec<Value>) -> Self {
        Self {
            recorded: Mutex::new(recorded),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn recorded(&self) -> Vec<Value> {
        self.recorded.lock().clone()
    }

    /// Number of evaluations observed so far (replayed + fresh)
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

impl EvaluationWrapper for RecordingWrapper {
    fn wrap(&self, _expression: &str, thunk: &mut dyn FnMut() -> Result<Value>) -> Result<Value> {
        let position = self.cursor.fetch_add(1, Ordering::SeqCst);
        if let Some(recorded) = self.recorded.lock().get(position) {
            return Ok(recorded.clone());
        }

        // Failed evaluations are not recorded: a replay re-runs them and fails the same way.
        let value = match thunk() {
            Ok(value) => value,
            Err(e) => {
                self.cursor.fetch_sub(1, Ordering::SeqCst);
                return Err(e);
            }
        };
        self.recorded.lock().push(value.clone());
        Ok(value)
    }
}

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════
