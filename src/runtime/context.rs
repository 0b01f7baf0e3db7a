//! ExecContext - what every executable receives besides its state
//!
//! Cheap to clone: substrate and run info are Arc'd, the evaluator is an Arc
//! wrapper and the cancellation token is reference counted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::binding::Evaluator;
use crate::error::{BraidError, Result};
use crate::event::History;
use crate::substrate::{MetadataSink, Substrate};

/// Identity of the run an executable belongs to
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub workflow_id: String,
    pub run_id: String,
    /// Sub-graph the run started from (target of continue-as-new)
    pub entry_point: String,
    pub history: History,
    /// Handlers this run started and has not seen finish
    pub handlers: InFlight,
}

impl RunInfo {
    pub fn new(workflow_id: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
            entry_point: entry_point.into(),
            history: History::new(),
            handlers: InFlight::default(),
        }
    }
}

/// Counter of in-flight handlers (detached sub-graphs)
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    /// Hold one slot until the returned guard drops
    pub fn enter(&self) -> InFlightGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(&self.0))
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.count() == 0
    }
}

#[derive(Debug)]
pub struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct ExecContext {
    substrate: Arc<dyn Substrate>,
    metadata: Arc<dyn MetadataSink>,
    evaluator: Evaluator,
    cancel: CancellationToken,
    run: Arc<RunInfo>,
}

impl std::fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecContext")
            .field("run", &self.run)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ExecContext {
    pub fn new(
        substrate: Arc<dyn Substrate>,
        metadata: Arc<dyn MetadataSink>,
        evaluator: Evaluator,
        run: RunInfo,
    ) -> Self {
        Self {
            substrate,
            metadata,
            evaluator,
            cancel: CancellationToken::new(),
            run: Arc::new(run),
        }
    }

    /// Replace the root cancellation token (e.g. one tied to Ctrl-C)
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn substrate(&self) -> &dyn Substrate {
        self.substrate.as_ref()
    }

    pub fn metadata(&self) -> &dyn MetadataSink {
        self.metadata.as_ref()
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn run(&self) -> &RunInfo {
        &self.run
    }

    pub fn history(&self) -> &History {
        &self.run.history
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Same run, cancellable on its own (and with its parent)
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }

    /// Context for a fresh run of the same substrate (continue-as-new)
    pub fn for_run(&self, run: RunInfo) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            run: Arc::new(run),
            ..self.clone()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// `Err(Cancelled)` once this context is cancelled
    pub fn ensure_active(&self, scope: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(BraidError::Cancelled {
                scope: scope.to_string(),
            })
        } else {
            Ok(())
        }
    }
}
