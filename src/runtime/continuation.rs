//! Continue-as-new checkpointing
//!
//! A long sequence restarts itself before its history grows unbounded. The
//! carried state remembers the child to restart at (`resume_marker`); the
//! restarted run skips every child before it.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::context::ExecContext;
use crate::error::{BraidError, Result};
use crate::store::ExecutionState;

/// A continuation is due when the substrate suggests one or history exceeds `max`
pub(crate) fn is_due(ctx: &ExecContext, max_history_length: usize) -> bool {
    let substrate = ctx.substrate();
    substrate.continuation_suggested(ctx)
        || (max_history_length > 0 && substrate.history_length(ctx) > max_history_length)
}

/// Wait for in-flight handlers, then ask the substrate to restart `entry_point`
/// at `child_id`
///
/// Always returns the error that carries the restart up the stack, or
/// [`BraidError::HandlersNotFinished`] when the wait itself fails.
pub(crate) async fn suspend(
    ctx: &ExecContext,
    entry_point: &str,
    child_id: &str,
    input: &Value,
    state: &mut ExecutionState,
) -> BraidError {
    let substrate = ctx.substrate();
    let handlers_done = || substrate.all_handlers_finished(ctx);
    if !handlers_done() {
        debug!(entry_point, resume_at = child_id, "waiting for handlers before restart");
    }
    if let Err(err) = substrate.await_condition(ctx, &handlers_done).await {
        warn!(entry_point, resume_at = child_id, error = %err, "handlers did not finish");
        return BraidError::HandlersNotFinished {
            entry_point: entry_point.to_string(),
            resume_marker: child_id.to_string(),
            reason: err.to_string(),
        };
    }

    info!(
        entry_point,
        resume_at = child_id,
        history = substrate.history_length(ctx),
        "continuing as new"
    );
    state.resume_marker = Some(child_id.to_string());
    substrate.request_continuation(ctx, entry_point, input.clone(), state.clone())
}

/// What a resumed run does with one child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResumeStep {
    /// Not resuming, or the marker was just reached
    Run,
    /// Before the marker: skipped entirely
    Skip,
    /// Before the marker but never-skip: executes for its side effects on the
    /// substrate (listeners, queries) and leaves no trace in the carried state
    Replay,
}

/// Decide how a sequence treats `child_id` while a resume marker is set
///
/// Only the sequence owning the marker (`owns_marker`, the entry point) clears
/// it once reached. Nested lists never hold the marker, so while it is set
/// every plain child of theirs is skipped.
pub(crate) fn resume_step(
    child_id: &str,
    never_skip: bool,
    owns_marker: bool,
    state: &mut ExecutionState,
) -> ResumeStep {
    let Some(marker) = state.resume_marker.as_deref() else {
        return ResumeStep::Run;
    };
    if owns_marker && marker == child_id {
        debug!(child = child_id, "reached resume marker");
        state.resume_marker = None;
        return ResumeStep::Run;
    }
    if never_skip {
        debug!(child = child_id, marker, "replaying never-skip child");
        ResumeStep::Replay
    } else {
        debug!(child = child_id, marker, "skipping towards resume marker");
        ResumeStep::Skip
    }
}

/// Unwrap the state carried by a continuation error
pub fn into_continuation(err: BraidError) -> Result<(String, Value, ExecutionState)> {
    match err {
        BraidError::ContinueAsNew {
            entry_point,
            input,
            state,
        } => Ok((entry_point, input, *state)),
        other => Err(other),
    }
}
