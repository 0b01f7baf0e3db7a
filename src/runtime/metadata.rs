//! Task metadata: search attributes and call heartbeats
//!
//! ```yaml
//! metadata:
//!   heartbeat: PT30S
//!   searchAttributes:
//!     customer: ${ input.customer }
//! ```

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::context::ExecContext;
use crate::ast::{DurationSpec, Task};
use crate::error::{BraidError, Result};
use crate::store::ExecutionState;
use crate::substrate::HeartbeatGuard;
use crate::util::constants::MIN_HEARTBEAT_INTERVAL;

pub const HEARTBEAT_KEY: &str = "heartbeat";
pub const SEARCH_ATTRIBUTES_KEY: &str = "searchAttributes";

/// Interpolate metadata and hand search attributes to the sink
pub(crate) fn apply(ctx: &ExecContext, name: &str, task: &Task, state: &ExecutionState) -> Result<()> {
    if task.base.metadata.is_empty() {
        return Ok(());
    }
    let Some(raw) = task.base.metadata.get(SEARCH_ATTRIBUTES_KEY) else {
        return Ok(());
    };

    match ctx.evaluator().traverse_and_evaluate(raw.clone(), state)? {
        Value::Object(attributes) => {
            debug!(task = name, count = attributes.len(), "applying search attributes");
            ctx.metadata().apply_search_attributes(ctx, &attributes)
        }
        other => Err(BraidError::InvalidTask {
            task: name.to_string(),
            reason: format!(
                "metadata.{} must be a map, got {}",
                SEARCH_ATTRIBUTES_KEY,
                crate::ast::value_kind(&other)
            ),
        }),
    }
}

/// Heartbeat interval declared by a task; malformed values are ignored with a warning
pub(crate) fn heartbeat_interval(name: &str, task: &Task) -> Option<Duration> {
    let raw = task.base.metadata.get(HEARTBEAT_KEY)?;
    let interval = serde_json::from_value::<DurationSpec>(raw.clone())
        .map_err(|e| BraidError::InvalidDuration {
            value: raw.to_string(),
            reason: e.to_string(),
        })
        .and_then(|spec| spec.to_duration());

    match interval {
        Ok(interval) if interval.is_zero() => {
            warn!(task = name, "ignoring zero heartbeat interval");
            None
        }
        Ok(interval) => {
            if interval < MIN_HEARTBEAT_INTERVAL {
                warn!(
                    task = name,
                    interval_ms = interval.as_millis() as u64,
                    threshold_ms = MIN_HEARTBEAT_INTERVAL.as_millis() as u64,
                    "heartbeat interval below threshold, every beat is recorded"
                );
            }
            Some(interval)
        }
        Err(e) => {
            warn!(task = name, error = %e, "ignoring malformed heartbeat metadata");
            None
        }
    }
}

/// Register the task's heartbeat with the substrate, if it declares one
pub(crate) fn start_heartbeat(ctx: &ExecContext, name: &str, task: &Task) -> Option<HeartbeatGuard> {
    heartbeat_interval(name, task).map(|interval| ctx.substrate().register_heartbeat(ctx, interval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{TaskBase, TaskDefinition};
    use serde_json::json;

    fn with_metadata(metadata: Value) -> Task {
        Task {
            base: TaskBase {
                metadata: metadata.as_object().cloned().unwrap_or_default(),
                ..Default::default()
            },
            definition: TaskDefinition::Set(json!({})),
        }
    }

    #[test]
    fn test_heartbeat_iso() {
        let task = with_metadata(json!({"heartbeat": "PT30S"}));
        assert_eq!(heartbeat_interval("t", &task), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_heartbeat_inline_below_threshold_still_used() {
        let task = with_metadata(json!({"heartbeat": {"seconds": 2}}));
        assert_eq!(heartbeat_interval("t", &task), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_malformed_heartbeat_ignored() {
        let task = with_metadata(json!({"heartbeat": "soon"}));
        assert_eq!(heartbeat_interval("t", &task), None);
        let task = with_metadata(json!({}));
        assert_eq!(heartbeat_interval("t", &task), None);
    }
}
