//! Centralized constants for Braid runtime configuration
//!
//! All timeout and limit values in one place for easy tuning.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════
// Execution Timeouts
// ═══════════════════════════════════════════════════════════════

/// Default timeout for a single call (activity, http, rpc, process)
pub const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for establishing HTTP connections
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Heartbeat intervals below this are logged as a warning
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

// ═══════════════════════════════════════════════════════════════
// Retry
// ═══════════════════════════════════════════════════════════════

/// Attempts per call, first attempt included
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

pub const RETRY_INITIAL_INTERVAL: Duration = Duration::from_millis(100);

pub const RETRY_MAX_INTERVAL: Duration = Duration::from_secs(10);

pub const RETRY_BACKOFF: f64 = 2.0;

// ═══════════════════════════════════════════════════════════════
// Continue-as-new
// ═══════════════════════════════════════════════════════════════

/// History length at which the local substrate suggests continuing as new
pub const SUGGEST_CONTINUATION_AFTER: usize = 10_000;

/// Upper bound on restarts of one run (guards against a checkpoint loop)
pub const MAX_CONTINUATIONS: u32 = 1_000;

// ═══════════════════════════════════════════════════════════════
// Environment
// ═══════════════════════════════════════════════════════════════

/// Prefix of process environment variables exposed as `env`
pub const ENV_PREFIX: &str = "BRAID";

// ═══════════════════════════════════════════════════════════════
// HTTP Client Limits
// ═══════════════════════════════════════════════════════════════

/// Maximum number of HTTP redirects to follow when `redirect: true`
pub const REDIRECT_LIMIT: usize = 5;

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_positive() {
        assert!(CALL_TIMEOUT.as_secs() > 0);
        assert!(CONNECT_TIMEOUT.as_secs() > 0);
    }

    #[test]
    fn retry_interval_bounds_are_ordered() {
        assert!(RETRY_INITIAL_INTERVAL < RETRY_MAX_INTERVAL);
        assert!(RETRY_BACKOFF >= 1.0);
    }
}
