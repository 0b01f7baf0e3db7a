// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Braid Error Types with Error Codes
//!
//! Error code ranges:
//! - BRAID-000-009: Workflow document errors
//! - BRAID-010-019: Build errors (fatal, surfaced before execution)
//! - BRAID-020-029: Expression/guard errors (never retryable)
//! - BRAID-030-039: Input validation errors (never retryable)
//! - BRAID-040-049: Call errors (retryable unless marked)
//! - BRAID-050-059: Flow errors
//! - BRAID-070-079: Raised errors
//! - BRAID-080-089: Continuation control
//! - BRAID-090-099: Cancellation
//! - BRAID-100-109: Config/IO errors

use miette::Diagnostic;
use serde_json::{json, Value};
use thiserror::Error;

use crate::ast::schema_validator::SchemaViolation;
use crate::store::ExecutionState;

pub type Result<T> = std::result::Result<T, BraidError>;

/// Format schema violations for display
fn format_violations(violations: &[SchemaViolation]) -> String {
    match violations {
        [] => "no violations".to_string(),
        [single] => format!("[{}] {}", single.path, single.message),
        many => format!(
            "{} violations: {}",
            many.len(),
            many.iter()
                .map(|v| format!("[{}] {}", v.path, v.message))
                .collect::<Vec<_>>()
                .join("; ")
        ),
    }
}

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
#[diagnostic(url(docsrs))]
pub enum BraidError {
    // ═══════════════════════════════════════════
    // WORKFLOW ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[BRAID-001] Failed to parse workflow: {details}")]
    #[diagnostic(
        code(braid::parse_error),
        help("Check YAML syntax: indentation and quoting")
    )]
    ParseError { details: String },

    #[error("[BRAID-002] Workflow file not found: {path}")]
    #[diagnostic(code(braid::workflow_not_found), help("Check the file path exists"))]
    WorkflowNotFound { path: String },

    #[error("[BRAID-003] Invalid workflow document: {reason}")]
    #[diagnostic(code(braid::invalid_document))]
    InvalidDocument { reason: String },

    #[error("[BRAID-004] YAML parse error: {0}")]
    #[diagnostic(code(braid::yaml_parse))]
    YamlParse(#[from] serde_yaml::Error),

    // ═══════════════════════════════════════════
    // BUILD ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[BRAID-010] Task '{task}' uses unsupported variant '{tag}'")]
    #[diagnostic(
        code(braid::unsupported_task),
        help("Register a builder for this variant or use a built-in task kind")
    )]
    UnsupportedTask { task: String, tag: String },

    #[error("[BRAID-011] Duplicate task name '{name}' in '{scope}'")]
    #[diagnostic(code(braid::duplicate_task))]
    DuplicateTaskName { name: String, scope: String },

    #[error("[BRAID-012] Task '{task}' flows to unknown target '{target}'")]
    #[diagnostic(code(braid::missing_flow_target))]
    MissingFlowTarget { task: String, target: String },

    #[error("[BRAID-013] Switch '{task}' has more than one default case")]
    #[diagnostic(code(braid::duplicate_switch_default))]
    DuplicateSwitchDefault { task: String },

    #[error("[BRAID-014] Sub-graph '{name}' is defined twice")]
    #[diagnostic(code(braid::duplicate_sub_graph))]
    DuplicateSubGraph { name: String },

    #[error("[BRAID-015] Task '{task}' references unknown sub-graph '{name}'")]
    #[diagnostic(code(braid::unknown_sub_graph))]
    UnknownSubGraph { task: String, name: String },

    #[error("[BRAID-016] Task '{task}' is misconfigured: {reason}")]
    #[diagnostic(code(braid::invalid_task))]
    InvalidTask { task: String, reason: String },

    // ═══════════════════════════════════════════
    // EXPRESSION ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[BRAID-020] Failed to evaluate '{expression}': {reason}")]
    #[diagnostic(
        code(braid::expression_failed),
        help("Check the JEXL syntax and that the referenced input, data or env fields exist")
    )]
    ExpressionFailed { expression: String, reason: String },

    #[error("[BRAID-021] Guard '{guard}' must evaluate to a boolean, got {found}")]
    #[diagnostic(code(braid::guard_not_boolean))]
    GuardNotBoolean { guard: String, found: String },

    #[error("[BRAID-022] Invalid duration '{value}': {reason}")]
    #[diagnostic(code(braid::invalid_duration))]
    InvalidDuration { value: String, reason: String },

    // ═══════════════════════════════════════════
    // VALIDATION ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[BRAID-030] Input of '{task}' failed validation: {}", format_violations(.violations))]
    #[diagnostic(code(braid::input_validation))]
    InputValidation {
        task: String,
        violations: Vec<SchemaViolation>,
    },

    #[error("[BRAID-031] Invalid JSON schema: {reason}")]
    #[diagnostic(code(braid::invalid_schema))]
    InvalidSchema { reason: String },

    // ═══════════════════════════════════════════
    // CALL ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[BRAID-040] Call '{call}' failed: {reason}")]
    #[diagnostic(code(braid::call_failed))]
    CallFailed {
        call: String,
        reason: String,
        retryable: bool,
    },

    #[error("[BRAID-041] HTTP {status} from {endpoint}")]
    #[diagnostic(code(braid::http_status))]
    HttpStatus { endpoint: String, status: u16 },

    #[error("[BRAID-042] Command '{command}' exited with {}: {stderr}", .code.map_or("signal".to_string(), |c| c.to_string()))]
    #[diagnostic(code(braid::process_exit))]
    ProcessExit {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("[BRAID-043] No handler registered for '{name}'")]
    #[diagnostic(
        code(braid::handler_not_found),
        help("Register the activity or RPC handler on the substrate before running")
    )]
    HandlerNotFound { name: String },

    #[error("[BRAID-044] Call '{call}' timed out after {timeout_ms}ms")]
    #[diagnostic(code(braid::call_timeout))]
    CallTimeout { call: String, timeout_ms: u64 },

    #[error("[BRAID-045] Sub-graph '{name}' is not registered")]
    #[diagnostic(code(braid::sub_graph_not_found))]
    SubGraphNotFound { name: String },

    #[error("[BRAID-046] Failed to spawn '{command}': {reason}")]
    #[diagnostic(code(braid::process_spawn))]
    ProcessSpawn { command: String, reason: String },

    // ═══════════════════════════════════════════
    // FLOW ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[BRAID-050] Next target specified but not found: {target}")]
    #[diagnostic(
        code(braid::flow_target_not_found),
        help("Flow targets only jump forward within the same task list")
    )]
    FlowTargetNotFound { target: String },

    #[error("[BRAID-051] Task '{task}' cannot iterate over {found}")]
    #[diagnostic(
        code(braid::not_iterable),
        help("'for.in' must evaluate to an object, an array or a non-negative integer")
    )]
    NotIterable { task: String, found: String },

    // ═══════════════════════════════════════════
    // RAISED ERRORS (070-079)
    // ═══════════════════════════════════════════
    #[error("[BRAID-070] {title}: {detail}")]
    #[diagnostic(code(braid::raised))]
    Raised {
        error_type: String,
        status: u16,
        title: String,
        detail: String,
    },

    // ═══════════════════════════════════════════
    // CONTINUATION CONTROL (080-089)
    // ═══════════════════════════════════════════
    /// Not a failure: asks the substrate to restart `entry_point` with a carried state.
    #[error("[BRAID-080] Continue-as-new requested for '{entry_point}'")]
    #[diagnostic(code(braid::continue_as_new))]
    ContinueAsNew {
        entry_point: String,
        input: Value,
        state: Box<ExecutionState>,
    },

    #[error("[BRAID-081] Continuation failed: {reason}")]
    #[diagnostic(code(braid::continuation_failed))]
    ContinuationFailed { reason: String },

    /// The restart was abandoned while waiting for in-flight handlers. Fatal to
    /// this attempt; `resume_marker` is where the restart would have resumed.
    #[error("[BRAID-082] Handlers of '{entry_point}' did not finish before restarting at '{resume_marker}': {reason}")]
    #[diagnostic(code(braid::handlers_not_finished))]
    HandlersNotFinished {
        entry_point: String,
        resume_marker: String,
        reason: String,
    },

    // ═══════════════════════════════════════════
    // CANCELLATION (090-099)
    // ═══════════════════════════════════════════
    #[error("[BRAID-090] Scope '{scope}' was cancelled")]
    #[diagnostic(code(braid::cancelled))]
    Cancelled { scope: String },

    #[error("[BRAID-091] Workflow '{workflow}' exceeded its timeout of {timeout_ms}ms")]
    #[diagnostic(code(braid::run_timeout))]
    RunTimeout { workflow: String, timeout_ms: u64 },

    // ═══════════════════════════════════════════
    // CONFIG / IO ERRORS (100-109)
    // ═══════════════════════════════════════════
    #[error("[BRAID-100] Configuration error: {reason}")]
    #[diagnostic(
        code(braid::config_error),
        help("Check ~/.config/braid/config.toml and BRAID_* environment variables")
    )]
    ConfigError { reason: String },

    #[error("[BRAID-101] IO error: {0}")]
    #[diagnostic(code(braid::io))]
    Io(#[from] std::io::Error),

    #[error("[BRAID-102] JSON error: {0}")]
    #[diagnostic(code(braid::json))]
    Json(#[from] serde_json::Error),
}

impl BraidError {
    /// Get the error code (e.g., "BRAID-001")
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "BRAID-001",
            Self::WorkflowNotFound { .. } => "BRAID-002",
            Self::InvalidDocument { .. } => "BRAID-003",
            Self::YamlParse(_) => "BRAID-004",
            Self::UnsupportedTask { .. } => "BRAID-010",
            Self::DuplicateTaskName { .. } => "BRAID-011",
            Self::MissingFlowTarget { .. } => "BRAID-012",
            Self::DuplicateSwitchDefault { .. } => "BRAID-013",
            Self::DuplicateSubGraph { .. } => "BRAID-014",
            Self::UnknownSubGraph { .. } => "BRAID-015",
            Self::InvalidTask { .. } => "BRAID-016",
            Self::ExpressionFailed { .. } => "BRAID-020",
            Self::GuardNotBoolean { .. } => "BRAID-021",
            Self::InvalidDuration { .. } => "BRAID-022",
            Self::InputValidation { .. } => "BRAID-030",
            Self::InvalidSchema { .. } => "BRAID-031",
            Self::CallFailed { .. } => "BRAID-040",
            Self::HttpStatus { .. } => "BRAID-041",
            Self::ProcessExit { .. } => "BRAID-042",
            Self::HandlerNotFound { .. } => "BRAID-043",
            Self::CallTimeout { .. } => "BRAID-044",
            Self::SubGraphNotFound { .. } => "BRAID-045",
            Self::ProcessSpawn { .. } => "BRAID-046",
            Self::FlowTargetNotFound { .. } => "BRAID-050",
            Self::NotIterable { .. } => "BRAID-051",
            Self::Raised { .. } => "BRAID-070",
            Self::ContinueAsNew { .. } => "BRAID-080",
            Self::ContinuationFailed { .. } => "BRAID-081",
            Self::HandlersNotFinished { .. } => "BRAID-082",
            Self::Cancelled { .. } => "BRAID-090",
            Self::RunTimeout { .. } => "BRAID-091",
            Self::ConfigError { .. } => "BRAID-100",
            Self::Io(_) => "BRAID-101",
            Self::Json(_) => "BRAID-102",
        }
    }

    /// Whether a substrate may retry the failed call.
    ///
    /// Expression, validation and build errors are never retryable:
    /// retrying them cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CallFailed { retryable, .. } => *retryable,
            Self::HttpStatus { status, .. } => *status >= 500,
            Self::ProcessExit { .. } | Self::CallTimeout { .. } | Self::Io(_) => true,
            _ => false,
        }
    }

    /// Cooperative cancellation surfaced as an error value
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Continue-as-new request, or a restart that could not quiesce
    pub fn is_continuation(&self) -> bool {
        matches!(
            self,
            Self::ContinueAsNew { .. } | Self::HandlersNotFinished { .. }
        )
    }

    /// Errors raised before any task runs
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedTask { .. }
                | Self::DuplicateTaskName { .. }
                | Self::MissingFlowTarget { .. }
                | Self::DuplicateSwitchDefault { .. }
                | Self::DuplicateSubGraph { .. }
                | Self::UnknownSubGraph { .. }
                | Self::InvalidTask { .. }
        )
    }

    /// Structured view bound into catch scopes as `data.<as>`
    pub fn to_value(&self) -> Value {
        match self {
            Self::Raised {
                error_type,
                status,
                title,
                detail,
            } => json!({
                "type": error_type,
                "status": status,
                "title": title,
                "detail": detail,
            }),
            Self::HttpStatus { status, .. } => json!({
                "type": self.code(),
                "status": status,
                "title": "HTTP call failed",
                "detail": self.to_string(),
            }),
            other => json!({
                "type": other.code(),
                "status": 500,
                "title": other.title(),
                "detail": other.to_string(),
            }),
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::ExpressionFailed { .. } | Self::GuardNotBoolean { .. } => "Expression error",
            Self::InputValidation { .. } => "Validation error",
            Self::CallFailed { .. }
            | Self::ProcessExit { .. }
            | Self::HandlerNotFound { .. }
            | Self::CallTimeout { .. }
            | Self::ProcessSpawn { .. } => "Call failed",
            Self::FlowTargetNotFound { .. } | Self::NotIterable { .. } => "Flow error",
            _ => "Runtime error",
        }
    }
}

impl FixSuggestion for BraidError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            BraidError::ParseError { .. } | BraidError::YamlParse(_) => {
                Some("Check YAML syntax: indentation and quoting")
            }
            BraidError::WorkflowNotFound { .. } => Some("Check the file path exists"),
            BraidError::UnsupportedTask { .. } => {
                Some("Use one of: do, for, fork, switch, try, call, run, wait, raise, listen, set")
            }
            BraidError::DuplicateTaskName { .. } => {
                Some("Task names must be unique within their task list")
            }
            BraidError::MissingFlowTarget { .. } => {
                Some("'then' must be continue, end, exit or the name of a sibling task")
            }
            BraidError::DuplicateSwitchDefault { .. } => {
                Some("Only one switch case may omit 'when'")
            }
            BraidError::UnknownSubGraph { .. } | BraidError::SubGraphNotFound { .. } => {
                Some("Switch and run.workflow targets must name a 'do' task or the workflow itself")
            }
            BraidError::ExpressionFailed { .. } => {
                Some("Check the expression syntax and that referenced fields exist")
            }
            BraidError::GuardNotBoolean { .. } => {
                Some("Guards must evaluate to true/false, \"true\" or \"1\"")
            }
            BraidError::InvalidDuration { .. } => {
                Some("Use ISO 8601 (PT30S, P1DT2H) or {hours, minutes, seconds}")
            }
            BraidError::InputValidation { .. } => Some("Check the input against the task schema"),
            BraidError::HandlerNotFound { .. } => {
                Some("Register the handler on the substrate before running the workflow")
            }
            BraidError::CallTimeout { .. } => Some("Increase timeout.after on the task"),
            BraidError::FlowTargetNotFound { .. } => {
                Some("Flow targets only jump forward within the same task list")
            }
            BraidError::NotIterable { .. } => {
                Some("'for.in' must evaluate to an object, an array or a non-negative integer")
            }
            BraidError::ConfigError { .. } => {
                Some("Check ~/.config/braid/config.toml and BRAID_* environment variables")
            }
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_prefixed() {
        let err = BraidError::FlowTargetNotFound {
            target: "later".into(),
        };
        assert_eq!(err.code(), "BRAID-050");
        assert!(err.to_string().starts_with("[BRAID-050]"));
        assert!(err.to_string().contains("later"));
    }

    #[test]
    fn test_unfinished_handlers_keep_marker_and_are_not_retryable() {
        let err = BraidError::HandlersNotFinished {
            entry_point: "root".into(),
            resume_marker: "after-2".into(),
            reason: "cancelled".into(),
        };
        assert_eq!(err.code(), "BRAID-082");
        assert!(err.to_string().contains("after-2"));
        assert!(err.is_continuation());
        assert!(!err.is_retryable());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_expression_and_validation_errors_not_retryable() {
        let expr = BraidError::ExpressionFailed {
            expression: "${ .x }".into(),
            reason: "parse".into(),
        };
        let guard = BraidError::GuardNotBoolean {
            guard: "${ 1 }".into(),
            found: "number".into(),
        };
        let validation = BraidError::InputValidation {
            task: "t".into(),
            violations: vec![],
        };
        assert!(!expr.is_retryable());
        assert!(!guard.is_retryable());
        assert!(!validation.is_retryable());
    }

    #[test]
    fn test_http_status_retryable_only_for_server_errors() {
        let client = BraidError::HttpStatus {
            endpoint: "http://x".into(),
            status: 404,
        };
        let server = BraidError::HttpStatus {
            endpoint: "http://x".into(),
            status: 503,
        };
        assert!(!client.is_retryable());
        assert!(server.is_retryable());
    }

    #[test]
    fn test_raised_error_value_shape() {
        let err = BraidError::Raised {
            error_type: "https://example.com/errors/denied".into(),
            status: 403,
            title: "Denied".into(),
            detail: "not allowed".into(),
        };
        let value = err.to_value();
        assert_eq!(value["status"], 403);
        assert_eq!(value["title"], "Denied");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_violations_format() {
        let err = BraidError::InputValidation {
            task: "greet".into(),
            violations: vec![
                SchemaViolation {
                    path: "/name".into(),
                    message: "is required".into(),
                },
                SchemaViolation {
                    path: "/age".into(),
                    message: "must be integer".into(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 violations"));
        assert!(msg.contains("[/name] is required"));
    }

    #[test]
    fn test_fix_suggestion_present_for_build_errors() {
        let err = BraidError::UnsupportedTask {
            task: "x".into(),
            tag: "emit".into(),
        };
        assert!(err.is_build_error());
        assert!(err.fix_suggestion().is_some());
    }
}
