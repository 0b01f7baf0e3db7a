//! Task payloads - one struct per task variant
//!
//! - Composites: `ForTask`, `ForkSpec`, `SwitchCase`, `TryTask`
//! - Calls: `CallTask` (activity/http/grpc)
//! - Processes: `RunTask` (shell/script/container/workflow)
//! - Simple: `RaiseTask`, `ListenTask`, set maps, wait durations
//!
//! Call and run payloads round-trip through serde: their fields are interpolated
//! as JSON at execution time and deserialized again.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::task::{FlowDirective, TaskList};

// ═══════════════════════════════════════════════════════════════
// Composites
// ═══════════════════════════════════════════════════════════════

/// `for: { each, in, at }` + `while` + `do`
#[derive(Debug, Clone, Deserialize)]
pub struct ForTask {
    #[serde(rename = "for")]
    pub iteration: ForSpec,
    #[serde(rename = "while", default)]
    pub while_guard: Option<String>,
    #[serde(rename = "do")]
    pub body: TaskList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForSpec {
    /// Name of the value variable (default: `item`)
    #[serde(default)]
    pub each: Option<String>,
    /// Collection: expression string or literal
    #[serde(rename = "in")]
    pub source: Value,
    /// Name of the index/key variable (default: `index`)
    #[serde(default)]
    pub at: Option<String>,
}

impl ForSpec {
    pub fn item_var(&self) -> &str {
        self.each.as_deref().unwrap_or("item")
    }

    pub fn index_var(&self) -> &str {
        self.at.as_deref().unwrap_or("index")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForkSpec {
    #[serde(default)]
    pub compete: bool,
    pub branches: TaskList,
}

/// One `switch` entry: `- caseName: { when, then }`
#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub name: String,
    pub when: Option<String>,
    pub then: Option<FlowDirective>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SwitchCaseBody {
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default)]
    pub then: Option<FlowDirective>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TryTask {
    #[serde(rename = "try")]
    pub body: TaskList,
    #[serde(default)]
    pub catch: CatchSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatchSpec {
    /// Variable the caught error is bound to (default: `error`)
    #[serde(rename = "as", default)]
    pub binding: Option<String>,
    #[serde(rename = "do", default)]
    pub body: TaskList,
}

impl CatchSpec {
    pub fn error_var(&self) -> &str {
        self.binding.as_deref().unwrap_or("error")
    }
}

// ═══════════════════════════════════════════════════════════════
// Calls
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum CallTask {
    Activity(ActivityCall),
    Http(HttpCall),
    Grpc(GrpcCall),
}

impl CallTask {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Activity(_) => "activity",
            Self::Http(_) => "http",
            Self::Grpc(_) => "grpc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpCall {
    #[serde(default = "default_method")]
    pub method: String,
    pub endpoint: Endpoint,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default)]
    pub query: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub output: HttpOutput,
    #[serde(default)]
    pub redirect: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    Uri(String),
    Object { uri: String },
}

impl Endpoint {
    pub fn uri(&self) -> &str {
        match self {
            Self::Uri(uri) | Self::Object { uri } => uri,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpOutput {
    /// Parsed body (JSON, falling back to text)
    #[default]
    Content,
    /// `{ statusCode, headers, content }`
    Response,
    /// Base64 of the raw body
    Raw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrpcCall {
    pub service: GrpcService,
    pub method: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrpcService {
    pub name: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

// ═══════════════════════════════════════════════════════════════
// Processes
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTask {
    #[serde(flatten)]
    pub process: RunProcess,
    #[serde(rename = "await", default = "default_true")]
    pub await_completion: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunProcess {
    Shell(ShellProcess),
    Script(ScriptProcess),
    Container(ContainerProcess),
    Workflow(WorkflowProcess),
}

impl RunProcess {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Shell(_) => "shell",
            Self::Script(_) => "script",
            Self::Container(_) => "container",
            Self::Workflow(_) => "workflow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellProcess {
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default)]
    pub environment: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptProcess {
    pub language: ScriptLanguage,
    pub code: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default)]
    pub environment: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLanguage {
    #[serde(alias = "javascript")]
    Js,
    Python,
}

impl ScriptLanguage {
    /// Interpreter binary and file extension
    pub fn interpreter(&self) -> (&'static str, &'static str) {
        match self {
            Self::Js => ("node", "js"),
            Self::Python => ("python3", "py"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerProcess {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default)]
    pub environment: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowProcess {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

// ═══════════════════════════════════════════════════════════════
// Simple tasks
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaiseTask {
    pub error: RaiseError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaiseError {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub detail: String,
}

fn default_status() -> u16 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenTask {
    pub to: ListenTo,
}

/// Exactly one of `one`, `any`, `all`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListenTo {
    #[serde(default)]
    pub one: Option<EventFilter>,
    #[serde(default)]
    pub any: Vec<EventFilter>,
    #[serde(default)]
    pub all: Vec<EventFilter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    One,
    Any,
    All,
}

impl ListenTo {
    pub fn mode(&self) -> Option<ListenMode> {
        match (self.one.is_some(), self.any.is_empty(), self.all.is_empty()) {
            (true, true, true) => Some(ListenMode::One),
            (false, false, true) => Some(ListenMode::Any),
            (false, true, false) => Some(ListenMode::All),
            _ => None,
        }
    }

    pub fn events(&self) -> Vec<&EventFilter> {
        self.one
            .iter()
            .chain(self.any.iter())
            .chain(self.all.iter())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventFilter {
    pub with: ListenEvent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: ListenEventType,
    /// Query response (interpolated when registered)
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenEventType {
    Signal,
    Query,
    Update,
}
