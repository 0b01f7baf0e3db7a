//! Task graph nodes
//!
//! A task list is an ordered sequence of single-key maps:
//!
//! ```yaml
//! do:
//!   - greet:
//!       set:
//!         message: ${ "hello " + input.name }
//!   - shout:
//!       if: ${ input.loud == true }
//!       call: activity
//!       with:
//!         name: upper
//!         arguments:
//!           - ${ data.greet.message }
//! ```
//!
//! Every node is a [`Task`]: a [`TaskBase`] shared by all variants plus a
//! [`TaskDefinition`] selected by the variant key present in the node.

use std::fmt;
use std::sync::Arc;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::action::{
    ActivityCall, CallTask, ForTask, ForkSpec, GrpcCall, HttpCall, ListenTask, RaiseTask,
    RunTask, SwitchCase, SwitchCaseBody, TryTask,
};
use super::duration::DurationSpec;

/// Keys shared by every task variant
const BASE_KEYS: &[&str] = &["if", "then", "input", "export", "timeout", "metadata"];

/// Variant keys in detection order: `for` and `try` also carry `do`/`catch`
const VARIANT_KEYS: &[&str] = &[
    "for", "fork", "switch", "try", "call", "run", "wait", "raise", "listen", "set", "do",
];

/// Keys that belong to a variant body rather than naming a variant
const VARIANT_COMPANIONS: &[&str] = &["while", "catch", "with"];

// ═══════════════════════════════════════════════════════════════
// TaskList / TaskItem
// ═══════════════════════════════════════════════════════════════

/// Ordered, named task list
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct TaskList(pub Vec<TaskItem>);

impl TaskList {
    pub fn iter(&self) -> std::slice::Iter<'_, TaskItem> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|item| item.name == name)
    }
}

impl<'a> IntoIterator for &'a TaskList {
    type Item = &'a TaskItem;
    type IntoIter = std::slice::Iter<'a, TaskItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// `{ <name>: <task> }`
#[derive(Debug, Clone)]
pub struct TaskItem {
    pub name: String,
    pub task: Arc<Task>,
}

impl<'de> Deserialize<'de> for TaskItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        let (name, body) = single_entry(map).map_err(de::Error::custom)?;
        let body = match body {
            Value::Object(body) => body,
            other => {
                return Err(de::Error::custom(format!(
                    "task '{name}' must be a map, got {}",
                    value_kind(&other)
                )))
            }
        };
        let task = Task::from_map(&name, body).map_err(de::Error::custom)?;
        Ok(Self {
            name,
            task: Arc::new(task),
        })
    }
}

fn single_entry(map: Map<String, Value>) -> Result<(String, Value), String> {
    if map.len() != 1 {
        let keys: Vec<_> = map.keys().cloned().collect();
        return Err(format!(
            "expected exactly one named entry per list item, found [{}]",
            keys.join(", ")
        ));
    }
    map.into_iter()
        .next()
        .ok_or_else(|| "empty list item".to_string())
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ═══════════════════════════════════════════════════════════════
// Task
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Task {
    pub base: TaskBase,
    pub definition: TaskDefinition,
}

impl Task {
    /// Variant tag used by the builder registry
    pub fn tag(&self) -> &str {
        self.definition.tag()
    }

    fn from_map(name: &str, mut body: Map<String, Value>) -> Result<Self, String> {
        let base_fields: Map<String, Value> = BASE_KEYS
            .iter()
            .filter_map(|k| body.remove(*k).map(|v| ((*k).to_string(), v)))
            .collect();
        let base: TaskBase = serde_json::from_value(Value::Object(base_fields))
            .map_err(|e| format!("task '{name}': {e}"))?;

        let definition = TaskDefinition::from_map(name, body)?;
        Ok(Self { base, definition })
    }
}

/// Fields shared by every task variant
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskBase {
    /// Guard expression (`if`)
    #[serde(rename = "if", default, deserialize_with = "scalar_string")]
    pub guard: Option<String>,
    #[serde(default)]
    pub then: Option<FlowDirective>,
    #[serde(default)]
    pub input: Option<InputSpec>,
    #[serde(default)]
    pub export: Option<ExportSpec>,
    #[serde(default)]
    pub timeout: Option<TimeoutSpec>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Guards may be written as YAML booleans (`if: false`)
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "guard must be a string or boolean, got {}",
            value_kind(&other)
        ))),
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct InputSpec {
    #[serde(default)]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExportSpec {
    /// Expression or structure evaluated into `state.output`
    #[serde(rename = "as")]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TimeoutSpec {
    pub after: DurationSpec,
}

// ═══════════════════════════════════════════════════════════════
// FlowDirective
// ═══════════════════════════════════════════════════════════════

/// What runs after a task (`then`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlowDirective {
    Continue,
    /// `end` or `exit`: stop the enclosing sequence successfully
    Terminate,
    Target(String),
}

impl From<String> for FlowDirective {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "continue" => Self::Continue,
            "end" | "exit" => Self::Terminate,
            _ => Self::Target(raw),
        }
    }
}

impl fmt::Display for FlowDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => f.write_str("continue"),
            Self::Terminate => f.write_str("end"),
            Self::Target(name) => f.write_str(name),
        }
    }
}

impl<'de> Deserialize<'de> for FlowDirective {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

impl Serialize for FlowDirective {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ═══════════════════════════════════════════════════════════════
// TaskDefinition
// ═══════════════════════════════════════════════════════════════

/// Variant payload, keyed by tag
#[derive(Debug, Clone)]
pub enum TaskDefinition {
    Do(TaskList),
    For(ForTask),
    Fork(ForkSpec),
    Switch(Vec<SwitchCase>),
    Try(TryTask),
    Call(CallTask),
    Run(RunTask),
    Wait(DurationSpec),
    Raise(RaiseTask),
    Listen(ListenTask),
    /// Map (or expression) to evaluate
    Set(Value),
    /// Unknown tag, resolved (or rejected) by the builder registry
    Other { tag: String, body: Value },
}

impl TaskDefinition {
    pub fn tag(&self) -> &str {
        match self {
            Self::Do(_) => "do",
            Self::For(_) => "for",
            Self::Fork(_) => "fork",
            Self::Switch(_) => "switch",
            Self::Try(_) => "try",
            Self::Call(_) => "call",
            Self::Run(_) => "run",
            Self::Wait(_) => "wait",
            Self::Raise(_) => "raise",
            Self::Listen(_) => "listen",
            Self::Set(_) => "set",
            Self::Other { tag, .. } => tag,
        }
    }

    fn from_map(name: &str, mut body: Map<String, Value>) -> Result<Self, String> {
        let err = |e: serde_json::Error| format!("task '{name}': {e}");

        let Some(tag) = VARIANT_KEYS.iter().find(|k| body.contains_key(**k)) else {
            let unknown = body
                .keys()
                .find(|k| !VARIANT_COMPANIONS.contains(&k.as_str()))
                .cloned();
            return match unknown {
                Some(tag) => {
                    let payload = body.remove(&tag).unwrap_or(Value::Null);
                    Ok(Self::Other { tag, body: payload })
                }
                None => Err(format!("task '{name}' does not define an action")),
            };
        };

        let definition = match *tag {
            "for" => Self::For(serde_json::from_value(Value::Object(body)).map_err(err)?),
            "try" => Self::Try(serde_json::from_value(Value::Object(body)).map_err(err)?),
            "fork" => Self::Fork(take(&mut body, "fork", name)?),
            "switch" => {
                let raw: Vec<Map<String, Value>> = take(&mut body, "switch", name)?;
                let cases = raw
                    .into_iter()
                    .map(|entry| {
                        let (case_name, case_body) = single_entry(entry)?;
                        let case: SwitchCaseBody = serde_json::from_value(case_body)
                            .map_err(|e| format!("switch case '{case_name}': {e}"))?;
                        Ok(SwitchCase {
                            name: case_name,
                            when: case.when,
                            then: case.then,
                        })
                    })
                    .collect::<Result<Vec<_>, String>>()?;
                Self::Switch(cases)
            }
            "call" => {
                let kind: String = take(&mut body, "call", name)?;
                let with = body.remove("with").unwrap_or(Value::Object(Map::new()));
                let call = match kind.as_str() {
                    "activity" => {
                        CallTask::Activity(serde_json::from_value::<ActivityCall>(with).map_err(err)?)
                    }
                    "http" => CallTask::Http(serde_json::from_value::<HttpCall>(with).map_err(err)?),
                    "grpc" => CallTask::Grpc(serde_json::from_value::<GrpcCall>(with).map_err(err)?),
                    _ => {
                        return Ok(Self::Other {
                            tag: format!("call.{kind}"),
                            body: with,
                        })
                    }
                };
                Self::Call(call)
            }
            "run" => Self::Run(take::<RunTask>(&mut body, "run", name)?),
            "wait" => Self::Wait(take(&mut body, "wait", name)?),
            "raise" => Self::Raise(take::<RaiseTask>(&mut body, "raise", name)?),
            "listen" => Self::Listen(take::<ListenTask>(&mut body, "listen", name)?),
            "set" => Self::Set(body.remove("set").unwrap_or(Value::Null)),
            _ => Self::Do(take(&mut body, "do", name)?),
        };
        Ok(definition)
    }
}

fn take<T: serde::de::DeserializeOwned>(
    body: &mut Map<String, Value>,
    key: &str,
    name: &str,
) -> Result<T, String> {
    let value = body.remove(key).unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| format!("task '{name}' ({key}): {e}"))
}

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════
