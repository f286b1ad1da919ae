use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ToolCallId;

/// Lifecycle of a single tool invocation as seen by the UI.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallState {
    Pending,
    Error,
    Success,
}

/// Canonical shape of one tool invocation inside a turn.
///
/// Backends emit tool calls under several field spellings; everything is
/// funneled through [`ToolInvocation::from_value`] at the ingestion boundary
/// so the grouping pass only ever sees this struct.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolInvocation {
    #[serde(default)]
    pub id: ToolCallId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default = "ToolCallState::pending")]
    pub state: ToolCallState,
}

impl ToolCallState {
    fn pending() -> Self {
        Self::Pending
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" | "running" | "in_progress" => Some(Self::Pending),
            "error" | "failed" => Some(Self::Error),
            "success" | "complete" | "completed" | "done" => Some(Self::Success),
            _ => None,
        }
    }
}

impl ToolInvocation {
    pub fn new(id: ToolCallId, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id,
            name: name.into(),
            arguments,
            result: None,
            state: ToolCallState::Pending,
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self.state = ToolCallState::Success;
        self
    }

    /// Whether this observation should replace an earlier one with the same
    /// id: only when it carries a non-empty result or has left `pending`.
    pub fn supersedes(&self, _existing: &ToolInvocation) -> bool {
        self.result.as_deref().is_some_and(|r| !r.is_empty())
            || self.state != ToolCallState::Pending
    }

    /// Normalize one raw tool-call value into the canonical shape.
    ///
    /// Accepted aliases: id under `id`/`tool_call_id`/`call_id`, name under
    /// `name`/`tool`/`function.name`/`call.name`, arguments under
    /// `arguments`/`args`/`input`/`function.arguments` (object or a
    /// JSON-encoded string), result under `result`/`output`, state under
    /// `state`/`status`. A missing id is synthesized; a missing name becomes
    /// the empty string. Returns `None` only for non-object values.
    pub fn from_value(v: &Value) -> Option<ToolInvocation> {
        let obj = v.as_object()?;

        let id = first_str(obj, &["id", "tool_call_id", "call_id"])
            .map(ToolCallId::from_raw)
            .unwrap_or_default();

        let name = first_str(obj, &["name", "tool"])
            .or_else(|| nested_str(obj, "function", "name"))
            .or_else(|| nested_str(obj, "call", "name"))
            .unwrap_or_default();

        let arguments = first_value(obj, &["arguments", "args", "input"])
            .or_else(|| obj.get("function").and_then(|f| f.get("arguments")).cloned())
            .map(coerce_arguments)
            .unwrap_or(Value::Null);

        let result = first_str(obj, &["result", "output"]).filter(|r| !r.is_empty());

        let state = first_str(obj, &["state", "status"])
            .as_deref()
            .and_then(ToolCallState::parse)
            .unwrap_or(if result.is_some() {
                ToolCallState::Success
            } else {
                ToolCallState::Pending
            });

        Some(ToolInvocation {
            id,
            name,
            arguments,
            result,
            state,
        })
    }

    /// Normalize a raw array of tool-call values, dropping non-objects.
    pub fn normalize_all(raw: &Value) -> Vec<ToolInvocation> {
        raw.as_array()
            .map(|items| items.iter().filter_map(Self::from_value).collect())
            .unwrap_or_default()
    }
}

fn first_str(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_owned)
}

fn first_value(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|k| obj.get(*k)).cloned()
}

fn nested_str(obj: &serde_json::Map<String, Value>, outer: &str, inner: &str) -> Option<String> {
    obj.get(outer)?.get(inner)?.as_str().map(str::to_owned)
}

/// Arguments sometimes arrive as a JSON-encoded string; decode when possible.
fn coerce_arguments(v: Value) -> Value {
    match v {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    }
}
