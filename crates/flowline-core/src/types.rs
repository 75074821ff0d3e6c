use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Task type executed through the model invoker. Anything else is a no-op.
pub const LLM_TASK_TYPE: &str = "llm";

pub type WorkflowId = i64;
pub type TaskId = i64;

/// A persisted workflow together with the tasks derived from its description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// A persisted task row. `config` is stored verbatim and only read by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub workflow_id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub config: Option<String>,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_llm(&self) -> bool {
        self.task_type == LLM_TASK_TYPE
    }

    /// Interpret the stored config, falling back to an empty one.
    pub fn parsed_config(&self) -> TaskConfig {
        TaskConfig::parse(self.config.as_deref())
    }
}

/// A task derived from a node graph, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub order: i64,
    pub config: Value,
}

/// Typed view over a task's JSON config.
///
/// Every field is optional. Values of the wrong JSON type are treated as
/// absent instead of failing the whole config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskConfig {
    pub prompt: Option<String>,
    pub node_id: Option<Value>,
    pub node_data: NodeData,
    pub position: Option<Position>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeData {
    pub label: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl TaskConfig {
    /// Parse a raw config string. Missing or malformed JSON yields the default.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
            return Self::default();
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                tracing::warn!(error = %e, "Invalid task config, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        let node_data = obj
            .get("node_data")
            .and_then(Value::as_object)
            .map(|data| NodeData {
                label: data.get("label").and_then(Value::as_str).map(String::from),
                prompt: data.get("prompt").and_then(Value::as_str).map(String::from),
            })
            .unwrap_or_default();

        let position = obj.get("position").and_then(|p| {
            Some(Position {
                x: p.get("x")?.as_f64()?,
                y: p.get("y")?.as_f64()?,
            })
        });

        Self {
            prompt: obj.get("prompt").and_then(Value::as_str).map(String::from),
            node_id: obj.get("node_id").filter(|v| !v.is_null()).cloned(),
            node_data,
            position,
            max_tokens: obj
                .get("max_tokens")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok()),
            temperature: obj.get("temperature").and_then(Value::as_f64).map(|t| t as f32),
        }
    }
}

/// Parameters for a single model call.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeRequest {
    pub prompt: String,
    /// Identifier of the system prompt source (a file path for the HTTP client).
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Logical outcome of a model call. Transport failures are errors, not this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelResponse {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// One entry of an execution report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub task_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate result of running a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub results: Vec<TaskOutcome>,
    pub final_output: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_config() {
        let raw = json!({
            "prompt": "Process node: Summarize",
            "node_id": "node-2",
            "node_data": {"label": "Summarize", "prompt": "Summarize this", "color": "red"},
            "position": {"x": 120.0, "y": 40.5},
            "max_tokens": 256,
            "temperature": 0.2
        })
        .to_string();

        let config = TaskConfig::parse(Some(&raw));
        assert_eq!(config.prompt.as_deref(), Some("Process node: Summarize"));
        assert_eq!(config.node_id, Some(json!("node-2")));
        assert_eq!(config.node_data.label.as_deref(), Some("Summarize"));
        assert_eq!(config.node_data.prompt.as_deref(), Some("Summarize this"));
        assert_eq!(config.position, Some(Position { x: 120.0, y: 40.5 }));
        assert_eq!(config.max_tokens, Some(256));
        assert!((config.temperature.unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_parse_malformed_config_is_empty() {
        assert_eq!(TaskConfig::parse(Some("{not json")), TaskConfig::default());
        assert_eq!(TaskConfig::parse(Some("[1, 2]")), TaskConfig::default());
        assert_eq!(TaskConfig::parse(Some("")), TaskConfig::default());
        assert_eq!(TaskConfig::parse(None), TaskConfig::default());
    }

    #[test]
    fn test_wrong_field_types_are_absent() {
        let raw = r#"{"node_data": {"label": 7, "prompt": "Go"}, "max_tokens": "many", "position": {}}"#;
        let config = TaskConfig::parse(Some(raw));
        assert!(config.node_data.label.is_none());
        assert_eq!(config.node_data.prompt.as_deref(), Some("Go"));
        assert!(config.max_tokens.is_none());
        assert!(config.position.is_none());
    }

    #[test]
    fn test_task_outcome_serialization_skips_absent_fields() {
        let outcome = TaskOutcome {
            task_id: 3,
            task_name: "Greet".into(),
            result: None,
            error: Some("Model API error: 500 - boom".into()),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({"task_id": 3, "task_name": "Greet", "error": "Model API error: 500 - boom"})
        );
    }

    #[test]
    fn test_report_keeps_null_final_output() {
        let report = ExecutionReport {
            workflow_id: 1,
            workflow_name: "empty".into(),
            results: vec![],
            final_output: None,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["final_output"], Value::Null);
        assert_eq!(value["results"], json!([]));
    }
}
