//! Node-graph metadata embedded in a workflow description.
//!
//! A description is free text, but the editor stores a JSON object of the
//! form `{"nodes": [...]}` in it. Everything that reads that overload goes
//! through [`extract`], so the rest of the crate only sees [`NodeGraph`].
//!
//! Parsing is best effort: a description that is not a JSON object simply has
//! no graph, and never produces an error.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::types::{TaskSpec, LLM_TASK_TYPE};

/// Node type that supplies the workflow's initial input.
pub const START_NODE_TYPE: &str = "startNode";
/// Node type that becomes an LLM task.
pub const MODEL_NODE_TYPE: &str = "modelNode";

/// One entry of the `nodes` array.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    /// Position in the original `nodes` array.
    pub index: usize,
    pub id: Option<Value>,
    pub node_type: Option<String>,
    pub data: Map<String, Value>,
    pub position: Option<Value>,
}

impl NodeSpec {
    fn from_value(index: usize, value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            index,
            id: obj.get("id").filter(|v| !v.is_null()).cloned(),
            node_type: obj.get("type").and_then(Value::as_str).map(String::from),
            data: obj
                .get("data")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            position: obj.get("position").filter(|v| !v.is_null()).cloned(),
        })
    }

    pub fn is_type(&self, node_type: &str) -> bool {
        self.node_type.as_deref() == Some(node_type)
    }

    pub fn label(&self) -> Option<&str> {
        self.data.get("label").and_then(Value::as_str)
    }

    fn id_display(&self) -> String {
        match &self.id {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// Graph metadata recovered from a description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeGraph {
    pub nodes: Vec<NodeSpec>,
    /// `data.inputValue` of the first start node, if any.
    pub start_input: Option<Value>,
}

/// Parse a workflow description into its node graph.
pub fn extract(description: Option<&str>) -> NodeGraph {
    let Some(description) = description else {
        return NodeGraph::default();
    };

    let metadata = match serde_json::from_str::<Value>(description) {
        Ok(Value::Object(obj)) => obj,
        Ok(_) => {
            debug!("Workflow description is JSON but not an object, ignoring");
            return NodeGraph::default();
        }
        Err(e) => {
            debug!(error = %e, "Workflow description carries no graph metadata");
            return NodeGraph::default();
        }
    };

    let nodes: Vec<NodeSpec> = metadata
        .get("nodes")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .enumerate()
                .filter_map(|(i, v)| NodeSpec::from_value(i, v))
                .collect()
        })
        .unwrap_or_default();

    let start_input = nodes
        .iter()
        .find(|n| n.is_type(START_NODE_TYPE))
        .and_then(|n| n.data.get("inputValue").cloned())
        .filter(|v| !v.is_null());

    NodeGraph { nodes, start_input }
}

/// Turn the model nodes of a graph into task specs.
///
/// `order` is the node's index in the original array, so skipped nodes leave
/// gaps rather than being renumbered.
pub fn materialize(nodes: &[NodeSpec]) -> Vec<TaskSpec> {
    nodes
        .iter()
        .filter(|n| n.is_type(MODEL_NODE_TYPE))
        .map(|node| {
            let label = node.label();
            let prompt = node
                .data
                .get("prompt")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| format!("Process node: {}", label.unwrap_or("")));

            TaskSpec {
                name: label
                    .map(String::from)
                    .unwrap_or_else(|| format!("Task {}", node.index + 1)),
                description: format!("Task for node {}", node.id_display()),
                task_type: LLM_TASK_TYPE.to_string(),
                order: node.index as i64,
                config: json!({
                    "prompt": prompt,
                    "node_id": node.id,
                    "node_data": node.data,
                    "position": node.position.clone().unwrap_or_else(|| json!({})),
                }),
            }
        })
        .collect()
}

/// Extract and materialize in one step.
pub fn derive_tasks(description: Option<&str>) -> Vec<TaskSpec> {
    materialize(&extract(description).nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREETING: &str = r#"{"nodes":[{"type":"startNode","data":{"inputValue":"hi"}},{"type":"modelNode","data":{"label":"Greet"}}]}"#;

    #[test]
    fn test_extract_absent_and_malformed() {
        assert_eq!(extract(None), NodeGraph::default());
        assert_eq!(extract(Some("just a plain description")), NodeGraph::default());
        assert_eq!(extract(Some("[1, 2, 3]")), NodeGraph::default());
        assert_eq!(extract(Some("{}")).nodes.len(), 0);
        assert_eq!(extract(Some(r#"{"nodes": "nope"}"#)).nodes.len(), 0);
    }

    #[test]
    fn test_extract_start_input() {
        let graph = extract(Some(GREETING));
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.start_input, Some(Value::String("hi".into())));
    }

    #[test]
    fn test_start_input_stops_at_first_start_node() {
        let desc = r#"{"nodes":[
            {"type":"startNode","data":{}},
            {"type":"startNode","data":{"inputValue":"second"}}
        ]}"#;
        assert_eq!(extract(Some(desc)).start_input, None);
    }

    #[test]
    fn test_non_object_nodes_keep_their_index() {
        let desc = r#"{"nodes":[42, {"type":"modelNode","data":{"label":"A"}}]}"#;
        let graph = extract(Some(desc));
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].index, 1);
    }

    #[test]
    fn test_materialize_preserves_original_indices() {
        let desc = r#"{"nodes":[
            {"id":"s","type":"startNode","data":{}},
            {"id":"a","type":"modelNode","data":{"label":"A"}},
            {"id":"e","type":"endNode","data":{}},
            {"id":"b","type":"modelNode","data":{"label":"B"}}
        ]}"#;
        let tasks = derive_tasks(Some(desc));
        let got: Vec<_> = tasks.iter().map(|t| (t.name.as_str(), t.order)).collect();
        assert_eq!(got, vec![("A", 1), ("B", 3)]);
        assert!(tasks.iter().all(|t| t.task_type == LLM_TASK_TYPE));
    }

    #[test]
    fn test_materialize_config_shape() {
        let desc = r#"{"nodes":[
            {"id":"n1","type":"modelNode","position":{"x":10,"y":20},"data":{"label":"Translate","prompt":"Translate to French"}}
        ]}"#;
        let tasks = derive_tasks(Some(desc));
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.description, "Task for node n1");
        assert_eq!(
            task.config,
            json!({
                "prompt": "Translate to French",
                "node_id": "n1",
                "node_data": {"label": "Translate", "prompt": "Translate to French"},
                "position": {"x": 10, "y": 20}
            })
        );
    }

    #[test]
    fn test_materialize_defaults_without_label() {
        let desc = r#"{"nodes":[{"type":"startNode"},{"type":"modelNode"}]}"#;
        let tasks = derive_tasks(Some(desc));
        assert_eq!(tasks[0].name, "Task 2");
        assert_eq!(tasks[0].order, 1);
        assert_eq!(tasks[0].config["prompt"], "Process node: ");
        assert_eq!(tasks[0].config["position"], json!({}));
        assert_eq!(tasks[0].config["node_id"], Value::Null);
        assert_eq!(tasks[0].description, "Task for node unknown");
    }

    #[test]
    fn test_extraction_is_idempotent() {
        assert_eq!(derive_tasks(Some(GREETING)), derive_tasks(Some(GREETING)));
    }
}
