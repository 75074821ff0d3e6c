//! Test doubles shared by the Flowline crates.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::json;

use flowline_core::error::{FlowlineError, Result};
use flowline_core::graph;
use flowline_core::traits::{ModelInvoker, WorkflowStore};
use flowline_core::types::{InvokeRequest, ModelResponse, Task, TaskSpec, Workflow, WorkflowId};

pub mod fixtures {
    /// Start node with input "hi" followed by a single "Greet" model node.
    pub const GREETING: &str = r#"{"nodes":[{"type":"startNode","data":{"inputValue":"hi"}},{"type":"modelNode","data":{"label":"Greet"}}]}"#;

    /// Three model nodes separated by non-model nodes.
    pub const THREE_MODELS: &str = r#"{"nodes":[
        {"id":"start","type":"startNode","data":{"inputValue":"topic"}},
        {"id":"m1","type":"modelNode","data":{"label":"Draft"}},
        {"id":"m2","type":"modelNode","data":{"label":"Review","prompt":"Review the draft"}},
        {"id":"note","type":"commentNode","data":{}},
        {"id":"m3","type":"modelNode","data":{"label":"Publish"}},
        {"id":"end","type":"endNode","data":{}}
    ]}"#;
}

/// A scripted reply for [`ScriptedInvoker`].
#[derive(Debug)]
pub enum Reply {
    /// `success: true` with this data.
    Success(serde_json::Value),
    /// `success: false` with this message.
    Failure(String),
    /// The call itself fails.
    Error(FlowlineError),
    /// Sleep this long, then answer with the default reply.
    Stall(Duration),
}

/// Model invoker that replays a queue of replies and records every request.
///
/// Once the queue is drained it answers with a chat-completion payload
/// echoing the prompt.
pub struct ScriptedInvoker {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<InvokeRequest>>,
}

impl ScriptedInvoker {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<InvokeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn echo(prompt: &str) -> ModelResponse {
    ModelResponse::success(json!({
        "choices": [{"message": {"role": "assistant", "content": format!("echo: {}", prompt)}}]
    }))
}

impl ModelInvoker for ScriptedInvoker {
    fn invoke(&self, request: InvokeRequest) -> BoxFuture<'_, Result<ModelResponse>> {
        let reply = self.replies.lock().unwrap().pop_front();
        let prompt = request.prompt.clone();
        self.requests.lock().unwrap().push(request);

        Box::pin(async move {
            match reply {
                Some(Reply::Success(data)) => Ok(ModelResponse::success(data)),
                Some(Reply::Failure(msg)) => Ok(ModelResponse::failure(msg)),
                Some(Reply::Error(e)) => Err(e),
                Some(Reply::Stall(delay)) => {
                    tokio::time::sleep(delay).await;
                    Ok(echo(&prompt))
                }
                None => Ok(echo(&prompt)),
            }
        })
    }
}

/// In-memory workflow store with the same derive-on-write semantics as the
/// SQLite store, plus [`MemoryStore::push_task`] for hand-built task rows.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    workflows: Vec<Workflow>,
    tasks: Vec<Task>,
    next_workflow_id: i64,
    next_task_id: i64,
}

impl MemoryInner {
    fn insert_specs(&mut self, workflow_id: WorkflowId, specs: Vec<TaskSpec>) {
        for spec in specs {
            let config = spec.config.to_string();
            self.insert_task(workflow_id, spec.name, spec.task_type, spec.order, Some(config));
        }
    }

    fn insert_task(
        &mut self,
        workflow_id: WorkflowId,
        name: String,
        task_type: String,
        order: i64,
        config: Option<String>,
    ) {
        self.next_task_id += 1;
        let now = Utc::now();
        self.tasks.push(Task {
            id: self.next_task_id,
            workflow_id,
            name,
            description: None,
            task_type,
            config,
            order,
            created_at: now,
            updated_at: now,
        });
    }

    fn snapshot(&self, id: WorkflowId) -> Option<Workflow> {
        let mut wf = self.workflows.iter().find(|w| w.id == id)?.clone();
        wf.tasks = self.tasks_of(id);
        wf.tasks.sort_by_key(|t| t.order);
        Some(wf)
    }

    fn tasks_of(&self, id: WorkflowId) -> Vec<Task> {
        self.tasks.iter().filter(|t| t.workflow_id == id).cloned().collect()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task row directly, bypassing graph derivation.
    pub fn push_task(
        &self,
        workflow_id: WorkflowId,
        name: &str,
        task_type: &str,
        order: i64,
        config: Option<&str>,
    ) {
        self.inner.lock().unwrap().insert_task(
            workflow_id,
            name.to_string(),
            task_type.to_string(),
            order,
            config.map(String::from),
        );
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(FlowlineError::Validation("workflow name must not be empty".into()));
    }
    Ok(())
}

impl WorkflowStore for MemoryStore {
    fn get_workflow(&self, id: WorkflowId) -> BoxFuture<'_, Result<Option<Workflow>>> {
        Box::pin(async move { Ok(self.inner.lock().unwrap().snapshot(id)) })
    }

    fn list_workflows(&self, offset: usize, limit: usize) -> BoxFuture<'_, Result<Vec<Workflow>>> {
        Box::pin(async move {
            let inner = self.inner.lock().unwrap();
            Ok(inner
                .workflows
                .iter()
                .skip(offset)
                .take(limit)
                .filter_map(|w| inner.snapshot(w.id))
                .collect())
        })
    }

    fn create_workflow(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> BoxFuture<'_, Result<Workflow>> {
        let name = name.to_string();
        let description = description.map(String::from);

        Box::pin(async move {
            validate_name(&name)?;
            let mut inner = self.inner.lock().unwrap();
            inner.next_workflow_id += 1;
            let id = inner.next_workflow_id;
            let now = Utc::now();
            let specs = graph::derive_tasks(description.as_deref());
            inner.workflows.push(Workflow {
                id,
                name,
                description,
                created_at: now,
                updated_at: now,
                tasks: vec![],
            });
            inner.insert_specs(id, specs);
            inner
                .snapshot(id)
                .ok_or_else(|| FlowlineError::Database(format!("workflow {} vanished", id)))
        })
    }

    fn update_workflow(
        &self,
        id: WorkflowId,
        name: &str,
        description: Option<&str>,
    ) -> BoxFuture<'_, Result<Option<Workflow>>> {
        let name = name.to_string();
        let description = description.map(String::from);

        Box::pin(async move {
            validate_name(&name)?;
            let mut inner = self.inner.lock().unwrap();
            let specs = graph::derive_tasks(description.as_deref());
            let Some(wf) = inner.workflows.iter_mut().find(|w| w.id == id) else {
                return Ok(None);
            };
            wf.name = name;
            wf.description = description;
            wf.updated_at = Utc::now();
            inner.tasks.retain(|t| t.workflow_id != id);
            inner.insert_specs(id, specs);
            Ok(inner.snapshot(id))
        })
    }

    fn delete_workflow(&self, id: WorkflowId) -> BoxFuture<'_, Result<Option<Workflow>>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            let removed = inner.snapshot(id);
            inner.workflows.retain(|w| w.id != id);
            inner.tasks.retain(|t| t.workflow_id != id);
            Ok(removed)
        })
    }

    fn list_tasks(&self, workflow_id: WorkflowId) -> BoxFuture<'_, Result<Vec<Task>>> {
        Box::pin(async move { Ok(self.inner.lock().unwrap().tasks_of(workflow_id)) })
    }
}
