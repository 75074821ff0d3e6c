use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use flowline_core::config::EngineConfig;
use flowline_core::error::{FlowlineError, Result};
use flowline_core::graph;
use flowline_core::traits::{ModelInvoker, WorkflowStore};
use flowline_core::types::{
    ExecutionReport, InvokeRequest, ModelResponse, Task, TaskOutcome, WorkflowId,
};

use crate::prompt::build_prompt;

/// Knobs applied to every task of an execution.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// System prompt identifier handed to the invoker.
    pub system_prompt: Option<String>,
    pub default_max_tokens: u32,
    pub default_temperature: f32,
    pub invoke_timeout: Duration,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ExecutionSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            system_prompt: Some(config.system_prompt_path.clone()),
            default_max_tokens: config.default_max_tokens,
            default_temperature: config.default_temperature,
            invoke_timeout: Duration::from_secs(config.invoke_timeout_secs),
        }
    }
}

/// What a single task produced.
enum TaskRun {
    /// The model was called and answered, successfully or not.
    Model(ModelResponse),
    /// The task type has no executor; carries the informational result.
    Unsupported(Value),
}

/// Runs a workflow's tasks in order, threading each output into the next task.
///
/// The executor holds no per-run state, so one instance serves any number of
/// concurrent executions.
pub struct WorkflowExecutor {
    store: Arc<dyn WorkflowStore>,
    invoker: Arc<dyn ModelInvoker>,
    settings: ExecutionSettings,
}

impl WorkflowExecutor {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        invoker: Arc<dyn ModelInvoker>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            store,
            invoker,
            settings,
        }
    }

    /// Execute a workflow.
    ///
    /// A non-empty `input` replaces the start node's input value. Fails only
    /// if the workflow does not exist or cannot be loaded; task failures are
    /// reported inside the returned [`ExecutionReport`].
    pub async fn execute(
        &self,
        workflow_id: WorkflowId,
        input: Option<String>,
    ) -> Result<ExecutionReport> {
        let start = Instant::now();
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or(FlowlineError::WorkflowNotFound(workflow_id))?;

        let initial_input = match input.filter(|s| !s.is_empty()) {
            Some(text) => Some(Value::String(text)),
            None => graph::extract(workflow.description.as_deref()).start_input,
        };

        let mut tasks = self.store.list_tasks(workflow_id).await?;
        // Stable: equal orders keep their stored sequence.
        tasks.sort_by_key(|t| t.order);

        info!(
            workflow_id,
            workflow_name = %workflow.name,
            tasks = tasks.len(),
            has_input = initial_input.is_some(),
            "Executing workflow"
        );

        let mut running_output = initial_input;
        let mut results = Vec::with_capacity(tasks.len());

        for task in &tasks {
            let task_start = Instant::now();
            match self.run_task(task, running_output.as_ref()).await {
                Ok(TaskRun::Model(response)) => {
                    debug!(
                        task_id = task.id,
                        success = response.success,
                        elapsed_ms = task_start.elapsed().as_millis() as u64,
                        "Task complete"
                    );
                    let succeeded = response.success;
                    let data = response.data.clone();
                    results.push(TaskOutcome {
                        task_id: task.id,
                        task_name: task.name.clone(),
                        result: Some(serde_json::to_value(&response)?),
                        error: None,
                    });
                    if succeeded {
                        running_output = data;
                    } else {
                        warn!(
                            task_id = task.id,
                            error = response.error.as_deref().unwrap_or(""),
                            "Task returned a failure, keeping previous output"
                        );
                    }
                }
                Ok(TaskRun::Unsupported(placeholder)) => {
                    results.push(TaskOutcome {
                        task_id: task.id,
                        task_name: task.name.clone(),
                        result: Some(placeholder.clone()),
                        error: None,
                    });
                    running_output = Some(placeholder);
                }
                Err(e) => {
                    error!(task_id = task.id, task_name = %task.name, error = %e, "Error executing task");
                    results.push(TaskOutcome {
                        task_id: task.id,
                        task_name: task.name.clone(),
                        result: None,
                        error: Some(e.to_string()),
                    });
                    break;
                }
            }
        }

        info!(
            workflow_id,
            executed = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Workflow execution finished"
        );

        Ok(ExecutionReport {
            workflow_id,
            workflow_name: workflow.name,
            results,
            final_output: running_output,
        })
    }

    async fn run_task(&self, task: &Task, previous_output: Option<&Value>) -> Result<TaskRun> {
        if !task.is_llm() {
            debug!(task_id = task.id, task_type = %task.task_type, "Skipping unsupported task type");
            return Ok(TaskRun::Unsupported(json!({
                "message": format!("Task type {} not implemented yet", task.task_type)
            })));
        }

        let config = task.parsed_config();
        let request = InvokeRequest {
            prompt: build_prompt(&config, previous_output),
            system_prompt: self.settings.system_prompt.clone(),
            max_tokens: config.max_tokens.unwrap_or(self.settings.default_max_tokens),
            temperature: config
                .temperature
                .unwrap_or(self.settings.default_temperature),
        };

        info!(task_id = task.id, task_name = %task.name, order = task.order, "Executing task");

        tokio::time::timeout(self.settings.invoke_timeout, self.invoker.invoke(request))
            .await
            .map_err(|_| FlowlineError::InvokeTimeout {
                task: task.name.clone(),
                timeout_secs: self.settings.invoke_timeout.as_secs(),
            })?
            .map(TaskRun::Model)
    }
}
