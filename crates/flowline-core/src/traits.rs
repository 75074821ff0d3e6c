use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Model invoker: one chat-completion call per workflow task.
pub trait ModelInvoker: Send + Sync + 'static {
    /// Run a single prompt.
    ///
    /// `Ok` carries the logical outcome, including `success: false` responses.
    /// `Err` means the call itself failed (transport, timeout, non-2xx status,
    /// undecodable body) and halts a workflow execution.
    fn invoke(&self, request: InvokeRequest) -> BoxFuture<'_, Result<ModelResponse>>;
}

/// Workflow store: persistence backend for workflows and their tasks.
///
/// Create and update derive the task set from the description; both commit
/// the workflow row and its tasks together.
pub trait WorkflowStore: Send + Sync + 'static {
    fn get_workflow(&self, id: WorkflowId) -> BoxFuture<'_, Result<Option<Workflow>>>;

    fn list_workflows(&self, offset: usize, limit: usize) -> BoxFuture<'_, Result<Vec<Workflow>>>;

    fn create_workflow(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> BoxFuture<'_, Result<Workflow>>;

    /// Replace name, description and the whole task set. `None` if absent.
    fn update_workflow(
        &self,
        id: WorkflowId,
        name: &str,
        description: Option<&str>,
    ) -> BoxFuture<'_, Result<Option<Workflow>>>;

    /// Delete a workflow and its tasks, returning what was removed.
    fn delete_workflow(&self, id: WorkflowId) -> BoxFuture<'_, Result<Option<Workflow>>>;

    fn list_tasks(&self, workflow_id: WorkflowId) -> BoxFuture<'_, Result<Vec<Task>>>;
}
