use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use flowline_core::types::{
    ExecutionReport, InvokeRequest, ModelResponse, Workflow, WorkflowId,
};

use crate::auth;
use crate::error::ApiError;
use crate::middleware::Authenticated;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

// GET /api/health: no auth required
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// GET /health: liveness check used by the web frontend
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

// GET /
pub async fn root() -> Json<Value> {
    Json(json!({ "Hello": "World" }))
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

// GET /api/v1/workflows?skip=0&limit=100: requires Viewer+
pub async fn list_workflows(
    Authenticated(auth_result): Authenticated,
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Vec<Workflow>> {
    if !auth::has_viewer_access(&auth_result.role) {
        return Err(ApiError::forbidden());
    }
    Ok(Json(state.store.list_workflows(q.skip, q.limit).await?))
}

// GET /api/v1/workflows/{id}: requires Viewer+
pub async fn get_workflow(
    Authenticated(auth_result): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<WorkflowId>,
) -> ApiResult<Workflow> {
    if !auth::has_viewer_access(&auth_result.role) {
        return Err(ApiError::forbidden());
    }
    state
        .store
        .get_workflow(id)
        .await?
        .map(Json)
        .ok_or_else(ApiError::workflow_not_found)
}

#[derive(Deserialize)]
pub struct WorkflowBody {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// POST /api/v1/workflows: requires Operator+
pub async fn create_workflow(
    Authenticated(auth_result): Authenticated,
    State(state): State<Arc<AppState>>,
    Json(body): Json<WorkflowBody>,
) -> ApiResult<Workflow> {
    if !auth::has_operator_access(&auth_result.role) {
        return Err(ApiError::forbidden());
    }
    let workflow = state
        .store
        .create_workflow(&body.name, body.description.as_deref())
        .await?;
    info!(
        workflow_id = workflow.id,
        tasks = workflow.tasks.len(),
        by = %auth_result.name,
        "Workflow created"
    );
    Ok(Json(workflow))
}

// PUT /api/v1/workflows/{id}: requires Operator+
pub async fn update_workflow(
    Authenticated(auth_result): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<WorkflowId>,
    Json(body): Json<WorkflowBody>,
) -> ApiResult<Workflow> {
    if !auth::has_operator_access(&auth_result.role) {
        return Err(ApiError::forbidden());
    }
    let workflow = state
        .store
        .update_workflow(id, &body.name, body.description.as_deref())
        .await?
        .ok_or_else(ApiError::workflow_not_found)?;
    info!(workflow_id = id, tasks = workflow.tasks.len(), "Workflow updated");
    Ok(Json(workflow))
}

// DELETE /api/v1/workflows/{id}: requires Admin
pub async fn delete_workflow(
    Authenticated(auth_result): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<WorkflowId>,
) -> ApiResult<Value> {
    if !auth::has_admin_access(&auth_result.role) {
        return Err(ApiError::forbidden());
    }
    state
        .store
        .delete_workflow(id)
        .await?
        .ok_or_else(ApiError::workflow_not_found)?;
    info!(workflow_id = id, by = %auth_result.name, "Workflow deleted");
    Ok(Json(json!({ "message": "Workflow deleted successfully" })))
}

#[derive(Deserialize)]
pub struct ExecuteQuery {
    #[serde(default)]
    pub input_data: Option<String>,
}

// POST /api/v1/workflows/{id}/execute?input_data=...: requires Operator+
pub async fn execute_workflow(
    Authenticated(auth_result): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<WorkflowId>,
    Query(q): Query<ExecuteQuery>,
) -> ApiResult<ExecutionReport> {
    if !auth::has_operator_access(&auth_result.role) {
        return Err(ApiError::forbidden());
    }
    let report = state.executor.execute(id, q.input_data).await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct InvokeBody {
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

// POST /api/v1/models/invoke: requires Operator+
pub async fn invoke_model(
    Authenticated(auth_result): Authenticated,
    State(state): State<Arc<AppState>>,
    Json(body): Json<InvokeBody>,
) -> ApiResult<ModelResponse> {
    if !auth::has_operator_access(&auth_result.role) {
        return Err(ApiError::forbidden());
    }
    let defaults = &state.invoke_defaults;
    let request = InvokeRequest {
        prompt: body.prompt,
        system_prompt: defaults.system_prompt.clone(),
        max_tokens: body.max_tokens.unwrap_or(defaults.max_tokens),
        temperature: body.temperature.unwrap_or(defaults.temperature),
    };

    let response = match state.invoker.invoke(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Model invocation failed");
            ModelResponse::failure(e.to_string())
        }
    };
    Ok(Json(response))
}
