use std::sync::Arc;

use flowline_core::config::{GatewayConfig, ModelConfig};
use flowline_core::traits::{ModelInvoker, WorkflowStore};
use flowline_engine::WorkflowExecutor;

/// Parameters for `/models/invoke` requests that omit them.
#[derive(Debug, Clone)]
pub struct InvokeDefaults {
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl InvokeDefaults {
    pub fn new(gateway: &GatewayConfig, model: &ModelConfig) -> Self {
        Self {
            system_prompt: Some(gateway.invoke_system_prompt_path.clone()),
            max_tokens: model.max_tokens,
            temperature: model.temperature,
        }
    }
}

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub store: Arc<dyn WorkflowStore>,
    pub executor: Arc<WorkflowExecutor>,
    pub invoker: Arc<dyn ModelInvoker>,
    pub invoke_defaults: InvokeDefaults,
}
