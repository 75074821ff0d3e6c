pub mod client;

use std::sync::Arc;

use tracing::debug;

use flowline_core::config::ModelConfig;
use flowline_core::error::Result;
use flowline_core::traits::ModelInvoker;

pub use client::ChatCompletionsClient;

/// Create the model invoker for a config.
///
/// Every provider Flowline talks to (OpenAI, DashScope/Qwen, Ollama, vLLM...)
/// speaks the OpenAI-compatible chat-completions API.
pub fn create_invoker(config: &ModelConfig) -> Result<Arc<dyn ModelInvoker>> {
    debug!(provider = %config.provider, model = %config.model_id, "Creating model invoker");
    Ok(Arc::new(ChatCompletionsClient::new(config.clone())?))
}
