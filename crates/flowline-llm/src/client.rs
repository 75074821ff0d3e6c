use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use flowline_core::config::ModelConfig;
use flowline_core::error::{FlowlineError, Result};
use flowline_core::traits::ModelInvoker;
use flowline_core::types::{InvokeRequest, ModelResponse};

/// OpenAI-compatible chat-completions client. Works with OpenAI, DashScope, Ollama, vLLM, etc.
pub struct ChatCompletionsClient {
    http: Client,
    config: ModelConfig,
}

impl ChatCompletionsClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FlowlineError::ModelRequest(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

// Request types
#[derive(Serialize, Debug, PartialEq)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Debug, PartialEq)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

fn build_messages(system: Option<String>, prompt: String) -> Vec<OaiMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(content) = system {
        messages.push(OaiMessage {
            role: "system",
            content,
        });
    }
    messages.push(OaiMessage {
        role: "user",
        content: prompt,
    });
    messages
}

/// Read the system prompt file. A missing file means no system message.
async fn load_system_prompt(path: Option<&str>) -> Option<String> {
    let path = path?;
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) => {
            debug!(path, error = %e, "System prompt not loaded");
            None
        }
    }
}

/// Error message carried by a 2xx body, as some compatible servers report failures.
fn body_error(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(
            other
                .get("message")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| other.to_string()),
        ),
    }
}

impl ModelInvoker for ChatCompletionsClient {
    fn invoke(&self, request: InvokeRequest) -> BoxFuture<'_, Result<ModelResponse>> {
        Box::pin(async move {
            let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) else {
                warn!("Model API key is not set");
                return Ok(ModelResponse::failure("API key is not set"));
            };

            let system = load_system_prompt(request.system_prompt.as_deref()).await;
            let body = ChatRequest {
                model: self.config.model_id.clone(),
                messages: build_messages(system, request.prompt),
                max_tokens: request.max_tokens,
                temperature: request.temperature,
            };

            let url = self.endpoint();
            debug!(url = %url, model = %body.model, max_tokens = body.max_tokens, "Sending chat completion");

            let response = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        FlowlineError::ModelRequest(format!(
                            "timeout after {}s",
                            self.config.timeout_secs
                        ))
                    } else {
                        FlowlineError::ModelRequest(e.to_string())
                    }
                })?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(FlowlineError::ModelHttp { status, body });
            }

            let payload: Value = response
                .json()
                .await
                .map_err(|e| FlowlineError::ModelParse(e.to_string()))?;

            if let Some(message) = body_error(&payload) {
                warn!(error = %message, "Model returned an error payload");
                return Ok(ModelResponse::failure(message));
            }

            Ok(ModelResponse::success(payload))
        })
    }
}
