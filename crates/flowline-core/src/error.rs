use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowlineError {
    // Workflow errors
    #[error("Workflow with id {0} not found")]
    WorkflowNotFound(i64),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Model invoker errors
    #[error("Model request failed: {0}")]
    ModelRequest(String),

    #[error("Model API error: {status} - {body}")]
    ModelHttp { status: u16, body: String },

    #[error("Model response parse error: {0}")]
    ModelParse(String),

    #[error("Model invocation timeout after {timeout_secs}s: {task}")]
    InvokeTimeout { task: String, timeout_secs: u64 },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowlineError {
    /// Whether this error means the requested workflow does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FlowlineError::WorkflowNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, FlowlineError>;
