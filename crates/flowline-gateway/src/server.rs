use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::routes;
use crate::state::AppState;

/// Build the HTTP router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health_check))
        .route("/api/health", get(routes::health))
        .route(
            "/api/v1/workflows",
            get(routes::list_workflows).post(routes::create_workflow),
        )
        .route(
            "/api/v1/workflows/",
            get(routes::list_workflows).post(routes::create_workflow),
        )
        .route(
            "/api/v1/workflows/{id}",
            get(routes::get_workflow)
                .put(routes::update_workflow)
                .delete(routes::delete_workflow),
        )
        .route("/api/v1/workflows/{id}/execute", post(routes::execute_workflow))
        .route("/api/v1/models/invoke", post(routes::invoke_model))
        .route("/api/v1/models/qwen-plus", post(routes::invoke_model))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

/// HTTP gateway server built on axum.
pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let bind = self.state.config.bind.clone();
        let app = router(self.state.clone());

        let listener = TcpListener::bind(&bind).await?;
        info!(bind = %bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use flowline_core::config::{ApiKeyConfig, ApiKeyRole, GatewayConfig, ModelConfig};
    use flowline_core::error::FlowlineError;
    use flowline_core::traits::{ModelInvoker, WorkflowStore};
    use flowline_engine::{ExecutionSettings, WorkflowExecutor};
    use flowline_test_utils::{fixtures, MemoryStore, Reply, ScriptedInvoker};

    use crate::state::InvokeDefaults;

    fn app_with(config: GatewayConfig, replies: Vec<Reply>) -> (Router, Arc<ScriptedInvoker>) {
        let store: Arc<dyn WorkflowStore> = Arc::new(MemoryStore::new());
        let scripted = Arc::new(ScriptedInvoker::new(replies));
        let invoker: Arc<dyn ModelInvoker> = scripted.clone();
        let executor = Arc::new(WorkflowExecutor::new(
            store.clone(),
            invoker.clone(),
            ExecutionSettings::default(),
        ));
        let invoke_defaults = InvokeDefaults::new(&config, &ModelConfig::default());
        let state = Arc::new(AppState {
            config,
            store,
            executor,
            invoker,
            invoke_defaults,
        });
        (router(state), scripted)
    }

    fn app() -> Router {
        app_with(GatewayConfig::default(), vec![]).0
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        send_as(app, method, uri, body, None).await
    }

    async fn send_as(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn create(app: &Router, name: &str, description: &str) -> Value {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/v1/workflows",
            Some(json!({"name": name, "description": description})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(&app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app(), Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["Hello"], "World");
    }

    #[tokio::test]
    async fn test_collection_routes_accept_trailing_slash() {
        let app = app();
        let (status, wf) = send(
            &app,
            Method::POST,
            "/api/v1/workflows/",
            Some(json!({"name": "Slashed", "description": fixtures::GREETING})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(wf["name"], "Slashed");

        let (status, list) = send(&app, Method::GET, "/api/v1/workflows/?skip=0&limit=10", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["id"], wf["id"]);
    }

    #[tokio::test]
    async fn test_create_derives_tasks() {
        let app = app();
        let wf = create(&app, "Demo", fixtures::THREE_MODELS).await;
        let tasks = wf["tasks"].as_array().unwrap();
        let names: Vec<_> = tasks.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["Draft", "Review", "Publish"]);
        assert_eq!(tasks[0]["type"], "llm");
        assert_eq!(tasks[2]["order"], 4);
    }

    #[tokio::test]
    async fn test_create_empty_name_is_422() {
        let (status, body) = send(
            &app(),
            Method::POST,
            "/api/v1/workflows",
            Some(json!({"name": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_get_missing_is_404() {
        let (status, body) = send(&app(), Method::GET, "/api/v1/workflows/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Workflow not found");
    }

    #[tokio::test]
    async fn test_list_skip_limit() {
        let app = app();
        for name in ["a", "b", "c"] {
            create(&app, name, "plain text").await;
        }
        let (status, body) = send(&app, Method::GET, "/api/v1/workflows?skip=1&limit=1", None).await;
        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["name"], "b");
    }

    #[tokio::test]
    async fn test_update_replaces_tasks() {
        let app = app();
        let wf = create(&app, "Demo", fixtures::THREE_MODELS).await;
        let uri = format!("/api/v1/workflows/{}", wf["id"]);

        let (status, body) = send(
            &app,
            Method::PUT,
            &uri,
            Some(json!({"name": "Renamed", "description": fixtures::GREETING})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Renamed");
        assert_eq!(body["tasks"].as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/v1/workflows/999",
            Some(json!({"name": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete() {
        let app = app();
        let wf = create(&app, "Demo", fixtures::GREETING).await;
        let uri = format!("/api/v1/workflows/{}", wf["id"]);

        let (status, body) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Workflow deleted successfully");

        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_execute_returns_report() {
        let (app, invoker) = app_with(GatewayConfig::default(), vec![]);
        let wf = create(&app, "Greeting", fixtures::GREETING).await;
        let uri = format!("/api/v1/workflows/{}/execute", wf["id"]);

        let (status, report) = send(&app, Method::POST, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["workflow_name"], "Greeting");
        assert_eq!(report["results"].as_array().unwrap().len(), 1);
        assert_eq!(report["results"][0]["task_name"], "Greet");
        assert_eq!(
            invoker.requests()[0].prompt,
            "Process node: Greet\n\nInput data: hi\n\nPlease process this input according to your instructions."
        );
    }

    #[tokio::test]
    async fn test_execute_input_data_overrides_start() {
        let (app, invoker) = app_with(GatewayConfig::default(), vec![]);
        let wf = create(&app, "Greeting", fixtures::GREETING).await;
        let uri = format!("/api/v1/workflows/{}/execute?input_data=bonjour", wf["id"]);

        let (status, _) = send(&app, Method::POST, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(invoker.requests()[0].prompt.contains("Input data: bonjour"));
    }

    #[tokio::test]
    async fn test_execute_missing_is_404() {
        let (status, body) = send(&app(), Method::POST, "/api/v1/workflows/5/execute", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("5"));
    }

    #[tokio::test]
    async fn test_execute_partial_failure_is_200() {
        let (app, _) = app_with(
            GatewayConfig::default(),
            vec![Reply::Error(FlowlineError::ModelRequest("connection reset".into()))],
        );
        let wf = create(&app, "Demo", fixtures::THREE_MODELS).await;
        let uri = format!("/api/v1/workflows/{}/execute", wf["id"]);

        let (status, report) = send(&app, Method::POST, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let results = report["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0]["error"].as_str().unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_invoke_uses_defaults() {
        let (app, invoker) = app_with(GatewayConfig::default(), vec![]);
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/models/invoke",
            Some(json!({"prompt": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let request = &invoker.requests()[0];
        assert_eq!(request.max_tokens, 1024);
        assert_eq!(request.system_prompt.as_deref(), Some("prompts/prompt.md"));
    }

    #[tokio::test]
    async fn test_invoke_error_folds_into_failure() {
        let (app, _) = app_with(
            GatewayConfig::default(),
            vec![Reply::Error(FlowlineError::ModelHttp {
                status: 500,
                body: "boom".into(),
            })],
        );
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/models/qwen-plus",
            Some(json!({"prompt": "hello", "max_tokens": 16})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Model API error: 500 - boom");
    }

    #[tokio::test]
    async fn test_roles_enforced() {
        let config = GatewayConfig {
            api_keys: vec![
                ApiKeyConfig {
                    name: "dash".into(),
                    key: "fl_view".into(),
                    role: ApiKeyRole::Viewer,
                },
                ApiKeyConfig {
                    name: "ci".into(),
                    key: "fl_ops".into(),
                    role: ApiKeyRole::Operator,
                },
            ],
            ..Default::default()
        };
        let (app, _) = app_with(config, vec![]);

        let (status, _) = send(&app, Method::GET, "/api/v1/workflows", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) =
            send_as(&app, Method::GET, "/api/v1/workflows", None, Some("fl_view")).await;
        assert_eq!(status, StatusCode::OK);

        let body = Some(json!({"name": "Demo"}));
        let (status, _) =
            send_as(&app, Method::POST, "/api/v1/workflows", body.clone(), Some("fl_view")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, wf) =
            send_as(&app, Method::POST, "/api/v1/workflows", body, Some("fl_ops")).await;
        assert_eq!(status, StatusCode::OK);

        let uri = format!("/api/v1/workflows/{}", wf["id"]);
        let (status, _) = send_as(&app, Method::DELETE, &uri, None, Some("fl_ops")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
