//! Route table

use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use service_config::CorsSettings;

use crate::handlers::{self, AppState};

/// Builds the CORS layer for the configured origins
pub fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    if settings.allows_any_origin() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = settings
        .allow_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Creates the application router
pub fn create_router(state: AppState, cors: &CorsSettings) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/deploy", post(handlers::deploy))
        .route("/query", post(handlers::query))
        .route("/status", get(handlers::status))
        .route("/undeploy", delete(handlers::undeploy))
        .route("/system", get(handlers::system))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tokio::sync::Notify;
    use tower::ServiceExt;

    use model_manager::testing::ScriptedBackend;
    use model_manager::{BackendError, BackendErrorKind, ModelBackend, ModelLifecycleManager};
    use service_config::ModelSettings;

    fn app_with(backend: ScriptedBackend) -> (Router, Arc<ModelLifecycleManager>) {
        let backend: Arc<dyn ModelBackend> = Arc::new(backend);
        let manager = Arc::new(ModelLifecycleManager::new(backend, ModelSettings::default()));
        let router = create_router(AppState::new(Arc::clone(&manager)), &CorsSettings::default());
        (router, manager)
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn wait_until_idle(router: &Router) -> Value {
        for _ in 0..500 {
            let (_, status) = call(router, Method::GET, "/status", None).await;
            if status["is_loading"] == false {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("deploy did not finish");
    }

    #[tokio::test]
    async fn test_root_descriptor() {
        let (router, _) = app_with(ScriptedBackend::new());
        let (status, body) = call(&router, Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["endpoints"]["deploy"].is_string());
    }

    #[tokio::test]
    async fn test_status_on_empty_slot() {
        let (router, _) = app_with(ScriptedBackend::new());
        let (status, body) = call(&router, Method::GET, "/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_name"], Value::Null);
        assert_eq!(body["is_loaded"], false);
        assert_eq!(body["is_loading"], false);
        assert_eq!(body["device"], "unknown");
    }

    #[tokio::test]
    async fn test_deploy_query_undeploy() {
        let (router, _) = app_with(ScriptedBackend::new());

        let (status, body) =
            call(&router, Method::POST, "/deploy", Some(json!({"model_name": "gpt2"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "loading");
        assert_eq!(body["device"], "cpu");
        assert_eq!(body["model_name"], "gpt2");

        let loaded = wait_until_idle(&router).await;
        assert_eq!(loaded["is_loaded"], true);
        assert_eq!(loaded["model_name"], "gpt2");

        let (status, body) =
            call(&router, Method::POST, "/query", Some(json!({"prompt": "Hello"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["response"].as_str().unwrap().is_empty());
        assert!(!body["response"].as_str().unwrap().starts_with("Hello"));
        assert!(body["generation_time"].as_f64().unwrap() >= 0.0);
        assert_eq!(body["input_tokens"], 1);

        let (status, body) = call(&router, Method::DELETE, "/undeploy", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Model undeployed successfully");

        let (status, body) = call(&router, Method::DELETE, "/undeploy", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["detail"],
            "No model is currently loaded. Please deploy a model first."
        );
    }

    #[tokio::test]
    async fn test_second_deploy_while_loading() {
        let gate = Arc::new(Notify::new());
        let (router, _) = app_with(ScriptedBackend::new().with_load_gate(Arc::clone(&gate)));

        let (status, _) =
            call(&router, Method::POST, "/deploy", Some(json!({"model_name": "gpt2"}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            call(&router, Method::POST, "/deploy", Some(json!({"model_name": "gpt2"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Model is currently loading. Please wait.");

        let (status, _) =
            call(&router, Method::POST, "/query", Some(json!({"prompt": "Hello"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        gate.notify_one();
        assert_eq!(wait_until_idle(&router).await["is_loaded"], true);

        let (status, body) =
            call(&router, Method::POST, "/deploy", Some(json!({"model_name": "gpt2"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["detail"],
            "Model is already loaded. Use /undeploy to unload first."
        );
    }

    #[tokio::test]
    async fn test_failed_load_is_reported_in_status() {
        let oom = BackendError::new(BackendErrorKind::OutOfMemory, "cannot allocate");
        let (router, _) = app_with(
            ScriptedBackend::new()
                .fail_full_model(oom.clone())
                .fail_minimal_model(oom),
        );

        let (status, _) =
            call(&router, Method::POST, "/deploy", Some(json!({"model_name": "gpt2"}))).await;
        assert_eq!(status, StatusCode::OK);

        let status = wait_until_idle(&router).await;
        assert_eq!(status["is_loaded"], false);
        assert_eq!(status["model_name"], Value::Null);
        assert!(status["last_error"]
            .as_str()
            .unwrap()
            .starts_with("cannot allocate"));
    }

    #[tokio::test]
    async fn test_query_without_model() {
        let (router, _) = app_with(ScriptedBackend::new());
        let (status, body) =
            call(&router, Method::POST, "/query", Some(json!({"prompt": "Hello"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_generation_failure_is_server_error() {
        let (router, manager) =
            app_with(ScriptedBackend::new().fail_generate(BackendError::other("backend crashed")));
        manager
            .deploy(common::DeployRequest::new("gpt2"))
            .await
            .unwrap();

        let (status, body) =
            call(&router, Method::POST, "/query", Some(json!({"prompt": "Hello"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Generation error: backend crashed");
    }

    #[tokio::test]
    async fn test_invalid_bodies_are_bad_requests() {
        let (router, _) = app_with(ScriptedBackend::new());

        let (status, body) = call(&router, Method::POST, "/deploy", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());

        let (status, _) =
            call(&router, Method::POST, "/deploy", Some(json!({"model_name": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &router,
            Method::POST,
            "/query",
            Some(json!({"prompt": "Hello", "top_p": 3.0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_any_origin() {
        let (router, _) = app_with(ScriptedBackend::new());
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/deploy")
            .header("origin", "http://example.com")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }
}
