//! Inference worker backend
//!
//! Talks JSON over HTTP to an external inference worker process that owns
//! the machine-learning runtime. The worker hands out opaque handles for
//! tokenizers and models; binding them for generation happens on this side,
//! every generate request simply carries both handles.

use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Device, Precision};
use service_config::BackendSettings;

use crate::backend::{
    BackendError, BackendErrorKind, BackendResult, GenerationParams, ModelBackend,
    ModelHandle, ModelLoadOptions, PipelineOptions, TextGenerator, TokenizerHandle,
    TokenizerOptions,
};

/// Error body returned by the worker
#[derive(Debug, Deserialize)]
struct WorkerError {
    error: String,
    #[serde(default)]
    kind: Option<BackendErrorKind>,
}

#[derive(Serialize)]
struct TokenizerRequest<'a> {
    model_name: &'a str,
    use_fast: bool,
    trust_remote_code: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

#[derive(Deserialize)]
struct TokenizerResponse {
    handle: String,
    #[serde(default)]
    pad_token: Option<String>,
    #[serde(default)]
    eos_token: Option<String>,
    #[serde(default)]
    eos_token_id: Option<u32>,
}

#[derive(Serialize)]
struct EncodeRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct PadTokenRequest<'a> {
    pad_token: &'a str,
}

#[derive(Deserialize)]
struct EncodeResponse {
    ids: Vec<u32>,
}

#[derive(Serialize)]
struct ModelRequest<'a> {
    model_name: &'a str,
    device: Device,
    trust_remote_code: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    low_cpu_mem_usage: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    torch_dtype: Option<Precision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offload_folder: Option<&'a PathBuf>,
    load_in_8bit: bool,
    load_in_4bit: bool,
}

#[derive(Deserialize)]
struct ModelResponse {
    handle: String,
    #[serde(default)]
    device: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    tokenizer: &'a str,
    prompt: &'a str,
    #[serde(flatten)]
    params: &'a GenerationParams,
}

#[derive(Deserialize)]
struct GenerateResponse {
    sequences: Vec<String>,
}

/// HTTP client bound to one worker
#[derive(Clone)]
struct WorkerClient {
    http: reqwest::Client,
    base_url: String,
}

impl WorkerClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> BackendResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(path, "Worker request");
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(unavailable)?;
        let response = check_status(response).await?;
        response
            .json::<R>()
            .await
            .map_err(|e| BackendError::other(format!("Invalid response from inference worker: {}", e)))
    }

    async fn delete(&self, path: &str) -> BackendResult<()> {
        debug!(path, "Worker request");
        let response = self
            .http
            .delete(self.url(path))
            .send()
            .await
            .map_err(unavailable)?;
        check_status(response).await.map(|_| ())
    }
}

fn unavailable(e: reqwest::Error) -> BackendError {
    BackendError::new(
        BackendErrorKind::Unavailable,
        format!("Inference worker unreachable: {}", e),
    )
}

/// Maps a non-2xx worker response onto a backend error
async fn check_status(response: reqwest::Response) -> BackendResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<WorkerError>(&body) {
        Ok(error) => {
            let kind = match error.kind {
                Some(kind) => kind,
                None if status == StatusCode::NOT_FOUND => BackendErrorKind::NotFound,
                None => BackendErrorKind::Other,
            };
            Err(BackendError::new(kind, error.error))
        }
        Err(_) => Err(BackendError::other(format!(
            "Inference worker returned {}: {}",
            status, body
        ))),
    }
}

/// Backend served by an inference worker process
pub struct RemoteBackend {
    client: WorkerClient,
}

impl RemoteBackend {
    /// Creates a new remote backend
    pub fn new(settings: &BackendSettings) -> BackendResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| BackendError::other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client: WorkerClient {
                http,
                base_url: settings.worker_url.trim_end_matches('/').to_string(),
            },
        })
    }

    /// Worker base URL
    pub fn worker_url(&self) -> &str {
        &self.client.base_url
    }
}

struct RemoteTokenizer {
    client: WorkerClient,
    handle: String,
    pad_token: Option<String>,
    eos_token: Option<String>,
    eos_token_id: Option<u32>,
}

#[async_trait]
impl TokenizerHandle for RemoteTokenizer {
    fn handle_id(&self) -> &str {
        &self.handle
    }

    async fn encode(&self, text: &str) -> BackendResult<Vec<u32>> {
        let path = format!("/v1/tokenizers/{}/encode", self.handle);
        let response: EncodeResponse = self.client.post(&path, &EncodeRequest { text }).await?;
        Ok(response.ids)
    }

    fn pad_token(&self) -> Option<&str> {
        self.pad_token.as_deref()
    }

    fn eos_token(&self) -> Option<&str> {
        self.eos_token.as_deref()
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }

    async fn set_pad_token(&mut self, token: String) -> BackendResult<()> {
        let path = format!("/v1/tokenizers/{}/pad_token", self.handle);
        let _: serde_json::Value = self
            .client
            .post(&path, &PadTokenRequest { pad_token: &token })
            .await?;
        self.pad_token = Some(token);
        Ok(())
    }
}

struct RemoteModel {
    handle: String,
    device: Option<String>,
}

impl ModelHandle for RemoteModel {
    fn handle_id(&self) -> &str {
        &self.handle
    }

    fn device(&self) -> Option<String> {
        self.device.clone()
    }
}

struct RemoteGenerator {
    client: WorkerClient,
    model: String,
    tokenizer: String,
    device: Device,
}

#[async_trait]
impl TextGenerator for RemoteGenerator {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> BackendResult<Vec<String>> {
        let request = GenerateRequest {
            model: &self.model,
            tokenizer: &self.tokenizer,
            prompt,
            params,
        };
        let response: GenerateResponse = self.client.post("/v1/generate", &request).await?;
        Ok(response.sequences)
    }

    fn device(&self) -> Option<String> {
        Some(self.device.to_string())
    }
}

#[async_trait]
impl ModelBackend for RemoteBackend {
    async fn load_tokenizer(
        &self,
        model_name: &str,
        options: &TokenizerOptions,
    ) -> BackendResult<Box<dyn TokenizerHandle>> {
        let request = TokenizerRequest {
            model_name,
            use_fast: options.use_fast,
            trust_remote_code: options.trust_remote_code,
            token: options.access_token.as_deref(),
        };
        let response: TokenizerResponse = self.client.post("/v1/tokenizers", &request).await?;

        Ok(Box::new(RemoteTokenizer {
            client: self.client.clone(),
            handle: response.handle,
            pad_token: response.pad_token,
            eos_token: response.eos_token,
            eos_token_id: response.eos_token_id,
        }))
    }

    async fn load_model(
        &self,
        model_name: &str,
        options: &ModelLoadOptions,
    ) -> BackendResult<Arc<dyn ModelHandle>> {
        let request = ModelRequest {
            model_name,
            device: options.device,
            trust_remote_code: options.trust_remote_code,
            token: options.access_token.as_deref(),
            low_cpu_mem_usage: options.low_memory_loading,
            torch_dtype: options.precision,
            offload_folder: options.offload_folder.as_ref(),
            load_in_8bit: options.load_in_8bit,
            load_in_4bit: options.load_in_4bit,
        };
        let response: ModelResponse = self.client.post("/v1/models", &request).await?;

        Ok(Arc::new(RemoteModel {
            handle: response.handle,
            device: response.device,
        }))
    }

    async fn bind(
        &self,
        model: Arc<dyn ModelHandle>,
        tokenizer: Arc<dyn TokenizerHandle>,
        options: &PipelineOptions,
    ) -> BackendResult<Arc<dyn TextGenerator>> {
        Ok(Arc::new(RemoteGenerator {
            client: self.client.clone(),
            model: model.handle_id().to_string(),
            tokenizer: tokenizer.handle_id().to_string(),
            device: options.device,
        }))
    }

    async fn release_handles(
        &self,
        model: Option<Arc<dyn ModelHandle>>,
        tokenizer: Option<Arc<dyn TokenizerHandle>>,
    ) -> BackendResult<()> {
        let mut result = Ok(());
        if let Some(model) = model {
            result = self
                .client
                .delete(&format!("/v1/models/{}", model.handle_id()))
                .await;
        }
        if let Some(tokenizer) = tokenizer {
            let released = self
                .client
                .delete(&format!("/v1/tokenizers/{}", tokenizer.handle_id()))
                .await;
            result = result.and(released);
        }
        result
    }

    async fn collect_garbage(&self) -> BackendResult<()> {
        let _: serde_json::Value = self.client.post("/v1/gc", &serde_json::json!({})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{delete, post};
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use crate::manager::ModelLifecycleManager;
    use common::{DeployRequest, QueryRequest};
    use service_config::ModelSettings;

    type RequestLog = Arc<Mutex<Vec<(String, Value)>>>;

    async fn create_tokenizer(
        State(log): State<RequestLog>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        log.lock().push(("tokenizers".into(), body.clone()));
        if body["model_name"] == "broken" && body["use_fast"] == true {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "fast tokenizer unavailable", "kind": "tokenizer"})),
            );
        }
        (
            StatusCode::OK,
            Json(json!({"handle": "tok-1", "eos_token": "</s>", "eos_token_id": 2})),
        )
    }

    async fn encode(Path(handle): Path<String>, Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(handle, "tok-1");
        let words = body["text"].as_str().unwrap_or_default().split_whitespace().count();
        Json(json!({"ids": (0..words).collect::<Vec<_>>()}))
    }

    async fn set_pad_token(
        State(log): State<RequestLog>,
        Path(handle): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        assert_eq!(handle, "tok-1");
        log.lock().push(("pad_token".into(), body));
        Json(json!({}))
    }

    async fn create_model(
        State(log): State<RequestLog>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        log.lock().push(("models".into(), body.clone()));
        if body["model_name"] == "huge" {
            return (
                StatusCode::INSUFFICIENT_STORAGE,
                Json(json!({"error": "cannot allocate weights", "kind": "out_of_memory"})),
            );
        }
        (StatusCode::OK, Json(json!({"handle": "model-1", "device": "cpu"})))
    }

    async fn generate(State(log): State<RequestLog>, Json(body): Json<Value>) -> Json<Value> {
        log.lock().push(("generate".into(), body.clone()));
        let text = format!("{} from the worker", body["prompt"].as_str().unwrap_or_default());
        Json(json!({"sequences": [text]}))
    }

    async fn remove_model(State(log): State<RequestLog>, Path(handle): Path<String>) -> StatusCode {
        log.lock().push(("delete models".into(), json!(handle)));
        StatusCode::NO_CONTENT
    }

    async fn remove_tokenizer(
        State(log): State<RequestLog>,
        Path(handle): Path<String>,
    ) -> StatusCode {
        log.lock().push(("delete tokenizers".into(), json!(handle)));
        StatusCode::NO_CONTENT
    }

    async fn gc(State(log): State<RequestLog>) -> Json<Value> {
        log.lock().push(("gc".into(), Value::Null));
        Json(json!({}))
    }

    async fn spawn_worker() -> (String, RequestLog) {
        let log = RequestLog::default();
        let router = Router::new()
            .route("/v1/tokenizers", post(create_tokenizer))
            .route("/v1/tokenizers/:handle/encode", post(encode))
            .route("/v1/tokenizers/:handle/pad_token", post(set_pad_token))
            .route("/v1/models", post(create_model))
            .route("/v1/generate", post(generate))
            .route("/v1/models/:handle", delete(remove_model))
            .route("/v1/tokenizers/:handle", delete(remove_tokenizer))
            .route("/v1/gc", post(gc))
            .with_state(Arc::clone(&log));

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::Server::from_tcp(listener)
                .unwrap()
                .serve(router.into_make_service())
                .await
                .unwrap();
        });

        (format!("http://{}/", addr), log)
    }

    fn backend_for(url: &str) -> RemoteBackend {
        RemoteBackend::new(&BackendSettings {
            worker_url: url.to_string(),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_against_worker() {
        let (url, log) = spawn_worker().await;
        let backend = backend_for(&url);
        assert!(!backend.worker_url().ends_with('/'));

        let manager = Arc::new(ModelLifecycleManager::new(
            Arc::new(backend),
            ModelSettings::default(),
        ));
        manager.deploy(DeployRequest::new("gpt2")).await.unwrap();
        assert_eq!(manager.status().await.device.as_deref(), Some("cpu"));

        let response = manager.query(&QueryRequest::new("Hello")).await.unwrap();
        assert_eq!(response.response, "from the worker");
        assert_eq!(response.input_tokens, 1);
        assert_eq!(response.output_tokens, 3);

        manager.undeploy().await.unwrap();

        let log = log.lock().clone();
        let pad_token = log
            .iter()
            .find(|(kind, _)| kind == "pad_token")
            .map(|(_, body)| body.clone())
            .unwrap();
        assert_eq!(pad_token["pad_token"], "</s>");

        let generate = log
            .iter()
            .find(|(kind, _)| kind == "generate")
            .map(|(_, body)| body.clone())
            .unwrap();
        assert_eq!(generate["model"], "model-1");
        assert_eq!(generate["tokenizer"], "tok-1");
        assert_eq!(generate["pad_token_id"], 2);
        assert_eq!(generate["max_length"], 512);

        let model = log
            .iter()
            .find(|(kind, _)| kind == "models")
            .map(|(_, body)| body.clone())
            .unwrap();
        assert_eq!(model["device"], "cpu");
        assert_eq!(model["low_cpu_mem_usage"], true);

        assert!(log.iter().any(|(kind, handle)| kind == "delete models" && handle == "model-1"));
        assert!(log.iter().any(|(kind, handle)| kind == "delete tokenizers" && handle == "tok-1"));
        assert_eq!(log.last().map(|(kind, _)| kind.as_str()), Some("gc"));
    }

    #[tokio::test]
    async fn test_structured_worker_errors() {
        let (url, _) = spawn_worker().await;
        let backend = backend_for(&url);

        let options = TokenizerOptions {
            use_fast: true,
            trust_remote_code: true,
            access_token: None,
        };
        let error = backend.load_tokenizer("broken", &options).await.err().unwrap();
        assert_eq!(error.kind, BackendErrorKind::Tokenizer);
        assert_eq!(error.message, "fast tokenizer unavailable");

        let options = ModelLoadOptions::minimal(Device::Cpu, true, None);
        let error = backend.load_model("huge", &options).await.err().unwrap();
        assert_eq!(error.kind, BackendErrorKind::OutOfMemory);
    }

    #[tokio::test]
    async fn test_large_model_request_body() {
        let (url, log) = spawn_worker().await;
        let manager = Arc::new(ModelLifecycleManager::new(
            Arc::new(backend_for(&url)),
            ModelSettings::default(),
        ));

        let mut request = DeployRequest::new("openai/gpt-oss-20b");
        request.load_in_4bit = true;
        request.hf_token = Some("hf_abc".into());
        manager.deploy(request).await.unwrap();

        let body = log
            .lock()
            .iter()
            .find(|(kind, _)| kind == "models")
            .map(|(_, body)| body.clone())
            .unwrap();
        assert_eq!(body["load_in_4bit"], false);
        assert_eq!(body["torch_dtype"], "float32");
        assert_eq!(body["offload_folder"], "offload");
        assert_eq!(body["token"], "hf_abc");
    }

    #[tokio::test]
    async fn test_release_continues_after_failed_delete() {
        let log = RequestLog::default();
        let router = Router::new()
            .route(
                "/v1/models/:handle",
                delete(|| async {
                    (
                        StatusCode::NOT_FOUND,
                        Json(json!({"error": "unknown model handle"})),
                    )
                }),
            )
            .route("/v1/tokenizers/:handle", delete(remove_tokenizer))
            .with_state(Arc::clone(&log));
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::Server::from_tcp(listener)
                .unwrap()
                .serve(router.into_make_service())
                .await
                .unwrap();
        });

        let backend = backend_for(&format!("http://{}", addr));
        let model: Arc<dyn ModelHandle> = Arc::new(RemoteModel {
            handle: "model-9".into(),
            device: None,
        });
        let tokenizer: Arc<dyn TokenizerHandle> = Arc::new(RemoteTokenizer {
            client: backend.client.clone(),
            handle: "tok-9".into(),
            pad_token: None,
            eos_token: None,
            eos_token_id: None,
        });

        let error = backend
            .release_handles(Some(model), Some(tokenizer))
            .await
            .unwrap_err();
        assert_eq!(error.kind, BackendErrorKind::NotFound);
        assert!(log
            .lock()
            .iter()
            .any(|(kind, handle)| kind == "delete tokenizers" && handle == "tok-9"));
    }

    #[tokio::test]
    async fn test_unreachable_worker() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = backend_for(&format!("http://{}", addr));
        let error = backend.collect_garbage().await.unwrap_err();
        assert_eq!(error.kind, BackendErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_unstructured_error_body() {
        let router = Router::new().route(
            "/v1/gc",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream exploded") }),
        );
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::Server::from_tcp(listener)
                .unwrap()
                .serve(router.into_make_service())
                .await
                .unwrap();
        });

        let backend = backend_for(&format!("http://{}", addr));
        let error = backend.collect_garbage().await.unwrap_err();
        assert_eq!(error.kind, BackendErrorKind::Other);
        assert!(error.message.contains("502"));
        assert!(error.message.contains("upstream exploded"));
    }
}
