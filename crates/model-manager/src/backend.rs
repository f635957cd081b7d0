//! Model backend capability
//!
//! The machine-learning library that tokenizes text, loads weights and runs
//! generation lives outside this crate. These traits are the seam it plugs
//! into: the lifecycle manager only ever talks to a `dyn ModelBackend` and
//! the handles it hands out.

use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use common::{Device, Precision, QueryRequest};

/// Result type for backend calls
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Category of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// The tokenizer could not be built or is incompatible
    Tokenizer,
    /// The host ran out of memory
    OutOfMemory,
    /// The model or handle does not exist
    NotFound,
    /// The backend could not be reached
    Unavailable,
    /// Anything else
    Other,
}

/// Error raised by a backend call
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct BackendError {
    /// Category reported by the backend, `Other` when it gave none
    pub kind: BackendErrorKind,

    /// Raw backend message
    pub message: String,
}

impl BackendError {
    /// Creates a new backend error
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an uncategorized backend error
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Other, message)
    }

    /// Effective category of the failure
    ///
    /// Uses the structured kind when the backend supplied one and only falls
    /// back to matching the message text otherwise.
    pub fn category(&self) -> BackendErrorKind {
        if self.kind != BackendErrorKind::Other {
            return self.kind;
        }

        let lowered = self.message.to_lowercase();
        if self.message.contains("ModelWrapper") || lowered.contains("tokenizer") {
            BackendErrorKind::Tokenizer
        } else if lowered.contains("out of memory") || lowered.contains("oom") {
            BackendErrorKind::OutOfMemory
        } else {
            BackendErrorKind::Other
        }
    }
}

/// Options for acquiring a tokenizer
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizerOptions {
    /// Use the fast tokenizer implementation
    pub use_fast: bool,
    pub trust_remote_code: bool,
    pub access_token: Option<String>,
}

/// Options for acquiring model weights
#[derive(Debug, Clone, PartialEq)]
pub struct ModelLoadOptions {
    pub device: Device,
    pub trust_remote_code: bool,
    pub access_token: Option<String>,
    /// Stream weights in to keep peak memory low
    pub low_memory_loading: bool,
    /// Forced weight precision; backend default when unset
    pub precision: Option<Precision>,
    /// Folder to offload weights into; no offloading when unset
    pub offload_folder: Option<PathBuf>,
    pub load_in_8bit: bool,
    pub load_in_4bit: bool,
}

impl ModelLoadOptions {
    /// Minimal option set: device and caller flags only, no memory optimizations
    pub fn minimal(device: Device, trust_remote_code: bool, access_token: Option<String>) -> Self {
        Self {
            device,
            trust_remote_code,
            access_token,
            low_memory_loading: false,
            precision: None,
            offload_folder: None,
            load_in_8bit: false,
            load_in_4bit: false,
        }
    }
}

/// Options for binding a model and tokenizer into a generator
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub device: Device,
    pub low_memory_loading: bool,
}

/// Sampling parameters for one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<usize>,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub do_sample: bool,
    pub num_return_sequences: usize,
    /// Padding token id for generation; set to the end-of-sequence id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pad_token_id: Option<u32>,
}

impl From<&QueryRequest> for GenerationParams {
    fn from(request: &QueryRequest) -> Self {
        Self {
            max_length: request.max_length,
            max_new_tokens: request.max_new_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            do_sample: request.do_sample,
            num_return_sequences: request.num_return_sequences,
            pad_token_id: None,
        }
    }
}

/// Backend tokenizer
#[async_trait]
pub trait TokenizerHandle: Send + Sync {
    /// Backend identifier of this tokenizer
    fn handle_id(&self) -> &str;

    /// Encodes text into token ids
    async fn encode(&self, text: &str) -> BackendResult<Vec<u32>>;

    fn pad_token(&self) -> Option<&str>;

    fn eos_token(&self) -> Option<&str>;

    fn eos_token_id(&self) -> Option<u32>;

    /// Sets the padding token on the backend tokenizer
    async fn set_pad_token(&mut self, token: String) -> BackendResult<()>;
}

/// Backend model weights
pub trait ModelHandle: Send + Sync {
    /// Backend identifier of these weights
    fn handle_id(&self) -> &str;

    /// Device the weights live on, if the backend can tell
    fn device(&self) -> Option<String>;
}

/// A model and tokenizer bound together for generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates full texts, prompt included, one per returned sequence
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> BackendResult<Vec<String>>;

    /// Device generation runs on, if the backend can tell
    fn device(&self) -> Option<String>;
}

/// The three handles that make up a loaded model
///
/// They are acquired together and released together, so a slot can never
/// hold a model without its tokenizer and generator.
#[derive(Clone)]
pub struct LoadedModel {
    pub model: Arc<dyn ModelHandle>,
    pub tokenizer: Arc<dyn TokenizerHandle>,
    pub generator: Arc<dyn TextGenerator>,
}

impl LoadedModel {
    /// Best-effort device introspection
    pub fn device(&self) -> Option<String> {
        self.model.device().or_else(|| self.generator.device())
    }
}

/// External machine-learning backend
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Acquires a tokenizer for `model_name`
    async fn load_tokenizer(
        &self,
        model_name: &str,
        options: &TokenizerOptions,
    ) -> BackendResult<Box<dyn TokenizerHandle>>;

    /// Acquires model weights for `model_name`
    async fn load_model(
        &self,
        model_name: &str,
        options: &ModelLoadOptions,
    ) -> BackendResult<Arc<dyn ModelHandle>>;

    /// Binds a model and tokenizer into a generator
    async fn bind(
        &self,
        model: Arc<dyn ModelHandle>,
        tokenizer: Arc<dyn TokenizerHandle>,
        options: &PipelineOptions,
    ) -> BackendResult<Arc<dyn TextGenerator>>;

    /// Whether quantized loading is available
    fn supports_quantization(&self) -> bool {
        false
    }

    /// Releases whichever handles a load managed to acquire
    ///
    /// Every handle given is released even if an earlier one fails; the
    /// first failure is returned.
    async fn release_handles(
        &self,
        model: Option<Arc<dyn ModelHandle>>,
        tokenizer: Option<Arc<dyn TokenizerHandle>>,
    ) -> BackendResult<()>;

    /// Releases the handles of a loaded model
    async fn release(&self, loaded: LoadedModel) -> BackendResult<()> {
        let LoadedModel { model, tokenizer, .. } = loaded;
        self.release_handles(Some(model), Some(tokenizer)).await
    }

    /// Asks the backend to reclaim native memory
    async fn collect_garbage(&self) -> BackendResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_kind_wins() {
        let error = BackendError::new(BackendErrorKind::OutOfMemory, "tokenizer exploded");
        assert_eq!(error.category(), BackendErrorKind::OutOfMemory);
    }

    #[test]
    fn test_text_heuristics_for_uncategorized_errors() {
        assert_eq!(
            BackendError::other("Can't load Tokenizer for 'x'").category(),
            BackendErrorKind::Tokenizer
        );
        assert_eq!(
            BackendError::other("'ModelWrapper' object has no attribute").category(),
            BackendErrorKind::Tokenizer
        );
        assert_eq!(
            BackendError::other("CUDA out of memory").category(),
            BackendErrorKind::OutOfMemory
        );
        assert_eq!(
            BackendError::other("process killed: OOM").category(),
            BackendErrorKind::OutOfMemory
        );
        assert_eq!(
            BackendError::other("connection reset").category(),
            BackendErrorKind::Other
        );
    }

    #[test]
    fn test_generation_params_from_query() {
        let mut request = QueryRequest::new("Hello");
        request.max_new_tokens = Some(32);
        let params = GenerationParams::from(&request);

        assert_eq!(params.max_length, 512);
        assert_eq!(params.max_new_tokens, Some(32));
        assert_eq!(params.top_k, 50);
        assert_eq!(params.pad_token_id, None);
    }

    #[test]
    fn test_minimal_options_disable_optimizations() {
        let options = ModelLoadOptions::minimal(Device::Cpu, true, Some("token".into()));
        assert!(!options.low_memory_loading);
        assert!(options.precision.is_none());
        assert!(options.offload_folder.is_none());
        assert!(!options.load_in_8bit && !options.load_in_4bit);
        assert!(options.trust_remote_code);
    }
}
