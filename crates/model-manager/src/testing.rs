//! Scripted backend for tests
//!
//! `ScriptedBackend` behaves like a tiny deterministic model: tokens are
//! whitespace-separated words and generation echoes the prompt followed by a
//! fixed continuation. Every step can be scripted to fail, and every call is
//! recorded so tests can assert on what the lifecycle manager asked for.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::backend::{
    BackendError, BackendResult, GenerationParams, ModelBackend, ModelHandle,
    ModelLoadOptions, PipelineOptions, TextGenerator, TokenizerHandle, TokenizerOptions,
};

/// End-of-sequence token of every scripted tokenizer
pub const EOS_TOKEN: &str = "<|endoftext|>";
/// Id of [`EOS_TOKEN`]
pub const EOS_TOKEN_ID: u32 = 50256;

/// A recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    LoadTokenizer { model_name: String, use_fast: bool },
    LoadModel { model_name: String, options: ModelLoadOptions },
    Bind { pad_token: Option<String> },
    Encode { text: String },
    Generate { prompt: String, params: GenerationParams },
    Release { model: Option<String>, tokenizer: Option<String> },
    SetPadToken { token: String },
    CollectGarbage,
}

type CallLog = Arc<Mutex<Vec<BackendCall>>>;

/// Deterministic in-process backend
#[derive(Default)]
pub struct ScriptedBackend {
    calls: CallLog,
    handles: AtomicUsize,
    fast_tokenizer_error: Option<BackendError>,
    slow_tokenizer_error: Option<BackendError>,
    full_model_error: Option<BackendError>,
    minimal_model_error: Option<BackendError>,
    model_failures: AtomicUsize,
    model_failure_error: Option<BackendError>,
    pad_token_error: Option<BackendError>,
    bind_error: Option<BackendError>,
    encode_error: Option<BackendError>,
    generate_error: Option<BackendError>,
    release_error: Option<BackendError>,
    pad_token: Option<String>,
    continuation: Option<String>,
    empty_generation: bool,
    quantization: bool,
    panic_on_bind: bool,
    load_gate: Option<Arc<Notify>>,
}

impl ScriptedBackend {
    /// Creates a backend where every step succeeds
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_fast_tokenizer(mut self, error: BackendError) -> Self {
        self.fast_tokenizer_error = Some(error);
        self
    }

    pub fn fail_slow_tokenizer(mut self, error: BackendError) -> Self {
        self.slow_tokenizer_error = Some(error);
        self
    }

    /// Fails loads that use the full option set
    pub fn fail_full_model(mut self, error: BackendError) -> Self {
        self.full_model_error = Some(error);
        self
    }

    /// Fails loads that use the minimal option set
    pub fn fail_minimal_model(mut self, error: BackendError) -> Self {
        self.minimal_model_error = Some(error);
        self
    }

    /// Fails the next `count` model loads whatever their options
    pub fn fail_model_loads(mut self, count: usize, error: BackendError) -> Self {
        self.model_failures = AtomicUsize::new(count);
        self.model_failure_error = Some(error);
        self
    }

    pub fn fail_pad_token(mut self, error: BackendError) -> Self {
        self.pad_token_error = Some(error);
        self
    }

    pub fn fail_bind(mut self, error: BackendError) -> Self {
        self.bind_error = Some(error);
        self
    }

    pub fn fail_encode(mut self, error: BackendError) -> Self {
        self.encode_error = Some(error);
        self
    }

    pub fn fail_generate(mut self, error: BackendError) -> Self {
        self.generate_error = Some(error);
        self
    }

    pub fn fail_release(mut self, error: BackendError) -> Self {
        self.release_error = Some(error);
        self
    }

    /// Tokenizers come with their own padding token
    pub fn with_pad_token(mut self, token: impl Into<String>) -> Self {
        self.pad_token = Some(token.into());
        self
    }

    /// Text appended to the prompt by generation
    pub fn with_continuation(mut self, text: impl Into<String>) -> Self {
        self.continuation = Some(text.into());
        self
    }

    /// Generation returns no sequences at all
    pub fn with_empty_generation(mut self) -> Self {
        self.empty_generation = true;
        self
    }

    pub fn with_quantization(mut self) -> Self {
        self.quantization = true;
        self
    }

    pub fn panic_on_bind(mut self) -> Self {
        self.panic_on_bind = true;
        self
    }

    /// Holds every model load until the gate is notified
    pub fn with_load_gate(mut self, gate: Arc<Notify>) -> Self {
        self.load_gate = Some(gate);
        self
    }

    /// Calls recorded so far
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }

    fn next_handle(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.handles.fetch_add(1, Ordering::SeqCst))
    }
}

/// Splits on whitespace, one id per word
fn encode_words(text: &str) -> Vec<u32> {
    text.split_whitespace().enumerate().map(|(i, _)| i as u32).collect()
}

struct ScriptedTokenizer {
    id: String,
    pad_token: Option<String>,
    calls: CallLog,
    encode_error: Option<BackendError>,
    pad_token_error: Option<BackendError>,
}

#[async_trait]
impl TokenizerHandle for ScriptedTokenizer {
    fn handle_id(&self) -> &str {
        &self.id
    }

    async fn encode(&self, text: &str) -> BackendResult<Vec<u32>> {
        self.calls.lock().push(BackendCall::Encode {
            text: text.to_string(),
        });
        if let Some(error) = &self.encode_error {
            return Err(error.clone());
        }
        Ok(encode_words(text))
    }

    fn pad_token(&self) -> Option<&str> {
        self.pad_token.as_deref()
    }

    fn eos_token(&self) -> Option<&str> {
        Some(EOS_TOKEN)
    }

    fn eos_token_id(&self) -> Option<u32> {
        Some(EOS_TOKEN_ID)
    }

    async fn set_pad_token(&mut self, token: String) -> BackendResult<()> {
        self.calls.lock().push(BackendCall::SetPadToken {
            token: token.clone(),
        });
        if let Some(error) = &self.pad_token_error {
            return Err(error.clone());
        }
        self.pad_token = Some(token);
        Ok(())
    }
}

struct ScriptedModel {
    id: String,
}

impl ModelHandle for ScriptedModel {
    fn handle_id(&self) -> &str {
        &self.id
    }

    fn device(&self) -> Option<String> {
        Some("cpu".to_string())
    }
}

struct ScriptedGenerator {
    calls: CallLog,
    continuation: String,
    empty: bool,
    error: Option<BackendError>,
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> BackendResult<Vec<String>> {
        self.calls.lock().push(BackendCall::Generate {
            prompt: prompt.to_string(),
            params: params.clone(),
        });
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if self.empty {
            return Ok(Vec::new());
        }
        let text = format!("{}{}", prompt, self.continuation);
        Ok(vec![text; params.num_return_sequences])
    }

    fn device(&self) -> Option<String> {
        None
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn load_tokenizer(
        &self,
        model_name: &str,
        options: &TokenizerOptions,
    ) -> BackendResult<Box<dyn TokenizerHandle>> {
        self.record(BackendCall::LoadTokenizer {
            model_name: model_name.to_string(),
            use_fast: options.use_fast,
        });

        let scripted = if options.use_fast {
            &self.fast_tokenizer_error
        } else {
            &self.slow_tokenizer_error
        };
        if let Some(error) = scripted {
            return Err(error.clone());
        }

        Ok(Box::new(ScriptedTokenizer {
            id: self.next_handle("tok"),
            pad_token: self.pad_token.clone(),
            calls: Arc::clone(&self.calls),
            encode_error: self.encode_error.clone(),
            pad_token_error: self.pad_token_error.clone(),
        }))
    }

    async fn load_model(
        &self,
        model_name: &str,
        options: &ModelLoadOptions,
    ) -> BackendResult<Arc<dyn ModelHandle>> {
        self.record(BackendCall::LoadModel {
            model_name: model_name.to_string(),
            options: options.clone(),
        });

        if let Some(gate) = &self.load_gate {
            gate.notified().await;
        }

        if let Some(error) = &self.model_failure_error {
            let remaining = self
                .model_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if remaining.is_ok() {
                return Err(error.clone());
            }
        }

        let minimal = !options.low_memory_loading;
        let scripted = if minimal {
            &self.minimal_model_error
        } else {
            &self.full_model_error
        };
        if let Some(error) = scripted {
            return Err(error.clone());
        }

        Ok(Arc::new(ScriptedModel {
            id: self.next_handle("model"),
        }))
    }

    async fn bind(
        &self,
        _model: Arc<dyn ModelHandle>,
        tokenizer: Arc<dyn TokenizerHandle>,
        _options: &PipelineOptions,
    ) -> BackendResult<Arc<dyn TextGenerator>> {
        self.record(BackendCall::Bind {
            pad_token: tokenizer.pad_token().map(str::to_string),
        });
        if self.panic_on_bind {
            panic!("scripted bind panic");
        }
        if let Some(error) = &self.bind_error {
            return Err(error.clone());
        }

        Ok(Arc::new(ScriptedGenerator {
            calls: Arc::clone(&self.calls),
            continuation: self
                .continuation
                .clone()
                .unwrap_or_else(|| " world, nice to meet you.".to_string()),
            empty: self.empty_generation,
            error: self.generate_error.clone(),
        }))
    }

    fn supports_quantization(&self) -> bool {
        self.quantization
    }

    async fn release_handles(
        &self,
        model: Option<Arc<dyn ModelHandle>>,
        tokenizer: Option<Arc<dyn TokenizerHandle>>,
    ) -> BackendResult<()> {
        self.record(BackendCall::Release {
            model: model.map(|m| m.handle_id().to_string()),
            tokenizer: tokenizer.map(|t| t.handle_id().to_string()),
        });
        match &self.release_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn collect_garbage(&self) -> BackendResult<()> {
        self.record(BackendCall::CollectGarbage);
        Ok(())
    }
}
