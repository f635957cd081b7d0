//! Wire models for LLM Deploy
//!
//! Request and response bodies exchanged over the HTTP surface. Field names
//! follow the JSON contract exactly.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Default maximum total length (prompt plus continuation) in tokens
pub const DEFAULT_MAX_LENGTH: usize = 512;
/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default nucleus sampling threshold
pub const DEFAULT_TOP_P: f32 = 0.9;
/// Default top-k cutoff
pub const DEFAULT_TOP_K: u32 = 50;
/// Default device preference
pub const DEFAULT_DEVICE: &str = "cpu";

fn default_device() -> Option<String> {
    Some(DEFAULT_DEVICE.to_string())
}

fn default_true() -> bool {
    true
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_top_p() -> f32 {
    DEFAULT_TOP_P
}

fn default_top_k() -> u32 {
    DEFAULT_TOP_K
}

fn default_num_return_sequences() -> usize {
    1
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Request body for `POST /deploy`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DeployRequest {
    /// Model identifier, e.g. `gpt2` or `microsoft/DialoGPT-medium`
    #[validate(custom = "not_blank")]
    pub model_name: String,

    /// Device preference; resolution always yields the CPU
    #[serde(default = "default_device")]
    pub device: Option<String>,

    /// Request 8-bit quantized weights
    #[serde(default)]
    pub load_in_8bit: bool,

    /// Request 4-bit quantized weights
    #[serde(default)]
    pub load_in_4bit: bool,

    /// Allow the backend to run model-provided code
    #[serde(default = "default_true")]
    pub trust_remote_code: bool,

    /// Access token for gated model repositories
    #[serde(default)]
    pub hf_token: Option<String>,
}

impl DeployRequest {
    /// Creates a request for the given model with default options
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            device: default_device(),
            load_in_8bit: false,
            load_in_4bit: false,
            trust_remote_code: true,
            hf_token: None,
        }
    }
}

/// Response body for an accepted `POST /deploy`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployResponse {
    pub message: String,
    pub model_name: String,
    pub device: String,
    pub status: String,
}

/// Request body for `POST /query`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct QueryRequest {
    /// Prompt text
    #[validate(length(min = 1))]
    pub prompt: String,

    /// Maximum total length in tokens, prompt included
    #[serde(default = "default_max_length")]
    #[validate(range(min = 1))]
    pub max_length: usize,

    /// Number of new tokens to generate; overrides `max_length` when set
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_new_tokens: Option<usize>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    #[validate(range(min = 0.0))]
    pub temperature: f32,

    /// Nucleus sampling threshold
    #[serde(default = "default_top_p")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub top_p: f32,

    /// Top-k cutoff
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Sample instead of greedy decoding
    #[serde(default = "default_true")]
    pub do_sample: bool,

    /// Number of sequences to generate; only the first is returned
    #[serde(default = "default_num_return_sequences")]
    #[validate(range(min = 1))]
    pub num_return_sequences: usize,
}

impl QueryRequest {
    /// Creates a query with default sampling parameters
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_length: DEFAULT_MAX_LENGTH,
            max_new_tokens: None,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            do_sample: true,
            num_return_sequences: 1,
        }
    }
}

/// Response body for `POST /query`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Generated continuation with the prompt stripped
    pub response: String,
    pub model_name: String,
    /// Wall-clock seconds spent tokenizing and generating
    pub generation_time: f64,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Response body for `GET /status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub model_name: Option<String>,
    pub is_loaded: bool,
    pub is_loading: bool,
    pub device: Option<String>,
    /// Message of the most recent failed deploy, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Response body for `DELETE /undeploy`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndeployResponse {
    pub message: String,
}

/// Error body returned with every non-2xx response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
