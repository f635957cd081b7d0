//! Load plan resolution
//!
//! Turns a deploy request into the concrete option sets handed to the
//! backend. Large models are forced onto the most conservative loading path
//! whatever the caller asked for.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use common::utils::is_large_model;
use common::{DeployRequest, Device, Precision};

use crate::backend::{ModelLoadOptions, PipelineOptions, TokenizerOptions};

/// Resolves a device preference
///
/// Only the CPU is supported, so any other preference is ignored.
pub fn resolve_device(preference: Option<&str>) -> Device {
    match preference {
        Some(requested) if !requested.eq_ignore_ascii_case(Device::Cpu.as_str()) => {
            warn!(requested, "Only CPU inference is supported, using cpu");
        }
        _ => {}
    }
    Device::Cpu
}

/// Options for every backend call of one deploy
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPlan {
    pub model_name: String,
    pub device: Device,
    pub is_large: bool,
    pub trust_remote_code: bool,
    pub access_token: Option<String>,
    pub low_memory_loading: bool,
    pub precision: Option<Precision>,
    pub offload_folder: Option<PathBuf>,
    pub load_in_8bit: bool,
    pub load_in_4bit: bool,
}

impl LoadPlan {
    /// Creates a new load plan
    pub fn new(
        request: &DeployRequest,
        device: Device,
        supports_quantization: bool,
        offload_folder: &Path,
    ) -> Self {
        let model_name = request.model_name.trim().to_string();
        let is_large = is_large_model(&model_name);

        let mut plan = Self {
            model_name,
            device,
            is_large,
            trust_remote_code: request.trust_remote_code,
            access_token: request.hf_token.clone(),
            low_memory_loading: true,
            precision: None,
            offload_folder: None,
            load_in_8bit: request.load_in_8bit,
            load_in_4bit: request.load_in_4bit,
        };

        let wants_quantization = plan.load_in_8bit || plan.load_in_4bit;

        if is_large {
            info!(model = %plan.model_name, "Large model detected, using conservative loading");
            plan.load_in_8bit = false;
            plan.load_in_4bit = false;
            plan.precision = Some(Precision::Float32);
            plan.offload_folder = Some(offload_folder.to_path_buf());
        } else if wants_quantization && !supports_quantization {
            warn!(model = %plan.model_name, "Quantization is not available on this backend, loading full weights");
            plan.load_in_8bit = false;
            plan.load_in_4bit = false;
        }

        plan
    }

    /// Tokenizer options for the given implementation
    pub fn tokenizer_options(&self, use_fast: bool) -> TokenizerOptions {
        TokenizerOptions {
            use_fast,
            trust_remote_code: self.trust_remote_code,
            access_token: self.access_token.clone(),
        }
    }

    /// Full model options
    pub fn model_options(&self) -> ModelLoadOptions {
        ModelLoadOptions {
            device: self.device,
            trust_remote_code: self.trust_remote_code,
            access_token: self.access_token.clone(),
            low_memory_loading: self.low_memory_loading,
            precision: self.precision,
            offload_folder: self.offload_folder.clone(),
            load_in_8bit: self.load_in_8bit,
            load_in_4bit: self.load_in_4bit,
        }
    }

    /// Options for the single fallback attempt
    pub fn minimal_model_options(&self) -> ModelLoadOptions {
        ModelLoadOptions::minimal(self.device, self.trust_remote_code, self.access_token.clone())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            device: self.device,
            low_memory_loading: self.low_memory_loading,
        }
    }
}
