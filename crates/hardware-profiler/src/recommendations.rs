//! Model recommendations from available resources

use serde::{Deserialize, Serialize};

use common::utils::{is_large_model, model_size_category};
use common::ModelSizeCategory;

use crate::capabilities::SystemResources;

/// Total RAM below which large models are ruled out
const LARGE_MODEL_MIN_RAM_GB: f64 = 16.0;
/// Total RAM needed for 20B-class models
const XLARGE_MODEL_MIN_RAM_GB: f64 = 32.0;
/// Free disk below which model caching becomes a concern
const MIN_FREE_DISK_GB: f64 = 50.0;

/// How well the host suits large models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryVerdict {
    /// Not enough RAM for large models
    Insufficient,
    /// Enough for mid-size models, tight for 20B-class ones
    Limited,
    /// Enough for large models
    Sufficient,
}

/// Recommendations for this host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub memory_verdict: MemoryVerdict,
    /// Free disk is low for model caching
    pub low_disk: bool,
    /// Models that fit the currently available RAM
    pub models: Vec<String>,
}

/// Requirement check for one model on this host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequirements {
    pub model_name: String,
    pub size_category: ModelSizeCategory,
    pub is_large: bool,
    pub min_memory_gb: u64,
    /// Host total RAM meets the category minimum
    pub fits: bool,
}

/// Classifies total RAM against large-model needs
pub fn memory_verdict(total_gb: f64) -> MemoryVerdict {
    if total_gb < LARGE_MODEL_MIN_RAM_GB {
        MemoryVerdict::Insufficient
    } else if total_gb < XLARGE_MODEL_MIN_RAM_GB {
        MemoryVerdict::Limited
    } else {
        MemoryVerdict::Sufficient
    }
}

/// Models that fit the given available RAM
pub fn models_for_available_ram(available_gb: f64) -> Vec<String> {
    let models: &[&str] = if available_gb < 8.0 {
        &["gpt2", "distilgpt2"]
    } else if available_gb < 16.0 {
        &["microsoft/DialoGPT-medium", "EleutherAI/gpt-neo-125M"]
    } else if available_gb < 32.0 {
        &["facebook/opt-350m", "microsoft/DialoGPT-large"]
    } else {
        &["facebook/opt-1.3b", "openai/gpt-oss-20b"]
    };

    models.iter().map(|model| model.to_string()).collect()
}

/// Builds recommendations for a resource snapshot
pub fn recommend(resources: &SystemResources) -> Recommendations {
    Recommendations {
        memory_verdict: memory_verdict(resources.memory.total_gb()),
        low_disk: resources.disk.free_gb() < MIN_FREE_DISK_GB,
        models: models_for_available_ram(resources.memory.available_gb()),
    }
}

/// Checks one model's memory needs against the host
pub fn check_model(model_name: &str, resources: &SystemResources) -> ModelRequirements {
    let size_category = model_size_category(model_name);
    let min_memory_gb = size_category.min_memory_gb();

    ModelRequirements {
        model_name: model_name.to_string(),
        size_category,
        is_large: is_large_model(model_name),
        min_memory_gb,
        fits: resources.memory.total_gb() >= min_memory_gb as f64,
    }
}
