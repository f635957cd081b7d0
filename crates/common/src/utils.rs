//! Utility functions for LLM Deploy
//!
//! Name-based model classification and small formatting helpers.

use bytesize::ByteSize;

use crate::types::ModelSizeCategory;

/// Identifier fragments that mark a model as very high parameter count
const LARGE_MODEL_INDICATORS: [&str; 4] = ["20b", "gpt-oss", "70b", "175b"];

/// Returns true if the model identifier names a large model
///
/// This is a substring heuristic on the identifier, not a lookup of real
/// size metadata. Callers that need the classification go through this one
/// predicate so it can be swapped out later.
///
/// # Examples
///
/// ```
/// use common::utils::is_large_model;
///
/// assert!(is_large_model("openai/gpt-oss-20b"));
/// assert!(is_large_model("meta-llama/Llama-2-70B-hf"));
/// assert!(!is_large_model("gpt2"));
/// ```
pub fn is_large_model(model_name: &str) -> bool {
    let lowered = model_name.to_lowercase();
    LARGE_MODEL_INDICATORS
        .iter()
        .any(|indicator| lowered.contains(indicator))
}

/// Classifies a model identifier into a size category
///
/// # Examples
///
/// ```
/// use common::utils::model_size_category;
/// use common::ModelSizeCategory;
///
/// assert_eq!(model_size_category("mistralai/Mistral-7B-v0.1"), ModelSizeCategory::Large);
/// assert_eq!(model_size_category("distilgpt2"), ModelSizeCategory::Small);
/// ```
pub fn model_size_category(model_name: &str) -> ModelSizeCategory {
    let lowered = model_name.to_lowercase();
    if is_large_model(&lowered) {
        ModelSizeCategory::XLarge
    } else if ["7b", "13b"].iter().any(|size| lowered.contains(size)) {
        ModelSizeCategory::Large
    } else if ["1b", "2b", "3b"].iter().any(|size| lowered.contains(size)) {
        ModelSizeCategory::Medium
    } else {
        ModelSizeCategory::Small
    }
}

/// Formats a byte size into a human-readable string with binary units
///
/// # Examples
///
/// ```
/// use common::utils::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.0 KiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    ByteSize(bytes).to_string_as(false)
}

/// Converts bytes to gigabytes (1024^3)
pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / 1_073_741_824.0
}

/// Truncates a string to at most `max_chars` characters, adding an ellipsis if truncated
///
/// # Examples
///
/// ```
/// use common::utils::truncate_string;
///
/// assert_eq!(truncate_string("Hello, world!", 5), "Hello...");
/// assert_eq!(truncate_string("Hello", 10), "Hello");
/// ```
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
