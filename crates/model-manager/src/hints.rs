//! Remediation hints for failed loads

use crate::backend::{BackendError, BackendErrorKind};

/// Models known to ship tokenizers the backend handles well
pub const COMPATIBLE_MODELS: &[&str] = &[
    "microsoft/DialoGPT-medium",
    "gpt2",
    "distilgpt2",
    "EleutherAI/gpt-neo-125M",
    "facebook/opt-125m",
    "microsoft/DialoGPT-large",
];

/// Remediation text for an error category, if there is one
pub fn remediation(kind: BackendErrorKind) -> Option<String> {
    match kind {
        BackendErrorKind::Tokenizer => {
            let mut text = String::from(
                "Tokenizer compatibility issue. Try one of these compatible models instead:",
            );
            for model in COMPATIBLE_MODELS {
                text.push_str("\n  - ");
                text.push_str(model);
            }
            text.push_str(
                "\nOr upgrade the inference worker's model libraries to a newer release.",
            );
            Some(text)
        }
        BackendErrorKind::OutOfMemory => Some(
            [
                "Out of memory. Suggestions:",
                "  - Try a smaller model (gpt2, distilgpt2)",
                "  - Make sure the host has at least 32GB RAM for 20B-class models",
                "  - Consider offloading weights to disk",
                "  - Try microsoft/DialoGPT-medium",
            ]
            .join("\n"),
        ),
        _ => None,
    }
}

/// Raw backend message followed by any remediation for its category
pub fn enrich_load_error(error: &BackendError) -> String {
    match remediation(error.category()) {
        Some(hint) => format!("{}\n\n{}", error.message, hint),
        None => error.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenizer_errors_list_alternatives() {
        let message = enrich_load_error(&BackendError::other(
            "'ModelWrapper' object has no attribute 'x'",
        ));
        assert!(message.starts_with("'ModelWrapper' object has no attribute 'x'"));
        for model in COMPATIBLE_MODELS {
            assert!(message.contains(model));
        }
    }

    #[test]
    fn test_memory_errors_suggest_reductions() {
        let error = BackendError::new(BackendErrorKind::OutOfMemory, "allocation failed");
        let message = enrich_load_error(&error);
        assert!(message.starts_with("allocation failed"));
        assert!(message.contains("32GB"));
        assert!(message.contains("distilgpt2"));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let error = BackendError::new(BackendErrorKind::NotFound, "repository not found");
        assert_eq!(enrich_load_error(&error), "repository not found");
        assert!(remediation(BackendErrorKind::Unavailable).is_none());
    }
}
