//! Model configuration (`config.json`) parsing.

use crate::config::ManifestConfig;
use crate::error::{Result, SyncError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ModelConfig {
    #[serde(default)]
    architectures: Vec<String>,
}

/// Extract the architecture key of a model configuration.
///
/// The architecture is the first non-empty entry of `architectures`; it is
/// treated as an opaque lookup key by the reconciler.
pub fn extract_architecture(content: &str) -> Result<String> {
    let config: ModelConfig = serde_json::from_str(content).map_err(|e| {
        SyncError::parse(ManifestConfig::MODEL_CONFIG_FILE_NAME, e.to_string())
    })?;

    config
        .architectures
        .into_iter()
        .map(|arch| arch.trim().to_string())
        .find(|arch| !arch.is_empty())
        .ok_or_else(|| {
            SyncError::parse(
                ManifestConfig::MODEL_CONFIG_FILE_NAME,
                "no architecture declared",
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_architecture() {
        let content = r#"{"architectures": ["BertForMaskedLM"], "model_type": "bert", "hidden_size": 768}"#;
        assert_eq!(extract_architecture(content).unwrap(), "BertForMaskedLM");
    }

    #[test]
    fn test_first_non_empty_architecture_wins() {
        let content = r#"{"architectures": ["", "  LlamaForCausalLM ", "Other"]}"#;
        assert_eq!(extract_architecture(content).unwrap(), "LlamaForCausalLM");
    }

    #[test]
    fn test_missing_architectures() {
        for content in [r#"{"model_type": "bert"}"#, r#"{"architectures": []}"#] {
            let err = extract_architecture(content).unwrap_err();
            assert!(matches!(err, SyncError::ManifestParse { .. }));
        }
    }

    #[test]
    fn test_malformed_json() {
        let err = extract_architecture("{not json").unwrap_err();
        assert!(err.is_skippable());
    }
}
