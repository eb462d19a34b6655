//! Centralized configuration for hubsync.
//!
//! Fixed names and timeouts live in constant config structs; the knobs an
//! operator can change are collected in [`SyncConfig`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Well-known manifest files and ref conventions.
pub struct ManifestConfig;

impl ManifestConfig {
    /// README-equivalent at repository root; drives meta tags.
    pub const README_FILE_NAME: &'static str = "README.md";
    /// Model configuration at repository root; drives runtime frameworks.
    pub const MODEL_CONFIG_FILE_NAME: &'static str = "config.json";
    pub const BRANCH_REF_PREFIX: &'static str = "refs/heads/";
    pub const DEFAULT_BRANCH: &'static str = "main";
    /// Separator between the type token and namespace in a full repository name.
    pub const TYPE_NAMESPACE_SEPARATOR: char = '_';
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
    pub const MODERATION_TIMEOUT: Duration = Duration::from_secs(5);
    pub const USER_AGENT: &'static str = "hubsync/0.3";
}

/// Runtime configuration for push processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    /// Branch used when a repository does not record its own default branch.
    pub default_branch: String,
    /// Upper bound for a single git-server file fetch.
    #[serde(with = "duration_secs")]
    pub fetch_timeout: Duration,
    /// Upper bound for a moderation submission.
    #[serde(with = "duration_secs")]
    pub moderation_timeout: Duration,
    /// Submit pushed repositories for sensitive-content review.
    pub sensitive_check: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_branch: ManifestConfig::DEFAULT_BRANCH.to_string(),
            fetch_timeout: NetworkConfig::FETCH_TIMEOUT,
            moderation_timeout: NetworkConfig::MODERATION_TIMEOUT,
            sensitive_check: false,
        }
    }
}

impl SyncConfig {
    /// Full ref name of a branch, e.g. `refs/heads/main`.
    pub fn branch_ref(branch: &str) -> String {
        format!("{}{}", ManifestConfig::BRANCH_REF_PREFIX, branch)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_ref() {
        assert_eq!(SyncConfig::branch_ref("main"), "refs/heads/main");
    }

    #[test]
    fn test_config_roundtrips_durations_as_seconds() {
        let config = SyncConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["fetch_timeout"], 10);
        assert_eq!(json["default_branch"], "main");

        let parsed: SyncConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.moderation_timeout, NetworkConfig::MODERATION_TIMEOUT);
        assert!(!parsed.sensitive_check);
    }
}
