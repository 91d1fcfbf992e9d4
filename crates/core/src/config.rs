//! # Application Configuration
//!
//! Environment-driven settings for the engine and the export workspace.
//! API keys themselves are read by the provider clients, not here.

use crate::models::LlmProvider;
use crate::orchestrator::OrchestratorConfig;
use std::path::PathBuf;

/// Top-level configuration assembled at process start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub orchestrator: OrchestratorConfig,
    /// Directory generated projects are exported under.
    pub output_dir: PathBuf,
    /// How many exported projects the cleanup sweep keeps.
    pub keep_recent: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            output_dir: PathBuf::from("generated_projects"),
            keep_recent: 5,
        }
    }
}

impl AppConfig {
    /// Read configuration from the environment, falling back to defaults.
    ///
    /// Recognized variables: `APPFORGE_PROVIDER`, `APPFORGE_MODEL`,
    /// `APPFORGE_BASE_URL`, `APPFORGE_HEAL_RETRIES`, `APPFORGE_OUTPUT_DIR`,
    /// `APPFORGE_KEEP_RECENT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(provider) = std::env::var("APPFORGE_PROVIDER") {
            match LlmProvider::parse(&provider) {
                Some(provider) => config.orchestrator.provider = provider,
                None => tracing::warn!(%provider, "unknown provider id, keeping default"),
            }
        }
        if let Ok(model) = std::env::var("APPFORGE_MODEL") {
            config.orchestrator.global_model = Some(model);
        }
        if let Ok(base_url) = std::env::var("APPFORGE_BASE_URL") {
            config.orchestrator.base_url = Some(base_url);
        }
        if let Ok(retries) = std::env::var("APPFORGE_HEAL_RETRIES") {
            match retries.parse() {
                Ok(retries) => config.orchestrator.max_heal_retries = retries,
                Err(_) => tracing::warn!(%retries, "invalid heal retry count, keeping default"),
            }
        }
        if let Ok(dir) = std::env::var("APPFORGE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(keep) = std::env::var("APPFORGE_KEEP_RECENT") {
            if let Ok(keep) = keep.parse() {
                config.keep_recent = keep;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.orchestrator.max_heal_retries, 2);
        assert_eq!(config.keep_recent, 5);
        assert_eq!(config.output_dir, PathBuf::from("generated_projects"));
    }
}
