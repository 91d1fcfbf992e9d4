//! # LLM Provider Configuration
//!
//! Centralized model selection for the agent roles. Each provider loads its
//! API key from the environment via radkit's `from_env` constructors.

use serde::{Deserialize, Serialize};

/// Supported LLM providers.
///
/// - Anthropic (Claude) - `ANTHROPIC_API_KEY`
/// - OpenAI (GPT) - `OPENAI_API_KEY`, supports custom base URLs for
///   OpenAI-compatible gateways
/// - Gemini (Google) - `GEMINI_API_KEY`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    Gemini,
}

impl LlmProvider {
    /// All providers, for discovery endpoints.
    pub fn all() -> Vec<LlmProvider> {
        vec![LlmProvider::Anthropic, LlmProvider::OpenAI, LlmProvider::Gemini]
    }

    /// Display name for UI surfaces.
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::OpenAI => "OpenAI",
            LlmProvider::Gemini => "Gemini",
        }
    }

    /// Model used when neither a global nor a per-role override is set.
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "claude-sonnet-4-20250514",
            LlmProvider::OpenAI => "gpt-4o-mini",
            LlmProvider::Gemini => "gemini-2.0-flash-exp",
        }
    }

    /// Environment variable holding the provider's API key.
    pub fn env_key(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::OpenAI => "OPENAI_API_KEY",
            LlmProvider::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Whether this provider supports a custom base URL.
    pub fn supports_base_url(&self) -> bool {
        matches!(self, LlmProvider::OpenAI)
    }

    /// Parse a provider id as used in config and API payloads.
    pub fn parse(id: &str) -> Option<LlmProvider> {
        match id {
            "anthropic" => Some(LlmProvider::Anthropic),
            "openai" => Some(LlmProvider::OpenAI),
            "gemini" => Some(LlmProvider::Gemini),
            _ => None,
        }
    }
}

/// Provider + model pair resolved for a single agent role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name (e.g. "claude-sonnet-4-20250514", "gpt-4o-mini")
    pub model: String,
    /// Base URL override for OpenAI-compatible endpoints
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let provider = LlmProvider::default();
        Self {
            model: provider.default_model().to_string(),
            provider,
            base_url: None,
        }
    }
}

impl ModelConfig {
    /// Config for a specific provider and model.
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
        }
    }

    /// Set a base URL (OpenAI-compatible endpoints only).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

/// Run an `LlmFunction` against whichever provider the config selects.
/// `LlmFunction::builder` needs a concrete `BaseLlm` type, so the provider
/// match lives here instead of behind a boxed trait object.
#[macro_export]
macro_rules! call_structured {
    ($config:expr, $output_type:ty, $system_prompt:expr, $input:expr) => {{
        use radkit::agent::LlmFunction;
        use radkit::models::providers::{AnthropicLlm, GeminiLlm, OpenAILlm};
        use $crate::models::LlmProvider;

        let config = $config;
        let result: anyhow::Result<$output_type> = match config.provider {
            LlmProvider::Anthropic => {
                let llm = AnthropicLlm::from_env(&config.model)?;
                let func =
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt);
                func.run($input).await.map_err(Into::into)
            }
            LlmProvider::OpenAI => {
                let mut llm = OpenAILlm::from_env(&config.model)?;
                if let Some(base_url) = &config.base_url {
                    llm = llm.with_base_url(base_url);
                }
                let func =
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt);
                func.run($input).await.map_err(Into::into)
            }
            LlmProvider::Gemini => {
                let llm = GeminiLlm::from_env(&config.model)?;
                let func =
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt);
                func.run($input).await.map_err(Into::into)
            }
        };
        result
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ModelConfig::default();
        assert_eq!(config.provider, LlmProvider::Anthropic);
        assert!(config.model.contains("claude"));
    }

    #[test]
    fn test_provider_parse_roundtrip() {
        for provider in LlmProvider::all() {
            let json = serde_json::to_string(&provider).unwrap();
            let id = json.trim_matches('"');
            assert_eq!(LlmProvider::parse(id), Some(provider));
        }
        assert_eq!(LlmProvider::parse("llamacpp"), None);
    }

    #[test]
    fn test_base_url_support() {
        assert!(LlmProvider::OpenAI.supports_base_url());
        assert!(!LlmProvider::Anthropic.supports_base_url());
        assert!(!LlmProvider::Gemini.supports_base_url());
    }
}
