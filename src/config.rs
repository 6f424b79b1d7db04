//! Connection settings for the external serving backend.
//!
//! Server URL, model id, and sampling defaults are explicit values handed to
//! each component at construction, never ambient state.

use std::time::Duration;

use url::Url;

use crate::sampling::SamplingConfig;
use crate::types::RagError;

/// Settings for reaching an OpenAI-compatible serving backend.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// Base URL of the serving backend, e.g. `http://localhost:8000`.
    pub base_url: Url,
    /// Bearer token sent with each request, if the backend requires one.
    pub api_key: Option<String>,
    /// Per-request timeout applied to the HTTP client.
    pub timeout: Duration,
}

impl ProviderConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Reads `RAGLINE_BASE_URL` (required) and `RAGLINE_API_KEY` (optional)
    /// from the environment, honoring a `.env` file when present.
    pub fn from_env() -> Result<Self, RagError> {
        dotenvy::dotenv().ok();
        let raw = std::env::var("RAGLINE_BASE_URL")
            .map_err(|_| RagError::Configuration("RAGLINE_BASE_URL is not set".to_string()))?;
        let base_url = Url::parse(&raw)
            .map_err(|err| RagError::Configuration(format!("invalid RAGLINE_BASE_URL: {err}")))?;
        let api_key = std::env::var("RAGLINE_API_KEY").ok();
        Ok(Self {
            base_url,
            api_key,
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Joins an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, RagError> {
        self.base_url
            .join(path)
            .map_err(|err| RagError::Configuration(format!("invalid endpoint '{path}': {err}")))
    }

    /// Builds an HTTP client honoring the configured timeout.
    pub fn http_client(&self) -> Result<reqwest::Client, RagError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .use_rustls_tls()
            .build()
            .map_err(|err| RagError::Configuration(format!("failed to build HTTP client: {err}")))
    }
}

/// Defaults applied by the engine when a call site does not override them.
#[derive(Clone, Debug)]
pub struct EngineDefaults {
    /// Model id used for chat completion.
    pub chat_model: String,
    /// System prompt prepended to every assembled conversation.
    pub system_prompt: String,
    /// Number of chunks retrieved per query.
    pub top_k: usize,
    /// Sampling strategy for generation.
    pub sampling: SamplingConfig,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            chat_model: "meta/llama-3.1-8b-instruct".to_string(),
            system_prompt: "You are a helpful AI assistant.".to_string(),
            top_k: 4,
            sampling: SamplingConfig::Greedy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_relative_paths() {
        let config = ProviderConfig::new(Url::parse("http://localhost:8000/").unwrap());
        let url = config.endpoint("v1/embeddings").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/v1/embeddings");
    }

    #[test]
    fn builders_apply_settings() {
        let config = ProviderConfig::new(Url::parse("http://localhost:8000/").unwrap())
            .with_api_key("secret")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
