//! Remote LLM provider configuration
//!
//! Both supported providers speak the OpenAI chat-completions protocol with
//! bearer authentication; they differ only in endpoint, default model and the
//! environment variable holding the API key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DatagenError, Result};

/// Completion token budget per request.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Known chat-completions providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    SiliconFlow,
    DeepSeek,
}

impl Provider {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Provider::SiliconFlow => "https://api.siliconflow.cn/v1/chat/completions",
            Provider::DeepSeek => "https://api.deepseek.com/v1/chat/completions",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::SiliconFlow => "Qwen/Qwen2.5-7B-Instruct",
            Provider::DeepSeek => "deepseek-chat",
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::SiliconFlow => "SILICONFLOW_API_KEY",
            Provider::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::SiliconFlow => write!(f, "siliconflow"),
            Provider::DeepSeek => write!(f, "deepseek"),
        }
    }
}

impl FromStr for Provider {
    type Err = DatagenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "siliconflow" => Ok(Provider::SiliconFlow),
            "deepseek" => Ok(Provider::DeepSeek),
            other => Err(DatagenError::Configuration(format!(
                "unknown provider '{other}' (expected siliconflow or deepseek)"
            ))),
        }
    }
}

/// Resolved provider settings for a remote generation run
#[derive(Clone, Serialize)]
pub struct ProviderConfig {
    pub provider: Provider,
    /// Chat-completions URL
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    /// Build a config with an explicit key.
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        ProviderConfig {
            provider,
            endpoint: provider.endpoint().to_string(),
            model: provider.default_model().to_string(),
            api_key: api_key.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Resolve the key from the process environment.
    pub fn from_env(provider: Provider) -> Result<Self> {
        Self::resolve(provider, None, |var| std::env::var(var).ok())
    }

    /// Resolve the key from an explicit value, falling back to `lookup`.
    ///
    /// A missing or blank key is a configuration error.
    pub fn resolve<F>(provider: Provider, explicit: Option<String>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = explicit
            .or_else(|| lookup(provider.api_key_var()))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                DatagenError::Configuration(format!(
                    "missing API key for {provider}: set {}",
                    provider.api_key_var()
                ))
            })?;
        Ok(Self::new(provider, key))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}
