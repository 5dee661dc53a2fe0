//! Configuration types for genflow
//!
//! Settings are read with the `config` crate from an optional file and from
//! `GENFLOW__*` environment variables (double underscore separates nesting,
//! e.g. `GENFLOW__ORCHESTRATION__THUMBNAIL_COUNT=3`). API keys are never
//! stored in the file: each provider names the environment variable holding
//! its key, and the key is read into a [`SecretString`] when the provider is
//! built.

use crate::error::{Error, Result};
use crate::fallback::FallbackChain;
use crate::fanout::DEFAULT_FAN_OUT;
use crate::image::{ImageUrlConfig, ImageUrlProvider};
use crate::openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
use crate::orchestrator::SuccessPolicy;
use crate::provider::SharedProvider;
use dotenvy::dotenv;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "GENFLOW";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenflowConfig {
    /// Orchestration timing and policy
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    /// Text backends in fallback order
    #[serde(default)]
    pub text_providers: Vec<TextProviderConfig>,
    /// Image backends in fallback order
    #[serde(default)]
    pub image_providers: Vec<ImageProviderConfig>,
    /// Content rendering
    #[serde(default)]
    pub content: ContentConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GenflowConfig {
    /// Load from `.env`, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Load .env if present so local development picks up provider keys
        let _ = dotenv();

        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.orchestration.thumbnail_count == 0 {
            return Err(Error::config("orchestration.thumbnail_count must be at least 1"));
        }
        for provider in &self.text_providers {
            parse_url(&provider.base_url)?;
        }
        for provider in &self.image_providers {
            parse_url(&provider.base_url)?;
        }
        Ok(())
    }

    /// Build the text fallback chain.
    ///
    /// Providers whose API key variable is unset are left out of the chain;
    /// the chain is still rejected when no provider remains.
    pub fn text_chain(&self) -> Result<FallbackChain> {
        let mut providers: Vec<SharedProvider> = Vec::with_capacity(self.text_providers.len());
        for provider in &self.text_providers {
            if let Some(var) = provider.missing_key_env() {
                tracing::warn!(provider = %provider.name, env = var, "API key not set, skipping provider");
                continue;
            }
            providers.push(Arc::new(OpenAiCompatProvider::new(provider.to_provider_config()?)?));
        }
        Ok(self.orchestration.apply(FallbackChain::new(providers)?))
    }

    /// Build the image fallback chain
    pub fn image_chain(&self) -> Result<FallbackChain> {
        let providers = self
            .image_providers
            .iter()
            .map(|p| -> Result<SharedProvider> { Ok(Arc::new(ImageUrlProvider::new(p.to_provider_config()?)?)) })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.orchestration.apply(FallbackChain::new(providers)?))
    }
}

/// Orchestration timing and policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Delay between fallback attempts, in milliseconds
    #[serde(default = "default_attempt_delay_ms")]
    pub attempt_delay_ms: u64,
    /// Bound on a single provider call, in seconds
    #[serde(default)]
    pub attempt_timeout_secs: Option<u64>,
    /// Default bound on each job, in seconds
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,
    /// Bound on a whole orchestration run, in seconds
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    /// Concurrent thumbnail attempts
    #[serde(default = "default_thumbnail_count")]
    pub thumbnail_count: usize,
    /// Overall success policy
    #[serde(default)]
    pub success_policy: SuccessPolicy,
}

fn default_attempt_delay_ms() -> u64 { 1000 }
fn default_thumbnail_count() -> usize { DEFAULT_FAN_OUT }

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            attempt_delay_ms: default_attempt_delay_ms(),
            attempt_timeout_secs: None,
            job_timeout_secs: None,
            deadline_secs: None,
            thumbnail_count: default_thumbnail_count(),
            success_policy: SuccessPolicy::default(),
        }
    }
}

impl OrchestrationConfig {
    /// Delay between fallback attempts
    pub fn attempt_delay(&self) -> Duration {
        Duration::from_millis(self.attempt_delay_ms)
    }

    /// Per-attempt timeout
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_secs.map(Duration::from_secs)
    }

    /// Per-job timeout
    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }

    /// Whole-run deadline
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    fn apply(&self, chain: FallbackChain) -> FallbackChain {
        let chain = chain.with_delay(self.attempt_delay());
        match self.attempt_timeout() {
            Some(timeout) => chain.with_attempt_timeout(timeout),
            None => chain,
        }
    }
}

/// Content rendering settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Footer placed in generated descriptions; the built-in call to action when unset
    #[serde(default)]
    pub description_footer: Option<String>,
}

/// One OpenAI-compatible text backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextProviderConfig {
    /// Provider name
    pub name: String,
    /// API base URL
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
    /// Ask for JSON object responses
    #[serde(default = "default_true")]
    pub json_mode: bool,
}

impl TextProviderConfig {
    /// Name of the key variable when one is configured but not set
    pub fn missing_key_env(&self) -> Option<&str> {
        self.api_key_env
            .as_deref()
            .filter(|var| std::env::var(var).is_err())
    }

    /// Resolve into a provider configuration, reading the API key
    pub fn to_provider_config(&self) -> Result<OpenAiCompatConfig> {
        let mut config = OpenAiCompatConfig::new(&self.name, parse_url(&self.base_url)?, &self.model)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_json_mode(self.json_mode);
        config.api_key = read_api_key(self.api_key_env.as_deref())?;
        Ok(config)
    }
}

/// One prompt-addressed image backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageProviderConfig {
    /// Provider name
    pub name: String,
    /// Backend base URL
    pub base_url: String,
    /// Optional model parameter
    #[serde(default)]
    pub model: Option<String>,
    /// Image width
    #[serde(default = "default_width")]
    pub width: u32,
    /// Image height
    #[serde(default = "default_height")]
    pub height: u32,
    /// Fetch the image before returning its URL
    #[serde(default = "default_true")]
    pub verify: bool,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

impl ImageProviderConfig {
    /// Resolve into a provider configuration
    pub fn to_provider_config(&self) -> Result<ImageUrlConfig> {
        let mut config = ImageUrlConfig::new(&self.name, parse_url(&self.base_url)?)
            .with_size(self.width, self.height)
            .with_verify(self.verify);
        config.model = self.model.clone();
        config.timeout = Duration::from_secs(self.timeout_secs);
        Ok(config)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String { "genflow=info".to_string() }
fn default_request_timeout_secs() -> u64 { 120 }
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_true() -> bool { true }

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::config(format!("invalid base_url {raw:?}: {e}")))
}

fn read_api_key(var: Option<&str>) -> Result<Option<SecretString>> {
    let Some(var) = var else {
        return Ok(None);
    };
    std::env::var(var)
        .map(|key| Some(SecretString::from(key)))
        .map_err(|_| Error::config(format!("{var} environment variable not set")))
}
