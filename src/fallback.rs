//! Ordered provider fallback
//!
//! A [`FallbackChain`] tries its providers one after another and returns the
//! first success. Each provider is tried at most once per call. When every
//! provider fails the chain returns [`Error::ChainExhausted`], rendering only
//! the last provider's error while keeping the full attempt trace.

use crate::error::{AttemptFailure, Error, Result};
use crate::provider::{GenerationRequest, Provider, SharedProvider};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Delay between two provider attempts unless configured otherwise
pub const DEFAULT_ATTEMPT_DELAY: Duration = Duration::from_secs(1);

/// Output of a successful chain run
#[derive(Debug, Clone)]
pub struct ChainSuccess<T> {
    /// Name of the provider that satisfied the request
    pub provider: String,
    /// 1-based position of that provider
    pub attempt: usize,
    /// Provider output
    pub output: T,
    /// Failures of the providers tried before it
    pub failures: Vec<AttemptFailure>,
}

/// Ordered, immutable list of providers tried for one logical request
#[derive(Clone)]
pub struct FallbackChain {
    providers: Vec<SharedProvider>,
    delay: Duration,
    attempt_timeout: Option<Duration>,
}

impl FallbackChain {
    /// Create a chain; at least one provider is required
    pub fn new(providers: Vec<SharedProvider>) -> Result<Self> {
        if providers.is_empty() {
            return Err(Error::config("fallback chain requires at least one provider"));
        }

        Ok(Self {
            providers,
            delay: DEFAULT_ATTEMPT_DELAY,
            attempt_timeout: None,
        })
    }

    /// Set the delay slept between attempts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Bound every single provider invocation
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Number of providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Always false, construction rejects empty chains
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider names in attempt order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Run the chain and return the raw output of the first successful provider
    pub async fn run(&self, request: &GenerationRequest) -> Result<ChainSuccess<serde_json::Value>> {
        self.run_parsed(request, Ok).await
    }

    /// Run the chain, deserializing output into `T`.
    ///
    /// Output that does not deserialize counts as a failure of that provider.
    pub async fn run_as<T: DeserializeOwned>(&self, request: &GenerationRequest) -> Result<ChainSuccess<T>> {
        self.run_parsed(request, |value| serde_json::from_value(value).map_err(Error::from))
            .await
    }

    /// Run the chain, accepting the first output that `parse` accepts.
    ///
    /// A parse error counts as a failure of that provider.
    pub async fn run_parsed<T, F>(&self, request: &GenerationRequest, parse: F) -> Result<ChainSuccess<T>>
    where
        F: Fn(serde_json::Value) -> Result<T>,
    {
        let total = self.providers.len();
        let mut failures = Vec::with_capacity(total);

        for (index, provider) in self.providers.iter().enumerate() {
            let attempt = index + 1;
            tracing::info!(provider = provider.name(), attempt, total, "Attempting generation");

            match self.invoke_once(provider.as_ref(), request).await.and_then(&parse) {
                Ok(output) => {
                    tracing::info!(provider = provider.name(), attempt, "Generation succeeded");
                    return Ok(ChainSuccess {
                        provider: provider.name().to_string(),
                        attempt,
                        output,
                        failures,
                    });
                }
                Err(e) => {
                    let error = e.to_string();
                    tracing::warn!(provider = provider.name(), attempt, error = %error, "Generation attempt failed");
                    failures.push(AttemptFailure {
                        provider: provider.name().to_string(),
                        attempt,
                        error,
                    });

                    if attempt < total {
                        tracing::debug!(delay_ms = self.delay.as_millis() as u64, "Trying next provider");
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        let last_error = failures
            .last()
            .map(|f| f.error.clone())
            .unwrap_or_else(|| "no providers available".to_string());
        tracing::error!(attempts = total, last_error = %last_error, "All providers failed");

        Err(Error::ChainExhausted {
            attempts: total,
            last_error,
            failures,
        })
    }

    async fn invoke_once(&self, provider: &dyn Provider, request: &GenerationRequest) -> Result<serde_json::Value> {
        match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, provider.invoke(request))
                .await
                .map_err(|_| Error::timeout(format!("{} did not respond within {:?}", provider.name(), limit)))?,
            None => provider.invoke(request).await,
        }
    }
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("providers", &self.provider_names())
            .field("delay", &self.delay)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}
