//! Generation provider abstraction
//!
//! A provider is one interchangeable backend that turns a [`GenerationRequest`]
//! into structured output. Concrete providers live in [`crate::openai_compat`]
//! and [`crate::image`]; [`FnProvider`] adapts a closure.

use crate::error::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Input payload handed to a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// System-level instructions
    pub instructions: String,
    /// User prompt
    pub prompt: String,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens for completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Create a new request
    pub fn new(instructions: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A generation backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name used in logs and diagnostics
    fn name(&self) -> &str;

    /// Produce structured output for the request
    async fn invoke(&self, request: &GenerationRequest) -> Result<serde_json::Value>;
}

/// Shared handle to a provider
pub type SharedProvider = Arc<dyn Provider>;

type InvokeFn = dyn Fn(GenerationRequest) -> BoxFuture<'static, Result<serde_json::Value>> + Send + Sync;

/// Provider backed by a closure
pub struct FnProvider {
    name: String,
    f: Box<InvokeFn>,
}

impl FnProvider {
    /// Wrap an async closure as a provider
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(GenerationRequest) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(move |request| Box::pin(f(request))),
        }
    }

    /// Wrap into a shared handle
    pub fn shared(self) -> SharedProvider {
        Arc::new(self)
    }
}

impl std::fmt::Debug for FnProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProvider").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Provider for FnProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<serde_json::Value> {
        (self.f)(request.clone()).await
    }
}
