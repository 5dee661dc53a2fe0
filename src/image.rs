//! Prompt-addressed image provider
//!
//! Image backends of this kind render an image at
//! `{base_url}/prompt/{prompt}?width=..&height=..&seed=..`. The provider builds
//! that URL, optionally fetches it once to confirm the backend rendered it,
//! and returns `{"image_url": ...}`. A fresh seed per call keeps concurrent
//! attempts with the same prompt from producing the same image.

use crate::error::{Error, Result};
use crate::provider::{GenerationRequest, Provider};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use rand_core::{OsRng, RngCore};
use url::Url;

/// Image backend configuration
#[derive(Debug, Clone)]
pub struct ImageUrlConfig {
    /// Provider name used in logs
    pub name: String,
    /// Backend base URL
    pub base_url: Url,
    /// Optional model parameter
    pub model: Option<String>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Fetch the image before returning its URL
    pub verify: bool,
    /// Request timeout when verifying
    pub timeout: Duration,
}

impl ImageUrlConfig {
    /// Create a configuration with thumbnail dimensions (1280x720)
    pub fn new(name: impl Into<String>, base_url: Url) -> Self {
        Self {
            name: name.into(),
            base_url,
            model: None,
            width: 1280,
            height: 720,
            verify: true,
            timeout: Duration::from_secs(120),
        }
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the dimensions
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Toggle verification
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

/// Provider returning image URLs
pub struct ImageUrlProvider {
    client: Client,
    config: ImageUrlConfig,
}

impl ImageUrlProvider {
    /// Create a provider with its own HTTP client
    pub fn new(config: ImageUrlConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Build the image URL for a prompt and seed
    pub fn image_url(&self, prompt: &str, seed: u32) -> Result<Url> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(Error::invalid_input("image prompt is empty"));
        }

        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config(format!("{} cannot be used as an image base URL", self.config.base_url)))?
            .pop_if_empty()
            .push("prompt")
            .push(prompt);

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("width", &self.config.width.to_string())
                .append_pair("height", &self.config.height.to_string())
                .append_pair("seed", &seed.to_string())
                .append_pair("nologo", "true");
            if let Some(model) = &self.config.model {
                query.append_pair("model", model);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Provider for ImageUrlProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<serde_json::Value> {
        let seed = OsRng.next_u32();
        let url = self.image_url(&request.prompt, seed)?;

        if self.config.verify {
            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::provider(
                    &self.config.name,
                    format!("image request failed with status {status}"),
                ));
            }
            let is_image = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("image/"));
            if !is_image {
                return Err(Error::provider(&self.config.name, "backend did not return an image"));
            }
        }

        tracing::debug!(provider = %self.config.name, seed, "Image URL ready");
        Ok(json!({ "image_url": url.to_string(), "seed": seed }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn provider(base: &str, verify: bool) -> ImageUrlProvider {
        ImageUrlProvider::new(
            ImageUrlConfig::new("images", Url::parse(base).unwrap())
                .with_model("flux")
                .with_verify(verify),
        )
        .unwrap()
    }

    #[test]
    fn url_encodes_prompt_and_parameters() {
        let url = provider("https://img.example.com/", false)
            .image_url("cat & dog tutorial", 42)
            .unwrap();

        assert_eq!(url.path(), "/prompt/cat%20&%20dog%20tutorial");
        let query = url.query().unwrap();
        assert!(query.contains("width=1280"));
        assert!(query.contains("height=720"));
        assert!(query.contains("seed=42"));
        assert!(query.contains("model=flux"));
    }

    #[test]
    fn blank_prompt_is_rejected() {
        let err = provider("https://img.example.com", false).image_url("  ", 1).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unverified_invoke_returns_url() {
        let out = provider("https://img.example.com", false)
            .invoke(&GenerationRequest::new("", "bold thumbnail"))
            .await
            .unwrap();
        let url = out["image_url"].as_str().unwrap();
        assert!(url.starts_with("https://img.example.com/prompt/bold%20thumbnail?"));
    }

    #[tokio::test]
    async fn seed_changes_between_calls() {
        let images = provider("https://img.example.com", false);
        let request = GenerationRequest::new("", "same prompt");

        let mut seeds = std::collections::HashSet::new();
        for _ in 0..8 {
            let out = images.invoke(&request).await.unwrap();
            let seed = out["seed"].as_u64().unwrap();
            assert!(out["image_url"].as_str().unwrap().contains(&format!("seed={seed}")));
            seeds.insert(seed);
        }
        // eight draws from the OS generator; a collision here means a fixed seed
        assert!(seeds.len() > 1);
    }

    #[tokio::test]
    async fn verification_accepts_images() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/prompt/".to_string()))
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body([0xff_u8, 0xd8, 0xff])
            .create_async()
            .await;

        let out = provider(&server.url(), true)
            .invoke(&GenerationRequest::new("", "thumbnail"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(out["image_url"].as_str().unwrap().contains("/prompt/thumbnail"));
    }

    #[tokio::test]
    async fn verification_rejects_error_pages() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/prompt/".to_string()))
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>queue full</html>")
            .create_async()
            .await;

        let err = provider(&server.url(), true)
            .invoke(&GenerationRequest::new("", "thumbnail"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not return an image"));
    }
}
