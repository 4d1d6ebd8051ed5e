//! HTTP client for an OpenAI-compatible chat-completions endpoint.
//!
//! One request per call: `POST {base_url}/chat/completions` with a bearer
//! key. Status codes are classified into [`GenerationError`] variants so the
//! stage processor can decide whether to retry.

use std::time::Duration;

use async_trait::async_trait;
use quillcast_core::TokenUsage;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Content and accounting for one successful completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    /// Model that actually served the request, as echoed by the provider.
    pub model: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Anything that can turn a completion request into model output.
///
/// Implemented by [`GenerationClient`]; tests substitute scripted fakes.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, GenerationError>;
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for std::sync::Arc<G> {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, GenerationError> {
        (**self).complete(request).await
    }
}

/// Client for the generation service.
///
/// Use [`GenerationClient::new`] for production or
/// [`GenerationClient::with_base_url`] to point at a mock server in tests.
/// A missing API key is not a construction error; every call then fails
/// with [`GenerationError::MissingApiKey`].
pub struct GenerationClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GenerationClient {
    /// # Errors
    ///
    /// Returns [`GenerationError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(api_key: Option<&str>, timeout_secs: u64) -> Result<Self, GenerationError> {
        Self::with_base_url(api_key, timeout_secs, DEFAULT_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns [`GenerationError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn with_base_url(
        api_key: Option<&str>,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("quillcast/0.1 (content-pipeline)")
            .build()?;

        Ok(Self {
            client,
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_owned),
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn classify_status(status: StatusCode, body: String) -> GenerationError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited(body),
            StatusCode::PAYMENT_REQUIRED => GenerationError::PaymentRequired(body),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::Unauthorized {
                status: status.as_u16(),
                body,
            },
            _ => GenerationError::Upstream {
                status: status.as_u16(),
                body,
            },
        }
    }
}

#[async_trait]
impl Generator for GenerationClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::MissingApiKey)?;
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(model = %request.model, "generation request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Self::classify_status(status, body));
        }

        let envelope: CompletionEnvelope =
            serde_json::from_str(&body).map_err(|e| GenerationError::Deserialize {
                context: "chat completion envelope".to_string(),
                source: e,
            })?;

        let content = envelope
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)?;

        Ok(Completion {
            content,
            model: envelope.model.unwrap_or_else(|| request.model.clone()),
            usage: envelope.usage.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_status_codes() {
        assert!(matches!(
            GenerationClient::classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            GenerationError::RateLimited(_)
        ));
        assert!(matches!(
            GenerationClient::classify_status(StatusCode::PAYMENT_REQUIRED, String::new()),
            GenerationError::PaymentRequired(_)
        ));
        assert!(matches!(
            GenerationClient::classify_status(StatusCode::FORBIDDEN, String::new()),
            GenerationError::Unauthorized { status: 403, .. }
        ));
        assert!(matches!(
            GenerationClient::classify_status(StatusCode::BAD_GATEWAY, String::new()),
            GenerationError::Upstream { status: 502, .. }
        ));
    }

    #[test]
    fn blank_api_key_is_treated_as_missing() {
        let client = GenerationClient::with_base_url(Some("  "), 5, "http://localhost/")
            .expect("client construction should not fail");
        assert!(client.api_key.is_none());
        assert_eq!(client.base_url, "http://localhost");
    }
}
