//! WordPress REST API (`/wp-json/wp/v2/posts`) with application-password
//! basic auth.

use async_trait::async_trait;
use quillcast_core::Platform;
use quillcast_db::IntegrationRow;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::publisher::{build_http_client, normalize_base_url, ArticlePost, PublishConfig, Publisher};
use crate::retry::retry_with_backoff;

#[derive(Debug, Serialize)]
struct PostBody<'a> {
    title: &'a str,
    content: &'a str,
    status: &'a str,
    excerpt: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: u64,
}

pub struct WordPressClient {
    client: Client,
    config: PublishConfig,
}

impl WordPressClient {
    /// # Errors
    ///
    /// Returns [`PublishError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(config: PublishConfig) -> Result<Self, PublishError> {
        Ok(Self {
            client: build_http_client(&config, "quillcast/0.1 (wordpress)")?,
            config,
        })
    }
}

#[async_trait]
impl Publisher for WordPressClient {
    async fn publish(
        &self,
        integration: &IntegrationRow,
        post: &ArticlePost,
        existing_id: Option<&str>,
    ) -> Result<String, PublishError> {
        let username = integration
            .username
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                PublishError::InvalidIntegration("WordPress integration has no username".into())
            })?;
        let site = normalize_base_url(&integration.base_url)?;
        let url = match existing_id {
            Some(id) => format!("{site}/wp-json/wp/v2/posts/{id}"),
            None => format!("{site}/wp-json/wp/v2/posts"),
        };
        let body = PostBody {
            title: &post.title,
            content: &post.html_content,
            status: &integration.publish_status,
            excerpt: &post.meta_description,
        };

        retry_with_backoff(self.config.max_retries, self.config.backoff_base_ms, || {
            let request = self
                .client
                .post(&url)
                .basic_auth(username, Some(&integration.secret))
                .json(&body);
            async move {
                let response = request.send().await?;
                let status = response.status();
                if status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(PublishError::RateLimited {
                        platform: Platform::Wordpress,
                    });
                }
                let text = response.text().await?;
                if !status.is_success() {
                    return Err(PublishError::Publish {
                        platform: Platform::Wordpress,
                        status: status.as_u16(),
                        body: text,
                    });
                }
                let parsed: PostResponse =
                    serde_json::from_str(&text).map_err(|e| PublishError::Deserialize {
                        context: "wordpress post response".to_string(),
                        source: e,
                    })?;
                Ok(parsed.id.to_string())
            }
        })
        .await
    }
}
