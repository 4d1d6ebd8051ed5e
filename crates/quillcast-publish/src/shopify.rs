//! Shopify Admin API blog articles, authenticated with
//! `X-Shopify-Access-Token`.

use async_trait::async_trait;
use quillcast_core::Platform;
use quillcast_db::IntegrationRow;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::publisher::{build_http_client, normalize_base_url, ArticlePost, PublishConfig, Publisher};
use crate::retry::retry_with_backoff;

const API_VERSION: &str = "2024-01";
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

#[derive(Debug, Serialize)]
struct ArticleEnvelope<'a> {
    article: ArticleBody<'a>,
}

#[derive(Debug, Serialize)]
struct ArticleBody<'a> {
    title: &'a str,
    body_html: &'a str,
    published: bool,
    summary_html: &'a str,
    tags: String,
}

#[derive(Debug, Deserialize)]
struct ArticleResponse {
    article: ArticleId,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct BlogsResponse {
    blogs: Vec<BlogId>,
}

#[derive(Debug, Deserialize)]
struct BlogId {
    id: u64,
}

pub struct ShopifyClient {
    client: Client,
    config: PublishConfig,
}

impl ShopifyClient {
    /// # Errors
    ///
    /// Returns [`PublishError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(config: PublishConfig) -> Result<Self, PublishError> {
        Ok(Self {
            client: build_http_client(&config, "quillcast/0.1 (shopify)")?,
            config,
        })
    }

    /// The integration's pinned blog, or the shop's first blog.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::BlogResolution`] if the blog list cannot be
    /// fetched or is empty.
    pub async fn resolve_blog_id(
        &self,
        shop: &str,
        integration: &IntegrationRow,
    ) -> Result<String, PublishError> {
        if let Some(blog_id) = integration
            .blog_id
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
        {
            return Ok(blog_id.to_string());
        }

        let url = format!("{shop}/admin/api/{API_VERSION}/blogs.json");
        let blogs = retry_with_backoff(self.config.max_retries, self.config.backoff_base_ms, || {
            let request = self
                .client
                .get(&url)
                .header(ACCESS_TOKEN_HEADER, &integration.secret);
            async move {
                let response = request.send().await?;
                let text = checked_body(response).await?;
                serde_json::from_str::<BlogsResponse>(&text).map_err(|e| {
                    PublishError::Deserialize {
                        context: "shopify blogs".to_string(),
                        source: e,
                    }
                })
            }
        })
        .await
        .map_err(|e| PublishError::BlogResolution(e.to_string()))?;

        blogs
            .blogs
            .first()
            .map(|b| b.id.to_string())
            .ok_or_else(|| PublishError::BlogResolution("shop has no blogs".to_string()))
    }
}

#[async_trait]
impl Publisher for ShopifyClient {
    async fn publish(
        &self,
        integration: &IntegrationRow,
        post: &ArticlePost,
        existing_id: Option<&str>,
    ) -> Result<String, PublishError> {
        let shop = normalize_base_url(&integration.base_url)?;
        let blog_id = self.resolve_blog_id(&shop, integration).await?;
        let articles = format!("{shop}/admin/api/{API_VERSION}/blogs/{blog_id}/articles");
        let envelope = ArticleEnvelope {
            article: ArticleBody {
                title: &post.title,
                body_html: &post.html_content,
                published: integration.publish_status == "publish",
                summary_html: &post.meta_description,
                tags: post.keywords.join(", "),
            },
        };

        retry_with_backoff(self.config.max_retries, self.config.backoff_base_ms, || {
            let request = match existing_id {
                Some(id) => self.client.put(format!("{articles}/{id}.json")),
                None => self.client.post(format!("{articles}.json")),
            }
            .header(ACCESS_TOKEN_HEADER, &integration.secret)
            .json(&envelope);
            async move {
                let response = request.send().await?;
                let text = checked_body(response).await?;
                let parsed: ArticleResponse =
                    serde_json::from_str(&text).map_err(|e| PublishError::Deserialize {
                        context: "shopify article response".to_string(),
                        source: e,
                    })?;
                Ok(parsed.article.id.to_string())
            }
        })
        .await
    }
}

async fn checked_body(response: reqwest::Response) -> Result<String, PublishError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PublishError::RateLimited {
            platform: Platform::Shopify,
        });
    }
    let text = response.text().await?;
    if !status.is_success() {
        return Err(PublishError::Publish {
            platform: Platform::Shopify,
            status: status.as_u16(),
            body: text,
        });
    }
    Ok(text)
}
