//! Best-effort tag invalidation for shared caches outside this process.
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Clears a logical cache tag somewhere else (edge cache, other instances).
/// Implementations must swallow their own failures.
#[async_trait]
pub trait TagInvalidator: Send + Sync {
    async fn invalidate_tag(&self, tag: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvalidator;

#[async_trait]
impl TagInvalidator for NoopInvalidator {
    async fn invalidate_tag(&self, _tag: &str) {}
}

/// POSTs `{"tag": "<tag>"}` to a revalidation endpoint.
#[derive(Clone)]
pub struct WebhookInvalidator {
    http: Client,
    endpoint: Url,
    token: Option<String>,
}

impl fmt::Debug for WebhookInvalidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookInvalidator")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl WebhookInvalidator {
    pub fn new(endpoint: Url, token: Option<String>) -> reqwest::Result<Self> {
        let http = Client::builder()
            .user_agent("nanbakadai-banners/0.1")
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            endpoint,
            token,
        })
    }

    pub fn build_request(&self, tag: &str) -> reqwest::Result<reqwest::Request> {
        let mut req = self
            .http
            .post(self.endpoint.clone())
            .json(&json!({ "tag": tag }));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req.build()
    }
}

#[async_trait]
impl TagInvalidator for WebhookInvalidator {
    async fn invalidate_tag(&self, tag: &str) {
        let request = match self.build_request(tag) {
            Ok(r) => r,
            Err(err) => {
                warn!(?err, tag, "failed to build revalidation request");
                return;
            }
        };
        match self.http.execute(request).await {
            Ok(res) if res.status().is_success() => {
                debug!(tag, "revalidated cache tag");
            }
            Ok(res) => {
                let status = res.status();
                let body = res.text().await.unwrap_or_default();
                warn!(%status, body = %body, tag, "revalidation endpoint rejected tag");
            }
            Err(err) => {
                warn!(?err, tag, "revalidation endpoint unreachable");
            }
        }
    }
}
