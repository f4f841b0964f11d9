use crate::config::FetchConfig;
use crate::types::{AggregatorError, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

/// Shared HTTP client. Classifies responses into the pipeline's error taxonomy;
/// retries and timeouts are applied by the caller.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    /// Download a document body as text
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        debug!("Fetching document: {}", url);
        let response = self.send(self.client.get(url)).await?;
        let content = response.text().await?;
        debug!("Fetched {} ({} bytes)", url, content.len());
        Ok(content)
    }

    /// Send a prepared request and decode the body as JSON
    pub async fn fetch_json(&self, request: RequestBuilder) -> Result<serde_json::Value> {
        let response = self.send(request).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| AggregatorError::Parse(format!("invalid JSON document: {}", e)))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(AggregatorError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            return Err(AggregatorError::HttpStatus {
                status: status.as_u16(),
            });
        }

        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_feed_size_mb {
                return Err(AggregatorError::General(format!(
                    "response too large: {}MB",
                    size_mb
                )));
            }
        }

        Ok(response)
    }
}
