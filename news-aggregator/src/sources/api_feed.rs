use crate::fetcher::Fetcher;
use crate::sources::decode_entries;
use crate::traits::PullSource;
use crate::types::{AggregatorError, Article, Result, Source};
use crate::utils::text::{smart_truncate, strip_html};
use crate::utils::time::parse_rfc3339;
use crate::utils::url::extract_domain;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const SUMMARY_MAX_CHARS: usize = 300;

/// Authenticated JSON news APIs, told apart by endpoint host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiProvider {
    NewsApi,
    Guardian,
}

impl ApiProvider {
    pub fn from_endpoint(endpoint: &str) -> Result<Self> {
        let host = extract_domain(endpoint).ok_or_else(|| {
            AggregatorError::Config(format!("invalid API endpoint '{}'", endpoint))
        })?;

        if host.ends_with("newsapi.org") {
            Ok(ApiProvider::NewsApi)
        } else if host.ends_with("guardianapis.com") {
            Ok(ApiProvider::Guardian)
        } else {
            Err(AggregatorError::Config(format!(
                "no API decoder for host '{}'",
                host
            )))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ApiProvider::NewsApi => "NewsAPI",
            ApiProvider::Guardian => "The Guardian",
        }
    }
}

/// API-pull adapter: authenticated request plus JSON decode
pub struct ApiFeedSource {
    fetcher: Arc<Fetcher>,
    provider: ApiProvider,
    api_key: String,
}

impl ApiFeedSource {
    pub fn new(fetcher: Arc<Fetcher>, provider: ApiProvider, api_key: String) -> Self {
        Self {
            fetcher,
            provider,
            api_key,
        }
    }
}

#[async_trait]
impl PullSource for ApiFeedSource {
    async fn pull(&self, source: &Source) -> Result<Vec<Article>> {
        let body = match self.provider {
            ApiProvider::NewsApi => {
                let page_size = source.max_articles.min(100).to_string();
                let request = self
                    .fetcher
                    .get(&source.endpoint)
                    .header("X-Api-Key", &self.api_key)
                    .query(&[("language", "en"), ("pageSize", page_size.as_str())]);
                self.fetcher.fetch_json(request).await?
            }
            ApiProvider::Guardian => {
                let page_size = source.max_articles.min(50).to_string();
                let request = self.fetcher.get(&source.endpoint).query(&[
                    ("page-size", page_size.as_str()),
                    ("show-fields", "standfirst"),
                    ("order-by", "newest"),
                    ("api-key", self.api_key.as_str()),
                ]);
                self.fetcher.fetch_json(request).await?
            }
        };

        let fetched_at = Utc::now();
        let articles = match self.provider {
            ApiProvider::NewsApi => parse_newsapi(source, &body, fetched_at)?,
            ApiProvider::Guardian => parse_guardian(source, &body, fetched_at)?,
        };
        debug!(
            "Pulled {} articles from {} for {}",
            articles.len(),
            self.provider.name(),
            source.name
        );
        Ok(articles)
    }
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

/// Decode a NewsAPI `top-headlines`/`everything` response
pub fn parse_newsapi(
    source: &Source,
    body: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<Article>> {
    if body.get("status").and_then(Value::as_str) == Some("error") {
        let code = body.get("code").and_then(Value::as_str).unwrap_or("unknown");
        if code == "rateLimited" {
            return Err(AggregatorError::RateLimited { retry_after_secs: None });
        }
        return Err(AggregatorError::General(format!("NewsAPI error: {}", code)));
    }

    let entries = body
        .get("articles")
        .and_then(Value::as_array)
        .ok_or_else(|| AggregatorError::Parse("NewsAPI response has no articles".to_string()))?;

    let articles = decode_entries::<NewsApiArticle>(entries, &source.id)
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.filter(|t| t != "[Removed]")?;
            let url = entry.url?;
            let published_at = entry.published_at.as_deref().and_then(parse_rfc3339);
            let summary = entry.description.map(|d| smart_truncate(&d, SUMMARY_MAX_CHARS));
            Article::new(source, &title, &url, published_at, fetched_at)
                .map(|a| a.with_summary(summary))
        })
        .take(source.max_articles)
        .collect();
    Ok(articles)
}

#[derive(Debug, Deserialize)]
struct GuardianResult {
    #[serde(rename = "webTitle")]
    title: String,
    #[serde(rename = "webUrl")]
    url: String,
    #[serde(rename = "webPublicationDate")]
    published_at: Option<String>,
    #[serde(default)]
    fields: Option<GuardianFields>,
}

#[derive(Debug, Deserialize)]
struct GuardianFields {
    standfirst: Option<String>,
}

/// Decode a Guardian content API `search` response
pub fn parse_guardian(
    source: &Source,
    body: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<Article>> {
    let response = body
        .get("response")
        .ok_or_else(|| AggregatorError::Parse("Guardian response envelope missing".to_string()))?;

    if let Some(status) = response.get("status").and_then(Value::as_str) {
        if status != "ok" {
            let message = response
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(status);
            return Err(AggregatorError::General(format!("Guardian API error: {}", message)));
        }
    }

    let entries = response
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| AggregatorError::Parse("Guardian response has no results".to_string()))?;

    let articles = decode_entries::<GuardianResult>(entries, &source.id)
        .into_iter()
        .filter_map(|entry| {
            let published_at = entry.published_at.as_deref().and_then(parse_rfc3339);
            let summary = entry
                .fields
                .and_then(|f| f.standfirst)
                .map(|s| smart_truncate(&strip_html(&s), SUMMARY_MAX_CHARS));
            Article::new(source, &entry.title, &entry.url, published_at, fetched_at)
                .map(|a| a.with_summary(summary))
        })
        .take(source.max_articles)
        .collect();
    Ok(articles)
}
