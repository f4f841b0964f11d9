use crate::fetcher::Fetcher;
use crate::sources::decode_entries;
use crate::traits::PullSource;
use crate::types::{AggregatorError, Article, Result, Source};
use crate::utils::time::from_unix;
use crate::utils::url::extract_domain;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Item requests kept in flight while expanding a Hacker News story list
const HN_ITEM_CONCURRENCY: usize = 8;

/// Unauthenticated community feeds, told apart by endpoint host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FreeProvider {
    HackerNews,
    Reddit,
}

impl FreeProvider {
    pub fn from_endpoint(endpoint: &str) -> Result<Self> {
        let host = extract_domain(endpoint).ok_or_else(|| {
            AggregatorError::Config(format!("invalid free-feed endpoint '{}'", endpoint))
        })?;

        if host == "hacker-news.firebaseio.com" {
            Ok(FreeProvider::HackerNews)
        } else if host == "reddit.com" || host.ends_with(".reddit.com") {
            Ok(FreeProvider::Reddit)
        } else {
            Err(AggregatorError::Config(format!(
                "no free-feed decoder for host '{}'",
                host
            )))
        }
    }
}

/// Free-feed adapter: public JSON listings, no credentials
pub struct FreeFeedSource {
    fetcher: Arc<Fetcher>,
    provider: FreeProvider,
}

impl FreeFeedSource {
    pub fn new(fetcher: Arc<Fetcher>, provider: FreeProvider) -> Self {
        Self { fetcher, provider }
    }

    async fn pull_hacker_news(&self, source: &Source) -> Result<Vec<Article>> {
        let listing = self
            .fetcher
            .fetch_json(self.fetcher.get(&source.endpoint))
            .await?;
        let ids = parse_hn_story_ids(&listing, source.max_articles)?;
        let base = Url::parse(&source.endpoint)?;

        let fetcher = &self.fetcher;
        let items: Vec<Value> = stream::iter(ids)
            .map(|id| {
                let item_url = base.join(&format!("item/{}.json", id));
                async move {
                    let item_url = item_url.map_err(AggregatorError::from)?;
                    fetcher.fetch_json(fetcher.get(item_url.as_str())).await
                }
            })
            .buffered(HN_ITEM_CONCURRENCY)
            .filter_map(|item| async move {
                match item {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!("Skipping Hacker News item: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(parse_hn_items(source, &items, Utc::now()))
    }

    async fn pull_reddit(&self, source: &Source) -> Result<Vec<Article>> {
        let limit = source.max_articles.to_string();
        let request = self
            .fetcher
            .get(&source.endpoint)
            .query(&[("limit", limit.as_str())]);
        let body = self.fetcher.fetch_json(request).await?;
        parse_reddit(source, &body, Utc::now())
    }
}

#[async_trait]
impl PullSource for FreeFeedSource {
    async fn pull(&self, source: &Source) -> Result<Vec<Article>> {
        let articles = match self.provider {
            FreeProvider::HackerNews => self.pull_hacker_news(source).await?,
            FreeProvider::Reddit => self.pull_reddit(source).await?,
        };
        debug!("Pulled {} articles from free feed {}", articles.len(), source.name);
        Ok(articles)
    }
}

/// First `limit` story ids from a `topstories.json` listing
pub fn parse_hn_story_ids(listing: &Value, limit: usize) -> Result<Vec<u64>> {
    let ids = listing
        .as_array()
        .ok_or_else(|| AggregatorError::Parse("Hacker News listing is not an array".to_string()))?;
    Ok(ids.iter().filter_map(Value::as_u64).take(limit).collect())
}

#[derive(Debug, Deserialize)]
struct HnItem {
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    url: Option<String>,
    time: Option<i64>,
    #[serde(default)]
    dead: bool,
    #[serde(default)]
    deleted: bool,
}

/// Convert fetched Hacker News items; only live stories with an outbound link are kept
pub fn parse_hn_items(source: &Source, items: &[Value], fetched_at: DateTime<Utc>) -> Vec<Article> {
    decode_entries::<HnItem>(items, &source.id)
        .into_iter()
        .filter(|item| item.kind.as_deref() == Some("story") && !item.dead && !item.deleted)
        .filter_map(|item| {
            let title = item.title?;
            let url = item.url?;
            let published_at = item.time.and_then(from_unix);
            Article::new(source, &title, &url, published_at, fetched_at)
        })
        .take(source.max_articles)
        .collect()
}

#[derive(Debug, Deserialize)]
struct RedditChild {
    data: RedditPost,
}

#[derive(Debug, Deserialize)]
struct RedditPost {
    title: String,
    url: Option<String>,
    created_utc: Option<f64>,
    #[serde(default)]
    is_self: bool,
    #[serde(default)]
    stickied: bool,
}

/// Decode a subreddit `.json` listing, skipping self posts and pinned posts
pub fn parse_reddit(
    source: &Source,
    body: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<Article>> {
    let children = body
        .pointer("/data/children")
        .and_then(Value::as_array)
        .ok_or_else(|| AggregatorError::Parse("Reddit listing has no children".to_string()))?;

    let articles = decode_entries::<RedditChild>(children, &source.id)
        .into_iter()
        .map(|child| child.data)
        .filter(|post| !post.is_self && !post.stickied)
        .filter_map(|post| {
            let url = post.url?;
            let published_at = post.created_utc.and_then(|secs| from_unix(secs as i64));
            Article::new(source, &post.title, &url, published_at, fetched_at)
        })
        .take(source.max_articles)
        .collect();
    Ok(articles)
}
