use crate::fetcher::Fetcher;
use crate::parser::FeedParser;
use crate::traits::PullSource;
use crate::types::{Article, Result, Source};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Feed-pull adapter: download an RSS/Atom document and parse it
pub struct RssFeedSource {
    fetcher: Arc<Fetcher>,
}

impl RssFeedSource {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PullSource for RssFeedSource {
    async fn pull(&self, source: &Source) -> Result<Vec<Article>> {
        let content = self.fetcher.fetch_text(&source.endpoint).await?;
        let fetched_at = Utc::now();

        let articles = FeedParser::parse_articles(source, &content, fetched_at)?;
        debug!("Pulled {} articles from RSS feed {}", articles.len(), source.name);
        Ok(articles)
    }
}
