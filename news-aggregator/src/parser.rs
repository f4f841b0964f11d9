use crate::types::{AggregatorError, Article, Result, Source};
use crate::utils::text::{smart_truncate, strip_html};
use chrono::{DateTime, Utc};
use feed_rs::parser;
use std::collections::HashSet;
use tracing::debug;

const SUMMARY_MAX_CHARS: usize = 300;

pub struct FeedParser;

impl FeedParser {
    /// Parse an RSS/Atom document into articles for `source`.
    ///
    /// Entries without a title or link are skipped one by one; only a document that
    /// cannot be parsed at all is an error.
    pub fn parse_articles(
        source: &Source,
        content: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<Vec<Article>> {
        debug!("Parsing feed content for {} ({} bytes)", source.id, content.len());

        if !Self::is_valid_feed_content(content) {
            return Err(AggregatorError::Parse(format!(
                "{} did not return an RSS/Atom document",
                source.endpoint
            )));
        }

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| AggregatorError::Parse(format!("Failed to parse feed: {}", e)))?;

        let total = feed.entries.len();
        let mut seen_urls = HashSet::new();
        let mut articles = Vec::new();

        for entry in feed.entries {
            if articles.len() >= source.max_articles {
                break;
            }
            match Self::parse_entry(source, entry, fetched_at) {
                Some(article) => {
                    if seen_urls.insert(article.url.clone()) {
                        articles.push(article);
                    } else {
                        debug!("Skipping duplicate link in {}: {}", source.id, article.url);
                    }
                }
                None => debug!("Skipping unusable entry in {}", source.id),
            }
        }

        debug!("Parsed {}/{} entries from {}", articles.len(), total, source.id);
        Ok(articles)
    }

    fn parse_entry(
        source: &Source,
        entry: feed_rs::model::Entry,
        fetched_at: DateTime<Utc>,
    ) -> Option<Article> {
        let title = entry.title.map(|t| strip_html(&t.content))?;
        let url = entry.links.first()?.href.clone();

        // Prefer the publish date, then the update date; the article falls back to fetch time
        let published_at = entry.published.or(entry.updated);

        let summary = entry
            .summary
            .map(|s| smart_truncate(&strip_html(&s.content), SUMMARY_MAX_CHARS));

        Article::new(source, &title, &url, published_at, fetched_at)
            .map(|a| a.with_summary(summary))
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        let content_lower = content.to_lowercase();

        content_lower.contains("<rss")
            || content_lower.contains("<feed")
            || content_lower.contains("<rdf:rdf")
            || content_lower.contains("<channel")
    }
}
