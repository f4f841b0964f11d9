use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::dedup::content_fingerprint;
use crate::utils::text::normalize_title;

/// How a source is pulled: a feed document, an authenticated JSON API, or a free community feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rss,
    Api,
    Free,
}

impl SourceKind {
    pub fn parse(kind: &str) -> Result<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "rss" | "atom" | "feed" => Ok(SourceKind::Rss),
            "api" => Ok(SourceKind::Api),
            "free" | "free-feed" | "free_feed" => Ok(SourceKind::Free),
            other => Err(AggregatorError::Config(format!("unknown source kind '{}'", other))),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Rss => "rss",
            SourceKind::Api => "api",
            SourceKind::Free => "free",
        };
        f.write_str(name)
    }
}

/// A news source from the catalog. Never mutated once the pipeline is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub kind: SourceKind,
    pub category: String,
    /// Higher wins ties during dedup and ordering
    pub priority: i32,
    /// Per-fetch article cap
    pub max_articles: usize,
    /// Position in the catalog, the last ordering tie-breaker
    pub catalog_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub source_id: String,
    pub source_name: String,
    pub category: String,
    pub url: String,
    pub summary: Option<String>,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub priority: i32,
    #[serde(skip)]
    pub source_rank: usize,
    pub content_fingerprint: Uuid,
}

impl Article {
    /// Build an article for `source`. Returns `None` when the entry has no usable title.
    ///
    /// `published_at` falls back to `fetched_at` when the source omits it.
    pub fn new(
        source: &Source,
        title: &str,
        url: &str,
        published_at: Option<DateTime<Utc>>,
        fetched_at: DateTime<Utc>,
    ) -> Option<Self> {
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        if title.is_empty() {
            return None;
        }
        let url = url.trim().to_string();

        let identity = if url.is_empty() {
            normalize_title(&title)
        } else {
            url.clone()
        };
        let id = Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            format!("{}|{}", source.id, identity).as_bytes(),
        );

        Some(Self {
            id,
            content_fingerprint: content_fingerprint(&title, &source.category),
            title,
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            category: source.category.clone(),
            url,
            summary: None,
            published_at: published_at.unwrap_or(fetched_at),
            fetched_at,
            priority: source.priority,
            source_rank: source.catalog_index,
        })
    }

    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.summary = summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchStatus {
    Success,
    Failed,
    TimedOut,
    RateLimited,
}

impl FetchStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchStatus::Success)
    }
}

/// Outcome of pulling one source for one cycle.
///
/// `error` is present iff `status` is not `Success`; `articles` is empty on failure.
#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub source_id: String,
    pub status: FetchStatus,
    pub articles: Vec<Article>,
    pub error: Option<String>,
    pub fetched_at: DateTime<Utc>,
    /// Retries performed before this outcome (0 when the first attempt decided it)
    pub retries: u32,
    pub elapsed_ms: u64,
}

impl FetchResult {
    pub fn success(source_id: &str, articles: Vec<Article>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source_id: source_id.to_string(),
            status: FetchStatus::Success,
            articles,
            error: None,
            fetched_at,
            retries: 0,
            elapsed_ms: 0,
        }
    }

    pub fn failure(source_id: &str, error: &AggregatorError, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source_id: source_id.to_string(),
            status: error.status(),
            articles: Vec::new(),
            error: Some(error.to_string()),
            fetched_at,
            retries: 0,
            elapsed_ms: 0,
        }
    }

    /// Reported for sources still in flight when the cycle deadline passed
    pub fn deadline_exceeded(source_id: &str, deadline_ms: u64) -> Self {
        Self::failure(
            source_id,
            &AggregatorError::Timeout { after_ms: deadline_ms },
            Utc::now(),
        )
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}

/// Per-cycle source counts carried on a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub sources_skipped: usize,
}

/// The published output of one refresh cycle
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub cycle: u64,
    pub produced_at: DateTime<Utc>,
    /// Unique by fingerprint, newest first
    pub articles: Vec<Article>,
    /// Articles whose fingerprint was not in the previous batch
    pub delta: Vec<Article>,
    /// Ids of the articles flagged as breaking news, in batch order
    pub breaking: Vec<Uuid>,
    pub summary: CycleSummary,
}

impl Batch {
    pub fn has_new(&self) -> bool {
        !self.delta.is_empty()
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn breaking_count(&self) -> usize {
        self.breaking.len()
    }

    pub fn is_breaking(&self, article: &Article) -> bool {
        self.breaking.contains(&article.id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("Rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

impl AggregatorError {
    pub fn status(&self) -> FetchStatus {
        match self {
            AggregatorError::RateLimited { .. } => FetchStatus::RateLimited,
            AggregatorError::Timeout { .. } => FetchStatus::TimedOut,
            AggregatorError::Http(e) if e.is_timeout() => FetchStatus::TimedOut,
            _ => FetchStatus::Failed,
        }
    }

    /// Whether another attempt in the same cycle could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AggregatorError::Http(_)
            | AggregatorError::Timeout { .. }
            | AggregatorError::RateLimited { .. }
            | AggregatorError::Io(_) => true,
            AggregatorError::HttpStatus { status } => *status >= 500 || *status == 408,
            AggregatorError::Parse(_)
            | AggregatorError::Config(_)
            | AggregatorError::InvalidUrl(_)
            | AggregatorError::Serialization(_)
            | AggregatorError::General(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
