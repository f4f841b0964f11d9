use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::middleware::RetryPolicy;
use crate::sources::api_feed::ApiProvider;
use crate::types::{AggregatorError, Result};

/// Headline words that mark an article as breaking news
pub const DEFAULT_BREAKING_KEYWORDS: [&str; 10] = [
    "breaking",
    "urgent",
    "alert",
    "flash",
    "developing",
    "halt",
    "suspend",
    "emergency",
    "crash",
    "surge",
];

/// Longest TTL, cool-down, window or delay accepted by `PipelineConfig::validate`
pub const MAX_DURATION: Duration = Duration::from_secs(30 * 24 * 3600);

/// Normal terminal use, or the high-frequency "trading" mode with a faster tick and a larger batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperatingMode {
    #[default]
    Normal,
    HighFrequency,
}

/// HTTP client settings shared by every adapter
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub max_redirects: usize,
    pub max_feed_size_mb: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "news-aggregator/0.1".to_string(),
            connect_timeout: Duration::from_secs(4),
            max_redirects: 5,
            max_feed_size_mb: 10,
        }
    }
}

/// Everything the pipeline is tuned by.
///
/// Built by the caller and passed in; nothing is read from globals.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: OperatingMode,
    pub refresh_interval: Duration,
    pub concurrency_limit: usize,
    pub per_fetch_timeout: Duration,
    /// How long a cycle waits for outstanding sources before publishing without them
    pub cycle_deadline: Duration,
    pub cache_ttl: Duration,
    /// TTL for non-success results, kept short so a dead source is retried soon but not every tick
    pub failure_cache_ttl: Duration,
    pub cache_capacity: usize,
    pub dedup_window: Duration,
    pub retry: RetryPolicy,
    pub degrade_after_failures: u32,
    pub cool_down: Duration,
    pub batch_cap: usize,
    pub max_articles_per_source: usize,
    /// Empty means every category
    pub category_filter: BTreeSet<String>,
    pub shutdown_grace: Duration,
    /// Matched case-insensitively against titles and summaries; empty disables the flag
    pub breaking_keywords: Vec<String>,
    pub http: FetchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Normal,
            refresh_interval: Duration::from_secs(1),
            concurrency_limit: 12,
            per_fetch_timeout: Duration::from_millis(10_000),
            cycle_deadline: Duration::from_millis(15_000),
            cache_ttl: Duration::from_secs(60),
            failure_cache_ttl: Duration::from_secs(10),
            cache_capacity: 256,
            dedup_window: Duration::from_secs(3 * 3600),
            retry: RetryPolicy::default(),
            degrade_after_failures: 3,
            cool_down: Duration::from_secs(60),
            batch_cap: 50,
            max_articles_per_source: 20,
            category_filter: BTreeSet::new(),
            shutdown_grace: Duration::from_secs(2),
            breaking_keywords: DEFAULT_BREAKING_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            http: FetchConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn high_frequency() -> Self {
        Self::for_mode(OperatingMode::HighFrequency)
    }

    /// Defaults for `mode`: refresh interval and batch cap differ between modes
    pub fn for_mode(mode: OperatingMode) -> Self {
        let mut config = Self::default();
        config.mode = mode;
        if mode == OperatingMode::HighFrequency {
            config.refresh_interval = Duration::from_millis(500);
            config.batch_cap = 100;
        }
        config
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.category_filter = categories
            .into_iter()
            .map(|c| c.as_ref().trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        self
    }

    pub fn matches_category(&self, category: &str) -> bool {
        self.category_filter.is_empty()
            || self
                .category_filter
                .contains(&category.trim().to_ascii_lowercase())
    }

    /// Reject settings that would make the pipeline misbehave. Called before any cycle runs.
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str); 8] = [
            (self.refresh_interval.is_zero(), "refresh interval must be positive"),
            (self.concurrency_limit == 0, "concurrency limit must be at least 1"),
            (self.per_fetch_timeout.is_zero(), "per-fetch timeout must be positive"),
            (self.cycle_deadline.is_zero(), "cycle deadline must be positive"),
            (self.cache_capacity == 0, "cache capacity must be at least 1"),
            (self.batch_cap == 0, "batch cap must be at least 1"),
            (self.degrade_after_failures == 0, "degrade threshold must be at least 1"),
            (self.max_articles_per_source == 0, "per-source article cap must be at least 1"),
        ];
        if let Some((_, message)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(AggregatorError::Config(message.to_string()));
        }
        let bounded = [
            ("refresh interval", self.refresh_interval),
            ("per-fetch timeout", self.per_fetch_timeout),
            ("cycle deadline", self.cycle_deadline),
            ("cache TTL", self.cache_ttl),
            ("failure cache TTL", self.failure_cache_ttl),
            ("dedup window", self.dedup_window),
            ("cool-down", self.cool_down),
            ("retry cap", self.retry.max_delay),
            ("shutdown grace", self.shutdown_grace),
        ];
        if let Some((name, _)) = bounded.iter().find(|(_, value)| *value > MAX_DURATION) {
            return Err(AggregatorError::Config(format!(
                "{} must not exceed {} days",
                name,
                MAX_DURATION.as_secs() / 86_400
            )));
        }
        if self.retry.rate_limit_factor > 64 {
            return Err(AggregatorError::Config(
                "rate-limit backoff factor must not exceed 64".to_string(),
            ));
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(AggregatorError::Config(
                "retry cap must not be below the retry base delay".to_string(),
            ));
        }
        if self.retry.rate_limit_factor == 0 {
            return Err(AggregatorError::Config(
                "rate-limit backoff factor must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Credentials for the authenticated news APIs
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub news_api: Option<String>,
    pub guardian: Option<String>,
}

impl ApiKeys {
    /// Read `NEWS_API_KEY` / `GUARDIAN_API_KEY`. Only the CLI layer calls this.
    pub fn from_env() -> Self {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            news_api: read("NEWS_API_KEY"),
            guardian: read("GUARDIAN_API_KEY"),
        }
    }

    pub fn key_for(&self, provider: ApiProvider) -> Option<&str> {
        match provider {
            ApiProvider::NewsApi => self.news_api.as_deref(),
            ApiProvider::Guardian => self.guardian.as_deref(),
        }
    }
}
