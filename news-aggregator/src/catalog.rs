use crate::config::{ApiKeys, PipelineConfig};
use crate::sources::{ApiProvider, FreeProvider};
use crate::types::{AggregatorError, Result, Source, SourceKind};
use crate::utils::text::slugify;
use crate::utils::url::is_valid_feed_url;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// One record of the source catalog as written in a catalog file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub endpoint: String,
    pub kind: String,
    pub category: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub max_articles: Option<usize>,
}

fn default_priority() -> i32 {
    1
}

impl CatalogEntry {
    pub fn new(name: &str, endpoint: &str, kind: &str, category: &str, priority: i32) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            kind: kind.to_string(),
            category: category.to_string(),
            priority,
            max_articles: None,
        }
    }

    pub fn with_max_articles(mut self, max_articles: usize) -> Self {
        self.max_articles = Some(max_articles);
        self
    }
}

/// Ordered list of sources; order is the last tie-breaker when ranking articles
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    entries: Vec<CatalogEntry>,
}

impl SourceCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Parse a JSON array of catalog entries
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        Ok(Self::new(entries))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&json)?;
        info!("Loaded {} catalog entries from {}", catalog.entries.len(), path.display());
        Ok(catalog)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate the catalog and turn it into the pipeline's source set.
    ///
    /// Unknown kinds, bad endpoints, duplicate ids and a category filter that selects nothing are
    /// configuration errors. API sources without a key are left out with a warning.
    pub fn into_sources(self, config: &PipelineConfig, keys: &ApiKeys) -> Result<Vec<Source>> {
        let mut seen_ids = HashSet::new();
        let mut sources = Vec::new();

        for (index, entry) in self.entries.into_iter().enumerate() {
            let kind = SourceKind::parse(&entry.kind)?;
            let id = slugify(&entry.name);
            if id.is_empty() {
                return Err(AggregatorError::Config(format!(
                    "catalog entry {} has no usable name",
                    index
                )));
            }
            if !seen_ids.insert(id.clone()) {
                return Err(AggregatorError::Config(format!("duplicate source id '{}'", id)));
            }
            if !is_valid_feed_url(&entry.endpoint) {
                return Err(AggregatorError::Config(format!(
                    "source '{}' has invalid endpoint '{}'",
                    id, entry.endpoint
                )));
            }
            if entry.max_articles == Some(0) {
                return Err(AggregatorError::Config(format!(
                    "source '{}' has a zero article cap",
                    id
                )));
            }

            let api_provider = match kind {
                SourceKind::Api => Some(ApiProvider::from_endpoint(&entry.endpoint)?),
                SourceKind::Free => {
                    FreeProvider::from_endpoint(&entry.endpoint)?;
                    None
                }
                SourceKind::Rss => None,
            };

            if !config.matches_category(&entry.category) {
                debug!("Filtered out {} (category {})", id, entry.category);
                continue;
            }
            if let Some(provider) = api_provider {
                if keys.key_for(provider).is_none() {
                    warn!("Skipping {}: no API key configured for {}", entry.name, provider.name());
                    continue;
                }
            }

            sources.push(Source {
                id,
                name: entry.name,
                endpoint: entry.endpoint,
                kind,
                category: entry.category.trim().to_ascii_lowercase(),
                priority: entry.priority,
                max_articles: entry.max_articles.unwrap_or(config.max_articles_per_source),
                catalog_index: index,
            });
        }

        if sources.is_empty() {
            let reason = if config.category_filter.is_empty() {
                "catalog has no usable sources".to_string()
            } else {
                format!(
                    "no sources match categories: {}",
                    config
                        .category_filter
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            };
            return Err(AggregatorError::Config(reason));
        }

        info!("Catalog resolved to {} active sources", sources.len());
        Ok(sources)
    }

    /// The default source list: financial, technology, crypto, general, politics and energy feeds,
    /// two free community feeds, and two keyed news APIs
    pub fn builtin() -> Self {
        let rss = |name, endpoint, category, priority| {
            CatalogEntry::new(name, endpoint, "rss", category, priority)
        };

        Self::new(vec![
            rss(
                "Reuters Business",
                "https://feeds.reuters.com/reuters/businessNews",
                "financial",
                3,
            ),
            rss(
                "MarketWatch",
                "https://feeds.marketwatch.com/marketwatch/realtimeheadlines/",
                "financial",
                3,
            ),
            rss(
                "Yahoo Finance",
                "https://feeds.finance.yahoo.com/rss/2.0/headline",
                "financial",
                2,
            ),
            rss("CNN Business", "http://rss.cnn.com/rss/money_latest.rss", "financial", 2),
            rss("Bloomberg", "https://feeds.bloomberg.com/markets/news.rss", "financial", 3),
            rss("Financial Times", "https://www.ft.com/rss/home", "financial", 3),
            rss(
                "Wall Street Journal",
                "https://feeds.wsj.com/wsj/xml/rss/3_7085.xml",
                "financial",
                3,
            ),
            rss("Seeking Alpha", "https://seekingalpha.com/api/sa/combined/A.xml", "financial", 2),
            rss(
                "Earnings Whispers",
                "https://www.earningswhispers.com/rss/epsrss.asp",
                "earnings",
                3,
            ),
            rss(
                "Yahoo Earnings",
                "https://feeds.finance.yahoo.com/rss/2.0/headline?s=earnings",
                "earnings",
                3,
            ),
            rss("TechCrunch", "https://feeds.feedburner.com/TechCrunch/", "technology", 3),
            rss("Ars Technica", "https://feeds.arstechnica.com/arstechnica/index", "technology", 3),
            rss("The Verge", "https://www.theverge.com/rss/index.xml", "technology", 2),
            rss("Wired", "https://www.wired.com/feed/rss", "technology", 2),
            rss("VentureBeat", "https://venturebeat.com/feed/", "technology", 2),
            rss("CoinDesk", "https://feeds.coindesk.com/coindesk-results", "crypto", 3),
            rss("Cointelegraph", "https://cointelegraph.com/rss", "crypto", 2),
            rss("Decrypt", "https://decrypt.co/feed", "crypto", 2),
            rss("CryptoNews", "https://cryptonews.com/news/feed/", "crypto", 2),
            rss("BBC News", "http://feeds.bbci.co.uk/news/rss.xml", "general", 3),
            rss("Reuters World", "https://feeds.reuters.com/Reuters/worldNews", "general", 3),
            rss("AP News", "https://feeds.apnews.com/apnews/World", "general", 2),
            rss("NPR", "https://feeds.npr.org/1001/rss.xml", "general", 2),
            rss("Politico", "https://www.politico.com/rss/politics08.xml", "politics", 3),
            rss(
                "Reuters Politics",
                "https://feeds.reuters.com/reuters/politicsNews",
                "politics",
                2,
            ),
            rss("The Hill", "https://thehill.com/news/feed/", "politics", 2),
            rss("Oil & Gas Journal", "https://www.ogj.com/rss.xml", "energy", 2),
            rss("Energy News", "https://www.energy-news.co.uk/feed/", "energy", 2),
            CatalogEntry::new(
                "Hacker News",
                "https://hacker-news.firebaseio.com/v0/topstories.json",
                "free",
                "technology",
                2,
            )
            .with_max_articles(10),
            CatalogEntry::new(
                "Reddit News",
                "https://www.reddit.com/r/news/hot.json",
                "free",
                "general",
                1,
            ),
            CatalogEntry::new(
                "Reddit Business",
                "https://www.reddit.com/r/business/hot.json",
                "free",
                "financial",
                1,
            ),
            CatalogEntry::new(
                "NewsAPI Business",
                "https://newsapi.org/v2/top-headlines?category=business",
                "api",
                "financial",
                2,
            ),
            CatalogEntry::new(
                "NewsAPI Technology",
                "https://newsapi.org/v2/top-headlines?category=technology",
                "api",
                "technology",
                2,
            ),
            CatalogEntry::new(
                "The Guardian",
                "https://content.guardianapis.com/search?q=news",
                "api",
                "general",
                2,
            ),
        ])
    }
}
