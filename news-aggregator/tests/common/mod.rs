#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use news_aggregator::types::*;
use news_aggregator::{CatalogEntry, PipelineConfig, PullSource, RetryPolicy};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

pub fn source(id: &str, category: &str, priority: i32, catalog_index: usize) -> Source {
    Source {
        id: id.to_string(),
        name: id.to_uppercase(),
        endpoint: format!("https://{}.example.com/rss", id),
        kind: SourceKind::Rss,
        category: category.to_string(),
        priority,
        max_articles: 20,
        catalog_index,
    }
}

pub fn article(
    source: &Source,
    title: &str,
    url: &str,
    published_at: DateTime<Utc>,
    fetched_at: DateTime<Utc>,
) -> Article {
    Article::new(source, title, url, Some(published_at), fetched_at).expect("article has a title")
}

pub fn rss_entry(name: &str, category: &str, priority: i32) -> CatalogEntry {
    let host = name.to_lowercase().replace(' ', "-");
    CatalogEntry::new(name, &format!("https://{}.example.com/rss", host), "rss", category, priority)
}

/// Small timeouts and backoff so paused-clock tests stay readable
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        per_fetch_timeout: Duration::from_millis(100),
        cycle_deadline: Duration::from_secs(2),
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            rate_limit_factor: 4,
        },
        shutdown_grace: Duration::from_millis(200),
        ..PipelineConfig::default()
    }
}

/// What a scripted adapter does on one call
#[derive(Debug, Clone)]
pub enum Reply {
    Articles(Vec<(String, String, DateTime<Utc>)>),
    Unavailable,
    NotFound,
    RateLimited(Option<u64>),
    /// Never answers; only a timeout ends the call
    Hang,
}

impl Reply {
    pub fn headline(title: &str, url: &str, published_at: DateTime<Utc>) -> Self {
        Reply::Articles(vec![(title.to_string(), url.to_string(), published_at)])
    }
}

/// Tracks how many adapter calls are running at once across stubs
#[derive(Debug, Default)]
pub struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Adapter that replays scripted replies, then repeats `fallback`
pub struct StubSource {
    script: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Reply>,
    delay: Duration,
    calls: AtomicUsize,
    gauge: Option<Arc<Gauge>>,
}

impl StubSource {
    pub fn new(fallback: Reply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            gauge: None,
        }
    }

    pub fn scripted(replies: Vec<Reply>, fallback: Reply) -> Self {
        let stub = Self::new(fallback);
        stub.script.lock().extend(replies);
        stub
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<Gauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn set_fallback(&self, reply: Reply) {
        *self.fallback.lock() = reply;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Reply {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().clone())
    }
}

#[async_trait]
impl PullSource for StubSource {
    async fn pull(&self, source: &Source) -> Result<Vec<Article>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.next_reply();

        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(gauge) = &self.gauge {
            gauge.exit();
        }

        match reply {
            Reply::Articles(items) => {
                let fetched_at = Utc::now();
                Ok(items
                    .into_iter()
                    .filter_map(|(title, url, published_at)| {
                        Article::new(source, &title, &url, Some(published_at), fetched_at)
                    })
                    .collect())
            }
            Reply::Unavailable => Err(AggregatorError::HttpStatus { status: 503 }),
            Reply::NotFound => Err(AggregatorError::HttpStatus { status: 404 }),
            Reply::RateLimited(retry_after_secs) => {
                Err(AggregatorError::RateLimited { retry_after_secs })
            }
            Reply::Hang => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
        }
    }
}
