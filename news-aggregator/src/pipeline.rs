use crate::aggregator::BatchMerger;
use crate::cache::FetchCache;
use crate::catalog::SourceCatalog;
use crate::config::{ApiKeys, PipelineConfig};
use crate::dedup::Deduplicator;
use crate::fetcher::Fetcher;
use crate::scheduler::FetchScheduler;
use crate::sink::LogSink;
use crate::sources::SourceAdapter;
use crate::traits::{DisplaySink, PullSource};
use crate::types::{Batch, Result, Source};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Control surface for a running publisher. Cheap to clone and safe to use from any task.
#[derive(Clone)]
pub struct PublisherHandle {
    stop: Arc<watch::Sender<bool>>,
    refresh: Arc<Notify>,
}

impl PublisherHandle {
    /// Ask the refresh loop to finish; observed at the next suspension point
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Run a cycle now, bypassing cached results
    pub fn refresh_now(&self) {
        self.refresh.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }
}

/// Drives the refresh loop: fetch, dedupe, merge, then hand the batch to the sink
pub struct StreamPublisher {
    config: PipelineConfig,
    scheduler: FetchScheduler,
    cache: Arc<FetchCache>,
    dedup: Deduplicator,
    merger: BatchMerger,
    sink: Box<dyn DisplaySink>,
    stop: watch::Receiver<bool>,
    refresh: Arc<Notify>,
}

impl StreamPublisher {
    /// Tick until stopped. Each tick runs one cycle and delivers its batch.
    ///
    /// A refresh request runs a forced cycle without waiting for the next tick. Stopping
    /// abandons the current cycle; outstanding fetches get the configured grace period.
    pub async fn run(&mut self) {
        let mut stop = self.stop.clone();
        let refresh = Arc::clone(&self.refresh);
        let mut ticker = tokio::time::interval(self.config.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Publisher started with {} sources, refreshing every {:?}",
            self.scheduler.sources().len(),
            self.config.refresh_interval
        );

        while !*stop.borrow() {
            let force = tokio::select! {
                _ = stopped(&mut stop) => break,
                _ = ticker.tick() => false,
                _ = refresh.notified() => true,
            };

            let batch = tokio::select! {
                _ = stopped(&mut stop) => break,
                batch = self.run_cycle(force) => batch,
            };
            self.deliver(&batch);
        }

        info!("Publisher stopping after {} cycles", self.merger.cycles());
        self.shutdown().await;
    }

    /// One forced cycle without the loop, for fetch-once and JSON output
    pub async fn fetch_now(&mut self) -> Batch {
        self.run_cycle(true).await
    }

    /// Let outstanding fetches drain for the grace period, then cancel them
    pub async fn shutdown(&mut self) {
        self.scheduler.shutdown(self.config.shutdown_grace).await;
    }

    pub fn sources(&self) -> &[Source] {
        self.scheduler.sources()
    }

    pub fn scheduler(&self) -> &FetchScheduler {
        &self.scheduler
    }

    pub fn cache(&self) -> &Arc<FetchCache> {
        &self.cache
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn run_cycle(&mut self, force: bool) -> Batch {
        let report = self.scheduler.run_cycle(&self.cache, force).await;
        let summary = report.summary();
        let elapsed = report.elapsed;

        let articles = report.into_articles();
        let unique = self.dedup.dedup(articles, Utc::now());
        let batch = self.merger.merge(unique, summary);

        let purged = self.cache.purge_expired();
        debug!(
            "Cycle {} took {:?}, purged {} expired cache entries, cache stats {:?}",
            batch.cycle,
            elapsed,
            purged,
            self.cache.stats()
        );
        batch
    }

    fn deliver(&mut self, batch: &Batch) {
        self.sink.publish(batch);
        if batch.has_new() {
            self.sink.flash(&batch.delta);
        }
    }
}

/// Resolves once stop is requested. A dropped handle never stops the loop.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Assembles a publisher from configuration, a catalog, adapters and a sink.
///
/// Everything is validated in `build`, so configuration errors surface before any cycle runs.
pub struct PipelineBuilder {
    config: PipelineConfig,
    catalog: Option<SourceCatalog>,
    keys: ApiKeys,
    adapters: HashMap<String, Arc<dyn PullSource>>,
    sink: Option<Box<dyn DisplaySink>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            catalog: None,
            keys: ApiKeys::default(),
            adapters: HashMap::new(),
            sink: None,
        }
    }

    /// Defaults to the built-in catalog
    pub fn with_catalog(mut self, catalog: SourceCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_api_keys(mut self, keys: ApiKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Use `adapter` for the source with this id instead of the built-in one
    pub fn with_adapter(mut self, source_id: &str, adapter: Arc<dyn PullSource>) -> Self {
        self.adapters.insert(source_id.to_string(), adapter);
        self
    }

    /// Defaults to a sink that logs through tracing
    pub fn with_sink(mut self, sink: Box<dyn DisplaySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(mut self) -> Result<(StreamPublisher, PublisherHandle)> {
        self.config.validate()?;

        let catalog = self.catalog.take().unwrap_or_else(SourceCatalog::builtin);
        let sources = catalog.into_sources(&self.config, &self.keys)?;

        let mut fetcher: Option<Arc<Fetcher>> = None;
        let mut adapters: HashMap<String, Arc<dyn PullSource>> = HashMap::new();
        for source in &sources {
            let adapter: Arc<dyn PullSource> = match self.adapters.remove(&source.id) {
                Some(adapter) => adapter,
                None => {
                    let shared = match fetcher.clone() {
                        Some(shared) => shared,
                        None => {
                            let created = Arc::new(Fetcher::new(self.config.http.clone())?);
                            fetcher = Some(Arc::clone(&created));
                            created
                        }
                    };
                    Arc::new(SourceAdapter::for_source(source, shared, &self.keys)?)
                }
            };
            adapters.insert(source.id.clone(), adapter);
        }
        for unused in self.adapters.keys() {
            debug!("Adapter override for {} matches no active source", unused);
        }

        let scheduler = FetchScheduler::new(&self.config, sources, adapters)?;
        let cache = Arc::new(FetchCache::from_config(&self.config));
        let dedup = Deduplicator::new(self.config.dedup_window);
        let merger = BatchMerger::new(self.config.batch_cap)
            .with_breaking_keywords(&self.config.breaking_keywords);
        let sink = self.sink.take().unwrap_or_else(|| Box::new(LogSink));

        let (stop_tx, stop_rx) = watch::channel(false);
        let refresh = Arc::new(Notify::new());

        let publisher = StreamPublisher {
            config: self.config,
            scheduler,
            cache,
            dedup,
            merger,
            sink,
            stop: stop_rx,
            refresh: Arc::clone(&refresh),
        };
        let handle = PublisherHandle {
            stop: Arc::new(stop_tx),
            refresh,
        };
        Ok((publisher, handle))
    }
}
