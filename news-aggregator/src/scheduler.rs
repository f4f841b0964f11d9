use crate::cache::{CacheLookup, CacheOrigin, FetchCache};
use crate::config::PipelineConfig;
use crate::middleware::{capture, timed, with_retry, with_timeout, RetryPolicy};
use crate::traits::PullSource;
use crate::types::{
    AggregatorError, Article, CycleSummary, FetchResult, FetchStatus, Result, Source,
};
use crate::utils::time::instant_after;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Fetching,
    /// Excluded from scheduling until the cool-down ends
    Degraded { until: Instant },
}

#[derive(Debug, Clone)]
pub struct SourceHealth {
    pub state: SourceState,
    pub consecutive_failures: u32,
    pub last_status: Option<FetchStatus>,
}

impl Default for SourceHealth {
    fn default() -> Self {
        Self {
            state: SourceState::Idle,
            consecutive_failures: 0,
            last_status: None,
        }
    }
}

/// What one cycle of fetching produced
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// One result per scheduled source, in catalog order
    pub results: Vec<FetchResult>,
    pub skipped_degraded: Vec<String>,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn summary(&self) -> CycleSummary {
        let sources_ok = self.results.iter().filter(|r| r.status.is_success()).count();
        CycleSummary {
            sources_ok,
            sources_failed: self.results.len() - sources_ok,
            sources_skipped: self.skipped_degraded.len(),
        }
    }

    pub fn result_for(&self, source_id: &str) -> Option<&FetchResult> {
        self.results.iter().find(|r| r.source_id == source_id)
    }

    /// All articles of the successful results
    pub fn into_articles(self) -> Vec<Article> {
        self.results.into_iter().flat_map(|r| r.articles).collect()
    }
}

/// Bounded-concurrency dispatcher issuing one cache-backed fetch per active source per cycle
pub struct FetchScheduler {
    sources: Vec<Source>,
    adapters: HashMap<String, Arc<dyn PullSource>>,
    health: HashMap<String, SourceHealth>,
    semaphore: Arc<Semaphore>,
    per_fetch_timeout: Duration,
    cycle_deadline: Duration,
    retry: RetryPolicy,
    degrade_after: u32,
    cool_down: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl FetchScheduler {
    pub fn new(
        config: &PipelineConfig,
        sources: Vec<Source>,
        adapters: HashMap<String, Arc<dyn PullSource>>,
    ) -> Result<Self> {
        if let Some(source) = sources.iter().find(|s| !adapters.contains_key(&s.id)) {
            return Err(AggregatorError::Config(format!(
                "no adapter registered for source '{}'",
                source.id
            )));
        }

        let health = sources
            .iter()
            .map(|s| (s.id.clone(), SourceHealth::default()))
            .collect();

        Ok(Self {
            sources,
            adapters,
            health,
            semaphore: Arc::new(Semaphore::new(config.concurrency_limit)),
            per_fetch_timeout: config.per_fetch_timeout,
            cycle_deadline: config.cycle_deadline,
            retry: config.retry.clone(),
            degrade_after: config.degrade_after_failures,
            cool_down: config.cool_down,
            tasks: Vec::new(),
        })
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn health(&self, source_id: &str) -> Option<&SourceHealth> {
        self.health.get(source_id)
    }

    pub fn is_degraded(&self, source_id: &str) -> bool {
        matches!(
            self.health.get(source_id).map(|h| h.state),
            Some(SourceState::Degraded { .. })
        )
    }

    /// Fetch tasks from this or earlier cycles that have not finished yet
    pub fn outstanding(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Run one fetch cycle.
    ///
    /// Returns once every scheduled source answered or the cycle deadline passed. Sources still
    /// running at the deadline are reported as timed out; their fetch keeps going and lands in
    /// the cache for a later cycle.
    pub async fn run_cycle(&mut self, cache: &Arc<FetchCache>, force: bool) -> CycleReport {
        let started = Instant::now();
        self.tasks.retain(|t| !t.is_finished());

        let (tx, mut rx) = mpsc::channel(self.sources.len().max(1));
        let mut pending = HashSet::new();
        let mut skipped_degraded = Vec::new();

        for source in &self.sources {
            let health = self.health.entry(source.id.clone()).or_default();
            let mut probe = false;

            if let SourceState::Degraded { until } = health.state {
                if started < until {
                    debug!("Skipping degraded source {}", source.id);
                    skipped_degraded.push(source.id.clone());
                    continue;
                }
                info!("Cool-down over for {}, probing once", source.id);
                health.consecutive_failures = self.degrade_after.saturating_sub(1);
                probe = true;
            }

            let Some(adapter) = self.adapters.get(&source.id).cloned() else {
                continue;
            };
            health.state = SourceState::Fetching;

            let job = FetchJob {
                source: source.clone(),
                adapter,
                cache: Arc::clone(cache),
                semaphore: Arc::clone(&self.semaphore),
                timeout: self.per_fetch_timeout,
                retry: self.retry.clone(),
                force: force || probe,
            };
            let tx = tx.clone();
            pending.insert(source.id.clone());
            self.tasks.push(tokio::spawn(async move {
                let lookup = job.run().await;
                // The cycle may have stopped listening; the result is already cached
                let _ = tx.send(lookup).await;
            }));
        }
        drop(tx);

        let mut results = Vec::with_capacity(pending.len());
        let mut replayed = HashSet::new();
        let mut deadline_passed = false;
        let deadline = tokio::time::sleep(self.cycle_deadline);
        tokio::pin!(deadline);

        while !pending.is_empty() {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(CacheLookup { result, origin }) => {
                        pending.remove(&result.source_id);
                        if origin == CacheOrigin::Hit {
                            replayed.insert(result.source_id.clone());
                        }
                        results.push(result);
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    deadline_passed = true;
                    break;
                }
            }
        }

        let deadline_ms = self.cycle_deadline.as_millis() as u64;
        for source in self.sources.iter().filter(|s| pending.contains(&s.id)) {
            let late = if deadline_passed {
                warn!("{} still fetching at the cycle deadline", source.id);
                FetchResult::deadline_exceeded(&source.id, deadline_ms)
            } else {
                FetchResult::failure(
                    &source.id,
                    &AggregatorError::General("fetch task aborted".to_string()),
                    Utc::now(),
                )
            };
            results.push(late);
        }

        for result in &results {
            self.record(result, replayed.contains(&result.source_id));
        }

        let order: HashMap<&str, usize> = self
            .sources
            .iter()
            .map(|s| (s.id.as_str(), s.catalog_index))
            .collect();
        results.sort_by_key(|r| order.get(r.source_id.as_str()).copied().unwrap_or(usize::MAX));

        CycleReport {
            results,
            skipped_degraded,
            elapsed: started.elapsed(),
        }
    }

    /// Wait up to `grace` for outstanding fetches, then abort whatever is left
    pub async fn shutdown(&mut self, grace: Duration) {
        let tasks: Vec<JoinHandle<()>> =
            self.tasks.drain(..).filter(|t| !t.is_finished()).collect();
        if tasks.is_empty() {
            return;
        }

        info!("Waiting up to {:?} for {} outstanding fetches", grace, tasks.len());
        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
        if tokio::time::timeout(grace, futures::future::join_all(tasks)).await.is_err() {
            warn!("Aborting {} fetches still running after {:?}", aborts.len(), grace);
            for handle in aborts {
                handle.abort();
            }
        }
    }

    /// Update a source's health. A failure replayed from the cache was already counted when it
    /// was fetched, so it does not move the source closer to degradation.
    fn record(&mut self, result: &FetchResult, replayed: bool) {
        let health = self.health.entry(result.source_id.clone()).or_default();
        health.last_status = Some(result.status);

        if result.status.is_success() {
            if health.consecutive_failures > 0 {
                info!(
                    "{} recovered after {} failed cycles",
                    result.source_id, health.consecutive_failures
                );
            }
            health.consecutive_failures = 0;
            health.state = SourceState::Idle;
            return;
        }
        if replayed {
            debug!("{} failure replayed from cache, not counted again", result.source_id);
            health.state = SourceState::Idle;
            return;
        }

        health.consecutive_failures += 1;
        if health.consecutive_failures >= self.degrade_after {
            warn!(
                "Degrading {} for {:?} after {} consecutive failures ({})",
                result.source_id,
                self.cool_down,
                health.consecutive_failures,
                result.error.as_deref().unwrap_or("unknown error")
            );
            health.state = SourceState::Degraded {
                until: instant_after(Instant::now(), self.cool_down),
            };
        } else {
            health.state = SourceState::Idle;
        }
    }
}

/// Everything one detached fetch task needs
struct FetchJob {
    source: Source,
    adapter: Arc<dyn PullSource>,
    cache: Arc<FetchCache>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    retry: RetryPolicy,
    force: bool,
}

impl FetchJob {
    async fn run(self) -> CacheLookup {
        let FetchJob {
            source,
            adapter,
            cache,
            semaphore,
            timeout,
            retry,
            force,
        } = self;
        let key = source.id.clone();

        let lookup = cache
            .get_or_fetch(&key, force, move || async move {
                // Slots are only held while the adapter is really called
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return FetchResult::failure(
                            &source.id,
                            &AggregatorError::General("fetch pool closed".to_string()),
                            Utc::now(),
                        )
                    }
                };

                let started = Instant::now();
                let fetched_at = Utc::now();
                let outcome = with_retry(&retry, &source.id, || {
                    with_timeout(timeout, timed(&source.id, adapter.pull(&source)))
                })
                .await;
                capture(&source, outcome, fetched_at, started.elapsed())
            })
            .await;

        if lookup.origin != CacheOrigin::Fetched {
            debug!("{} answered from cache ({:?})", key, lookup.origin);
        }
        lookup
    }
}
