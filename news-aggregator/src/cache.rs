use crate::config::PipelineConfig;
use crate::types::FetchResult;
use crate::utils::time::instant_after;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// How a lookup was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOrigin {
    /// Served from a live entry, no fetch
    Hit,
    /// This caller ran the fetch
    Fetched,
    /// Another caller's in-flight fetch was shared
    Joined,
}

#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub result: FetchResult,
    pub origin: CacheOrigin,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub joins: u64,
    pub evictions: u64,
}

struct CacheEntry {
    result: FetchResult,
    stored_at: Instant,
    expires_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, watch::Receiver<Option<FetchResult>>>,
    stats: CacheStats,
}

enum Claim {
    Hit(FetchResult),
    Lead(watch::Sender<Option<FetchResult>>),
    Join(watch::Receiver<Option<FetchResult>>),
}

/// TTL cache of the last fetch result per source with single-flight fetching.
///
/// The lock only guards map bookkeeping and is never held across a fetch, so different
/// sources proceed independently.
pub struct FetchCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    failure_ttl: Duration,
    capacity: usize,
}

impl FetchCache {
    pub fn new(ttl: Duration, failure_ttl: Duration, capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            ttl,
            failure_ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.cache_ttl, config.failure_cache_ttl, config.cache_capacity)
    }

    /// Return the cached result for `source_id`, or run `fetch` to produce one.
    ///
    /// Concurrent callers for the same key share a single `fetch`. `force` skips the cached
    /// entry but still joins a fetch that is already running.
    pub async fn get_or_fetch<F, Fut>(&self, source_id: &str, force: bool, fetch: F) -> CacheLookup
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult>,
    {
        let sender = loop {
            match self.claim(source_id, force) {
                Claim::Hit(result) => {
                    debug!("Cache hit for {}", source_id);
                    return CacheLookup {
                        result,
                        origin: CacheOrigin::Hit,
                    };
                }
                Claim::Join(mut rx) => {
                    debug!("Joining in-flight fetch for {}", source_id);
                    let shared = match rx.wait_for(Option::is_some).await {
                        Ok(value) => (*value).clone(),
                        Err(_) => None,
                    };
                    if let Some(result) = shared {
                        return CacheLookup {
                            result,
                            origin: CacheOrigin::Joined,
                        };
                    }
                    debug!("In-flight fetch for {} was abandoned, retrying", source_id);
                }
                Claim::Lead(tx) => break tx,
            }
        };

        let flight = Flight {
            cache: self,
            source_id,
            sender: Some(sender),
        };
        let result = fetch().await;
        flight.complete(&result);

        CacheLookup {
            result,
            origin: CacheOrigin::Fetched,
        }
    }

    /// The live cached result for `source_id`, if any. Does not count as a hit.
    pub fn peek(&self, source_id: &str) -> Option<FetchResult> {
        let state = self.state.lock();
        state
            .entries
            .get(source_id)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.result.clone())
    }

    pub fn is_in_flight(&self, source_id: &str) -> bool {
        self.state.lock().in_flight.contains_key(source_id)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.expires_at > now);
        before - state.entries.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    fn claim(&self, source_id: &str, force: bool) -> Claim {
        let now = Instant::now();
        let mut state = self.state.lock();

        let cached = state
            .entries
            .get(source_id)
            .map(|entry| (entry.expires_at > now, entry.result.clone()));
        match cached {
            Some((true, result)) if !force => {
                state.stats.hits += 1;
                return Claim::Hit(result);
            }
            Some((false, _)) => {
                state.entries.remove(source_id);
            }
            _ => {}
        }

        if let Some(rx) = state.in_flight.get(source_id) {
            let rx = rx.clone();
            state.stats.joins += 1;
            return Claim::Join(rx);
        }

        let (tx, rx) = watch::channel(None);
        state.in_flight.insert(source_id.to_string(), rx);
        state.stats.misses += 1;
        Claim::Lead(tx)
    }

    fn store(&self, source_id: &str, result: &FetchResult) {
        let ttl = if result.status.is_success() {
            self.ttl
        } else {
            self.failure_ttl
        };

        let mut state = self.state.lock();
        state.in_flight.remove(source_id);
        if ttl.is_zero() {
            return;
        }

        let now = Instant::now();
        state.entries.insert(
            source_id.to_string(),
            CacheEntry {
                result: result.clone(),
                stored_at: now,
                expires_at: instant_after(now, ttl),
            },
        );

        while state.entries.len() > self.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.result.fetched_at, entry.stored_at))
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    debug!("Evicting cached result for {}", id);
                    state.entries.remove(&id);
                    state.stats.evictions += 1;
                }
                None => break,
            }
        }
    }
}

/// Marks this caller as the leader for one key. Dropping it without completing (the fetch
/// future was cancelled) clears the in-flight marker so waiters take over.
struct Flight<'a> {
    cache: &'a FetchCache,
    source_id: &'a str,
    sender: Option<watch::Sender<Option<FetchResult>>>,
}

impl Flight<'_> {
    fn complete(mut self, result: &FetchResult) {
        self.cache.store(self.source_id, result);
        if let Some(sender) = self.sender.take() {
            sender.send_replace(Some(result.clone()));
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if self.sender.is_some() {
            self.cache.state.lock().in_flight.remove(self.source_id);
        }
    }
}
