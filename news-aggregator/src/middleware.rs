//! Wrappers composed around a source adapter call.
//!
//! The scheduler builds the full call as
//! `capture(with_retry(policy, || with_timeout(limit, timed(name, adapter.pull(source)))))`
//! so the retry and timeout policy stays visible where the fetch is issued.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::types::{AggregatorError, Article, FetchResult, Result, Source};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Multiplier applied to the delay after a rate-limited attempt
    pub rate_limit_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            rate_limit_factor: 4,
        }
    }
}

impl RetryPolicy {
    /// Yields `base * 2^attempt`, capped at `max_delay`, with no jitter
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Delay before the next attempt given the scheduled backoff step and the error just seen
    pub fn delay_for(&self, step: Duration, error: &AggregatorError) -> Duration {
        match error {
            AggregatorError::RateLimited { retry_after_secs } => {
                let ceiling = self.max_delay.saturating_mul(self.rate_limit_factor);
                let requested = retry_after_secs.map(Duration::from_secs).unwrap_or_default();
                step.saturating_mul(self.rate_limit_factor).max(requested).min(ceiling)
            }
            _ => step,
        }
    }
}

/// Final outcome of a retried operation and how many retries it took
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub retries: u32,
}

/// Re-run `op` on transient errors, sleeping with exponential backoff between attempts
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = policy.backoff();
    let mut retries = 0;

    loop {
        match op().await {
            Ok(value) => return RetryOutcome { result: Ok(value), retries },
            Err(e) if e.is_transient() && retries < policy.max_retries => {
                let step = backoff.next_backoff().unwrap_or(policy.max_delay);
                let delay = policy.delay_for(step, &e);
                warn!(
                    "Attempt {} failed for {}: {}, retrying in {:?}",
                    retries + 1,
                    label,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                retries += 1;
            }
            Err(e) => {
                if retries > 0 {
                    error!("Giving up on {} after {} attempts: {}", label, retries + 1, e);
                }
                return RetryOutcome { result: Err(e), retries };
            }
        }
    }
}

/// Bound one call by `limit`; the call is dropped when the limit elapses
pub async fn with_timeout<T, Fut>(limit: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AggregatorError::Timeout {
            after_ms: limit.as_millis() as u64,
        }),
    }
}

/// Log how long an adapter call took
pub async fn timed<T, Fut>(label: &str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let result = fut.await;
    match &result {
        Ok(_) => debug!("{} completed in {:?}", label, started.elapsed()),
        Err(e) => debug!("{} failed after {:?}: {}", label, started.elapsed(), e),
    }
    result
}

/// The adapter boundary: every error ends up in the returned `FetchResult`
pub fn capture(
    source: &Source,
    outcome: RetryOutcome<Vec<Article>>,
    fetched_at: DateTime<Utc>,
    elapsed: Duration,
) -> FetchResult {
    let result = match outcome.result {
        Ok(mut articles) => {
            articles.truncate(source.max_articles);
            FetchResult::success(&source.id, articles, fetched_at)
        }
        Err(e) => FetchResult::failure(&source.id, &e, fetched_at),
    };
    result
        .with_retries(outcome.retries)
        .with_elapsed_ms(elapsed.as_millis() as u64)
}
