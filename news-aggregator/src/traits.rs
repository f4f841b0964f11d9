use crate::types::{Article, Batch, Result, Source};
use async_trait::async_trait;

/// Fetches and parses one source into raw articles.
///
/// Implementations perform network I/O only and touch no shared mutable state.
/// Errors are returned, never panicked; the scheduler turns them into a `FetchResult`.
#[async_trait]
pub trait PullSource: Send + Sync {
    async fn pull(&self, source: &Source) -> Result<Vec<Article>>;
}

/// Consumer of published batches, e.g. a terminal view
pub trait DisplaySink: Send {
    /// Called once per cycle with the full ordered batch
    fn publish(&mut self, batch: &Batch);

    /// Called after `publish` when the batch contains articles not seen in the previous one
    fn flash(&mut self, delta: &[Article]);
}
