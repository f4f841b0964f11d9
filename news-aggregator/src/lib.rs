pub mod types;
pub mod config;
pub mod catalog;
pub mod fetcher;
pub mod parser;
pub mod sources;
pub mod traits;
pub mod middleware;
pub mod cache;
pub mod scheduler;
pub mod dedup;
pub mod aggregator;
pub mod pipeline;
pub mod sink;
pub mod utils;

pub use types::*;
pub use config::{ApiKeys, FetchConfig, OperatingMode, PipelineConfig};
pub use catalog::{CatalogEntry, SourceCatalog};
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use traits::{DisplaySink, PullSource};
pub use middleware::RetryPolicy;
pub use cache::{CacheLookup, CacheOrigin, FetchCache};
pub use scheduler::{CycleReport, FetchScheduler, SourceHealth, SourceState};
pub use dedup::Deduplicator;
pub use aggregator::BatchMerger;
pub use pipeline::{PipelineBuilder, PublisherHandle, StreamPublisher};
pub use sink::{ChannelSink, LogSink, SinkEvent};
