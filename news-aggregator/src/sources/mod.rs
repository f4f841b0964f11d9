pub mod adapter;
pub mod api_feed;
pub mod free_feed;
pub mod rss_feed;

pub use adapter::SourceAdapter;
pub use api_feed::{ApiFeedSource, ApiProvider};
pub use free_feed::{FreeFeedSource, FreeProvider};
pub use rss_feed::RssFeedSource;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Decode JSON entries one at a time so a single malformed entry does not sink the response
pub(crate) fn decode_entries<T: DeserializeOwned>(entries: &[Value], source_id: &str) -> Vec<T> {
    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<T>(entry.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!("Skipping malformed entry in {}: {}", source_id, e);
                None
            }
        })
        .collect()
}
