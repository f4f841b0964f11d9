use crate::config::ApiKeys;
use crate::fetcher::Fetcher;
use crate::sources::{ApiFeedSource, ApiProvider, FreeFeedSource, FreeProvider, RssFeedSource};
use crate::traits::PullSource;
use crate::types::{AggregatorError, Article, Result, Source, SourceKind};
use async_trait::async_trait;
use std::sync::Arc;

/// The closed set of built-in adapters, chosen by source kind
pub enum SourceAdapter {
    Rss(RssFeedSource),
    Api(ApiFeedSource),
    Free(FreeFeedSource),
}

impl SourceAdapter {
    /// Pick the adapter for `source`. Unknown hosts and missing API keys are configuration errors.
    pub fn for_source(source: &Source, fetcher: Arc<Fetcher>, keys: &ApiKeys) -> Result<Self> {
        match source.kind {
            SourceKind::Rss => Ok(SourceAdapter::Rss(RssFeedSource::new(fetcher))),
            SourceKind::Api => {
                let provider = ApiProvider::from_endpoint(&source.endpoint)?;
                let key = keys.key_for(provider).ok_or_else(|| {
                    AggregatorError::Config(format!(
                        "{} needs an API key for {}",
                        source.id,
                        provider.name()
                    ))
                })?;
                Ok(SourceAdapter::Api(ApiFeedSource::new(
                    fetcher,
                    provider,
                    key.to_string(),
                )))
            }
            SourceKind::Free => {
                let provider = FreeProvider::from_endpoint(&source.endpoint)?;
                Ok(SourceAdapter::Free(FreeFeedSource::new(fetcher, provider)))
            }
        }
    }
}

#[async_trait]
impl PullSource for SourceAdapter {
    async fn pull(&self, source: &Source) -> Result<Vec<Article>> {
        match self {
            SourceAdapter::Rss(adapter) => adapter.pull(source).await,
            SourceAdapter::Api(adapter) => adapter.pull(source).await,
            SourceAdapter::Free(adapter) => adapter.pull(source).await,
        }
    }
}
