use crate::types::{Article, Batch, CycleSummary};
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

/// Orders and caps a cycle's unique articles and works out what is new since the last batch
pub struct BatchMerger {
    cap: usize,
    cycle: u64,
    previous: Option<HashSet<Uuid>>,
    breaking_keywords: Vec<String>,
}

impl BatchMerger {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            cycle: 0,
            previous: None,
            breaking_keywords: Vec::new(),
        }
    }

    /// Flag articles whose title or summary mentions one of `keywords` as breaking
    pub fn with_breaking_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.breaking_keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }

    pub fn is_breaking(&self, article: &Article) -> bool {
        if self.breaking_keywords.is_empty() {
            return false;
        }
        let title = article.title.to_lowercase();
        let summary = article.summary.as_deref().unwrap_or_default().to_lowercase();
        self.breaking_keywords
            .iter()
            .any(|k| title.contains(k.as_str()) || summary.contains(k.as_str()))
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Number of batches produced so far
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Newest first; equal times go to the higher priority, then the earlier catalog entry
    pub fn sort(articles: &mut [Article]) {
        articles.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then(b.priority.cmp(&a.priority))
                .then(a.source_rank.cmp(&b.source_rank))
                .then(a.id.cmp(&b.id))
        });
    }

    /// Build the next batch. On the first batch every article counts as new.
    pub fn merge(&mut self, mut articles: Vec<Article>, summary: CycleSummary) -> Batch {
        Self::sort(&mut articles);

        // Outside the dedup window the same headline can still arrive twice; the newest wins
        let mut fingerprints = HashSet::with_capacity(articles.len());
        articles.retain(|a| fingerprints.insert(a.content_fingerprint));

        if articles.len() > self.cap {
            debug!("Capping batch at {} of {} articles", self.cap, articles.len());
            articles.truncate(self.cap);
        }

        let delta: Vec<Article> = match &self.previous {
            Some(previous) => articles
                .iter()
                .filter(|a| !previous.contains(&a.content_fingerprint))
                .cloned()
                .collect(),
            None => articles.clone(),
        };

        let breaking: Vec<Uuid> = articles
            .iter()
            .filter(|a| self.is_breaking(a))
            .map(|a| a.id)
            .collect();

        self.previous = Some(articles.iter().map(|a| a.content_fingerprint).collect());
        self.cycle += 1;

        info!(
            "Batch {}: {} articles, {} new, {} breaking ({} sources ok, {} failed, {} degraded)",
            self.cycle,
            articles.len(),
            delta.len(),
            breaking.len(),
            summary.sources_ok,
            summary.sources_failed,
            summary.sources_skipped
        );

        Batch {
            cycle: self.cycle,
            produced_at: Utc::now(),
            articles,
            delta,
            breaking,
            summary,
        }
    }
}
