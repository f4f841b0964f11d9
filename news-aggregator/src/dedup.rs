use crate::types::Article;
use crate::utils::text::normalize_title;
use crate::utils::url::canonicalize;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Broad grouping used in fingerprints so the same headline under sibling categories still collides
pub fn category_bucket(category: &str) -> &'static str {
    match category.trim().to_ascii_lowercase().as_str() {
        "business" | "financial" | "earnings" | "crypto" | "energy" | "markets" => "business",
        "technology" | "tech" | "science" => "technology",
        _ => "general",
    }
}

/// Stable fingerprint of a headline: case and spacing insensitive, scoped by category bucket
pub fn content_fingerprint(title: &str, category: &str) -> Uuid {
    let key = format!("{}|{}", category_bucket(category), normalize_title(title));
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    first_fetched_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

/// Collapses the same story reported by several sources.
///
/// Owned by the publisher and only touched from the cycle loop. Remembers when each article
/// was first fetched so that ties between equal-priority duplicates favour the earliest report.
pub struct Deduplicator {
    window: Duration,
    seen: HashMap<Uuid, WindowEntry>,
}

impl Deduplicator {
    pub fn new(window: std::time::Duration) -> Self {
        let window = Duration::from_std(window).unwrap_or_else(|_| Duration::days(36_500));
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Number of articles currently remembered by the sliding window
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }

    pub fn first_seen(&self, article_id: &Uuid) -> Option<DateTime<Utc>> {
        self.seen.get(article_id).map(|e| e.first_fetched_at)
    }

    /// Drop duplicates from one cycle's articles.
    ///
    /// Two articles are duplicates when their fingerprints or canonical URLs match and their
    /// publish times are within the window of each other. The survivor of each cluster has the
    /// highest priority, then the earliest first fetch, then the earliest catalog position.
    pub fn dedup(&mut self, articles: Vec<Article>, now: DateTime<Utc>) -> Vec<Article> {
        let total = articles.len();

        let mut candidates: Vec<(DateTime<Utc>, Article)> = articles
            .into_iter()
            .map(|article| {
                let entry = self.seen.entry(article.id).or_insert(WindowEntry {
                    first_fetched_at: article.fetched_at,
                    last_seen_at: now,
                });
                entry.first_fetched_at = entry.first_fetched_at.min(article.fetched_at);
                entry.last_seen_at = now;
                (entry.first_fetched_at, article)
            })
            .collect();

        candidates.sort_by(|(seen_a, a), (seen_b, b)| {
            b.priority
                .cmp(&a.priority)
                .then(seen_a.cmp(seen_b))
                .then(a.source_rank.cmp(&b.source_rank))
                .then(a.id.cmp(&b.id))
        });

        let mut kept: Vec<Article> = Vec::with_capacity(candidates.len());
        let mut by_fingerprint: HashMap<Uuid, Vec<usize>> = HashMap::new();
        let mut by_url: HashMap<String, Vec<usize>> = HashMap::new();

        for (_, candidate) in candidates {
            let url_key = canonicalize(&candidate.url);
            let same_story = by_fingerprint
                .get(&candidate.content_fingerprint)
                .into_iter()
                .flatten()
                .chain(
                    by_url
                        .get(&url_key)
                        .filter(|_| !url_key.is_empty())
                        .into_iter()
                        .flatten(),
                )
                .find(|&&i| self.within_window(&kept[i], &candidate));

            if let Some(&i) = same_story {
                debug!(
                    "Dropping duplicate '{}' from {} (kept {})",
                    candidate.title, candidate.source_id, kept[i].source_id
                );
                continue;
            }

            let index = kept.len();
            by_fingerprint
                .entry(candidate.content_fingerprint)
                .or_default()
                .push(index);
            if !url_key.is_empty() {
                by_url.entry(url_key).or_default().push(index);
            }
            kept.push(candidate);
        }

        self.purge(now);
        debug!(
            "Dedup kept {}/{} articles, window tracks {}",
            kept.len(),
            total,
            self.seen.len()
        );
        kept
    }

    /// Forget articles no source has reported since `now - window`.
    ///
    /// An article still listed by its feed keeps its first-seen time however old it is, so the
    /// preference between equal-priority duplicates stays stable from cycle to cycle.
    pub fn purge(&mut self, now: DateTime<Utc>) {
        if let Some(horizon) = now.checked_sub_signed(self.window) {
            self.seen.retain(|_, entry| entry.last_seen_at >= horizon);
        }
    }

    fn within_window(&self, a: &Article, b: &Article) -> bool {
        (a.published_at - b.published_at).abs() <= self.window
    }
}
