/// Text processing utilities
pub mod text {
    /// Lowercase and collapse whitespace so case/spacing variants of a headline compare equal
    pub fn normalize_title(title: &str) -> String {
        title
            .split_whitespace()
            .map(|word| word.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Turn a display name into a stable identifier, e.g. "Reuters Business" -> "reuters-business"
    pub fn slugify(name: &str) -> String {
        name.split(|c: char| !c.is_alphanumeric())
            .filter(|part| !part.is_empty())
            .map(|part| part.to_lowercase())
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Truncate text to a maximum number of characters, breaking at a word boundary when possible
    pub fn smart_truncate(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }

        let truncated: String = text.chars().take(max_chars).collect();
        match truncated.rfind(' ') {
            Some(last_space) if last_space > 0 => format!("{}...", &truncated[..last_space]),
            _ => format!("{}...", truncated),
        }
    }

    /// Strip markup tags and collapse whitespace
    pub fn strip_html(html: &str) -> String {
        html.chars()
            .fold((String::new(), false), |(mut text, in_tag), c| match c {
                '<' => (text, true),
                '>' => {
                    text.push(' ');
                    (text, false)
                }
                _ if !in_tag => {
                    text.push(c);
                    (text, in_tag)
                }
                _ => (text, in_tag),
            })
            .0
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    /// Extract domain from URL
    pub fn extract_domain(url_str: &str) -> Option<String> {
        Url::parse(url_str)
            .ok()
            .and_then(|url| url.host_str().map(|d| d.to_string()))
    }

    /// Only http(s) endpoints can be pulled
    pub fn is_valid_feed_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => url.scheme() == "http" || url.scheme() == "https",
            Err(_) => false,
        }
    }

    /// Comparison key for article links: no fragment, no trailing slash
    pub fn canonicalize(url_str: &str) -> String {
        let trimmed = url_str.trim();
        let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
        without_fragment.trim_end_matches('/').to_string()
    }
}

/// Time utilities
pub mod time {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::time::Duration as StdDuration;
    use tokio::time::Instant;

    /// Convert unix seconds (as APIs report them) into a timestamp
    pub fn from_unix(seconds: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(seconds, 0).single()
    }

    /// Parse an RFC 3339 timestamp as reported by JSON APIs
    pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// `now + after`, clamped to roughly a century out instead of overflowing
    pub fn instant_after(now: Instant, after: StdDuration) -> Instant {
        const FAR_FUTURE: StdDuration = StdDuration::from_secs(100 * 365 * 86_400);
        now.checked_add(after)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now)
    }

    /// Format duration in human-readable form
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.num_seconds();

        if total_seconds < 60 {
            format!("{}s", total_seconds)
        } else if total_seconds < 3600 {
            format!("{}m", total_seconds / 60)
        } else if total_seconds < 86400 {
            format!("{}h", total_seconds / 3600)
        } else {
            format!("{}d", total_seconds / 86400)
        }
    }
}
