mod common;

use chrono::{TimeZone, Utc};
use common::{init_tracing, source};
use news_aggregator::sources::api_feed::{parse_guardian, parse_newsapi};
use news_aggregator::sources::free_feed::{parse_hn_items, parse_hn_story_ids, parse_reddit};
use news_aggregator::sources::{ApiProvider, FreeProvider};
use news_aggregator::types::*;
use news_aggregator::FeedParser;
use serde_json::json;
use tracing::info;

const RSS_FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Markets</title>
    <link>https://markets.example.com</link>
    <description>Market news</description>
    <item>
      <title>Fed raises rates</title>
      <link>https://markets.example.com/fed</link>
      <description>&lt;p&gt;Rates go &lt;b&gt;up&lt;/b&gt; again&lt;/p&gt;</description>
      <pubDate>Mon, 06 Sep 2021 16:45:00 +0000</pubDate>
    </item>
    <item>
      <link>https://markets.example.com/untitled</link>
      <description>No title here</description>
    </item>
    <item>
      <title>Fed raises rates (updated)</title>
      <link>https://markets.example.com/fed</link>
    </item>
    <item>
      <title>Oil   slides
        on supply news</title>
      <link>https://markets.example.com/oil</link>
    </item>
  </channel>
</rss>"#;

const ATOM_FIXTURE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Tech</title>
  <id>urn:example:tech</id>
  <updated>2024-03-01T10:00:00Z</updated>
  <entry>
    <title>New chip announced</title>
    <id>urn:example:tech:1</id>
    <link href="https://tech.example.com/chip"/>
    <updated>2024-03-01T09:30:00Z</updated>
    <summary>A faster chip.</summary>
  </entry>
</feed>"#;

#[test]
fn test_rss_entries_are_parsed_and_bad_ones_skipped() -> Result<()> {
    init_tracing();
    let src = source("markets", "financial", 2, 0);
    let fetched_at = Utc::now();

    let articles = FeedParser::parse_articles(&src, RSS_FIXTURE, fetched_at)?;
    info!("Parsed {} RSS articles", articles.len());

    assert_eq!(articles.len(), 2);
    let fed = &articles[0];
    assert_eq!(fed.title, "Fed raises rates");
    assert_eq!(fed.url, "https://markets.example.com/fed");
    assert_eq!(fed.published_at, Utc.with_ymd_and_hms(2021, 9, 6, 16, 45, 0).unwrap());
    assert_eq!(fed.priority, 2);
    assert_eq!(fed.category, "financial");
    let summary = fed.summary.as_deref().unwrap_or_default();
    assert!(summary.contains("Rates go"));
    assert!(!summary.contains('<'));

    let oil = &articles[1];
    assert_eq!(oil.title, "Oil slides on supply news");
    assert_eq!(oil.published_at, fetched_at);
    Ok(())
}

#[test]
fn test_rss_respects_per_source_cap() -> Result<()> {
    let mut src = source("markets", "financial", 1, 0);
    src.max_articles = 1;

    let articles = FeedParser::parse_articles(&src, RSS_FIXTURE, Utc::now())?;
    assert_eq!(articles.len(), 1);
    Ok(())
}

#[test]
fn test_atom_falls_back_to_updated_time() -> Result<()> {
    let src = source("tech", "technology", 1, 0);
    let articles = FeedParser::parse_articles(&src, ATOM_FIXTURE, Utc::now())?;

    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "New chip announced");
    assert_eq!(articles[0].url, "https://tech.example.com/chip");
    assert_eq!(
        articles[0].published_at,
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    );
    Ok(())
}

#[test]
fn test_non_feed_document_fails_whole_source() {
    let src = source("broken", "general", 1, 0);
    let body = "<html><body>Maintenance</body></html>";
    let result = FeedParser::parse_articles(&src, body, Utc::now());
    assert!(matches!(result, Err(AggregatorError::Parse(_))));
}

#[test]
fn test_newsapi_skips_removed_and_malformed_entries() -> Result<()> {
    let src = source("newsapi-business", "financial", 2, 0);
    let body = json!({
        "status": "ok",
        "totalResults": 4,
        "articles": [
            {
                "title": "Stocks rally on jobs data",
                "description": "Indexes climb.",
                "url": "https://news.example.com/stocks",
                "publishedAt": "2024-05-03T13:00:00Z"
            },
            { "title": "[Removed]", "url": "https://removed.com", "publishedAt": "2024-05-03T12:00:00Z" },
            { "title": 42, "url": "https://news.example.com/bad" },
            { "title": "No link", "url": null }
        ]
    });

    let articles = parse_newsapi(&src, &body, Utc::now())?;

    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "Stocks rally on jobs data");
    assert_eq!(articles[0].summary.as_deref(), Some("Indexes climb."));
    assert_eq!(
        articles[0].published_at,
        Utc.with_ymd_and_hms(2024, 5, 3, 13, 0, 0).unwrap()
    );
    Ok(())
}

#[test]
fn test_newsapi_error_payloads() {
    let src = source("newsapi-business", "financial", 2, 0);

    let limited = json!({ "status": "error", "code": "rateLimited", "message": "Too many requests" });
    assert!(matches!(
        parse_newsapi(&src, &limited, Utc::now()),
        Err(AggregatorError::RateLimited { .. })
    ));

    let bad_key = json!({ "status": "error", "code": "apiKeyInvalid" });
    let err = parse_newsapi(&src, &bad_key, Utc::now()).unwrap_err();
    assert!(!err.is_transient());
}

#[test]
fn test_guardian_results_are_decoded() -> Result<()> {
    let src = source("the-guardian", "general", 2, 0);
    let body = json!({
        "response": {
            "status": "ok",
            "results": [
                {
                    "webTitle": "Heatwave grips Europe",
                    "webUrl": "https://www.theguardian.com/world/heatwave",
                    "webPublicationDate": "2024-07-10T08:15:00Z",
                    "fields": { "standfirst": "<p>Temperatures <strong>soar</strong></p>" }
                },
                { "webUrl": "https://www.theguardian.com/missing-title" }
            ]
        }
    });

    let articles = parse_guardian(&src, &body, Utc::now())?;

    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].summary.as_deref(), Some("Temperatures soar"));
    Ok(())
}

#[test]
fn test_hacker_news_keeps_linked_stories_only() -> Result<()> {
    let src = source("hacker-news", "technology", 2, 0);

    let ids = parse_hn_story_ids(&json!([101, 102, 103, 104]), 3)?;
    assert_eq!(ids, vec![101, 102, 103]);

    let items = vec![
        json!({ "id": 101, "type": "story", "title": "Show HN: A tiny database", "url": "https://db.example.com", "time": 1_700_000_000 }),
        json!({ "id": 102, "type": "job", "title": "Hiring", "url": "https://jobs.example.com", "time": 1_700_000_000 }),
        json!({ "id": 103, "type": "story", "title": "Ask HN: Favourite editor?", "time": 1_700_000_000 }),
        json!({ "id": 104, "type": "story", "title": "Gone", "url": "https://gone.example.com", "dead": true }),
    ];
    let articles = parse_hn_items(&src, &items, Utc::now());

    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "Show HN: A tiny database");
    assert_eq!(articles[0].published_at, Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    Ok(())
}

#[test]
fn test_reddit_skips_self_and_pinned_posts() -> Result<()> {
    let src = source("reddit-news", "general", 1, 0);
    let body = json!({
        "kind": "Listing",
        "data": {
            "children": [
                { "kind": "t3", "data": { "title": "Pinned rules", "url": "https://reddit.com/r/news/rules", "stickied": true, "created_utc": 1_700_000_000.0 } },
                { "kind": "t3", "data": { "title": "Discussion thread", "url": "https://reddit.com/r/news/self", "is_self": true, "created_utc": 1_700_000_100.0 } },
                { "kind": "t3", "data": { "title": "Court rules on merger", "url": "https://court.example.com/merger", "created_utc": 1_700_000_200.0 } }
            ]
        }
    });

    let articles = parse_reddit(&src, &body, Utc::now())?;

    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "Court rules on merger");
    assert_eq!(articles[0].published_at, Utc.timestamp_opt(1_700_000_200, 0).unwrap());
    Ok(())
}

#[test]
fn test_providers_are_chosen_by_host() {
    assert_eq!(
        ApiProvider::from_endpoint("https://newsapi.org/v2/top-headlines").ok(),
        Some(ApiProvider::NewsApi)
    );
    assert_eq!(
        ApiProvider::from_endpoint("https://content.guardianapis.com/search").ok(),
        Some(ApiProvider::Guardian)
    );
    assert!(matches!(
        ApiProvider::from_endpoint("https://api.example.com/news"),
        Err(AggregatorError::Config(_))
    ));

    assert_eq!(
        FreeProvider::from_endpoint("https://hacker-news.firebaseio.com/v0/topstories.json").ok(),
        Some(FreeProvider::HackerNews)
    );
    assert_eq!(
        FreeProvider::from_endpoint("https://www.reddit.com/r/news/hot.json").ok(),
        Some(FreeProvider::Reddit)
    );
    assert!(FreeProvider::from_endpoint("https://notreddit.com/r/news").is_err());
}
