use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use clap::Parser;
use news_aggregator::utils::text::smart_truncate;
use news_aggregator::utils::time::format_duration;
use news_aggregator::utils::url::extract_domain;
use news_aggregator::{
    ApiKeys, Article, Batch, DisplaySink, OperatingMode, PipelineBuilder, PipelineConfig,
    SourceCatalog,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};

const TITLE_WIDTH: usize = 110;

/// Live, deduplicated news stream from RSS feeds, news APIs and community feeds
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Only show these categories, e.g. financial,crypto
    #[arg(short, long, value_delimiter = ',')]
    categories: Vec<String>,

    /// Seconds between refreshes
    #[arg(long)]
    interval: Option<f64>,

    /// Maximum fetches in flight at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-fetch timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Seconds a successful fetch is reused
    #[arg(long)]
    cache_ttl: Option<u64>,

    /// High-frequency mode: faster refresh and larger batches
    #[arg(long)]
    trading: bool,

    /// Fetch once, print and exit
    #[arg(long)]
    fetch: bool,

    /// Print the fetched batch as JSON
    #[arg(long, requires = "fetch")]
    json: bool,

    /// JSON source catalog to use instead of the built-in one
    #[arg(long, env = "NEWS_CATALOG")]
    catalog: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mode = if self.trading {
            OperatingMode::HighFrequency
        } else {
            OperatingMode::Normal
        };
        let mut config = PipelineConfig::for_mode(mode).with_categories(&self.categories);

        if let Some(seconds) = self.interval {
            if seconds.is_nan() || seconds <= 0.0 {
                bail!("--interval must be a positive number of seconds");
            }
            config.refresh_interval =
                Duration::try_from_secs_f64(seconds).context("--interval is out of range")?;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency_limit = concurrency;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.per_fetch_timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(ttl) = self.cache_ttl {
            config.cache_ttl = Duration::from_secs(ttl);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Prints new articles as they arrive
struct TerminalSink;

impl TerminalSink {
    fn print_article(article: &Article, breaking: bool) {
        let age = format_duration(Utc::now().signed_duration_since(article.published_at));
        let site = extract_domain(&article.url).unwrap_or_else(|| article.source_name.clone());
        println!(
            "{}{} {:>4} ago  [{}] ({}) {}",
            if breaking { "BREAKING " } else { "" },
            article.published_at.with_timezone(&Local).format("%H:%M"),
            age,
            article.source_name,
            article.category,
            smart_truncate(&article.title, TITLE_WIDTH)
        );
        println!("      {} {}", site, article.url);
    }
}

impl DisplaySink for TerminalSink {
    fn publish(&mut self, batch: &Batch) {
        if batch.cycle == 1 && batch.is_empty() {
            println!("No articles yet ({} sources failed)", batch.summary.sources_failed);
        }
        for article in batch.delta.iter().rev() {
            Self::print_article(article, batch.is_breaking(article));
        }
        let breaking_new = batch.delta.iter().filter(|a| batch.is_breaking(a)).count();
        if breaking_new > 0 {
            println!(">>> {} breaking", breaking_new);
        }
    }

    fn flash(&mut self, delta: &[Article]) {
        println!(
            ">>> {} new article{} at {}",
            delta.len(),
            if delta.len() == 1 { "" } else { "s" },
            Local::now().format("%H:%M:%S")
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = cli.pipeline_config()?;
    let catalog = match &cli.catalog {
        Some(path) => SourceCatalog::load(path)
            .with_context(|| format!("failed to load catalog {}", path.display()))?,
        None => SourceCatalog::builtin(),
    };

    let (mut publisher, handle) = PipelineBuilder::new(config)
        .with_catalog(catalog)
        .with_api_keys(ApiKeys::from_env())
        .with_sink(Box::new(TerminalSink))
        .build()
        .context("invalid pipeline configuration")?;

    if cli.fetch {
        let batch = publisher.fetch_now().await;
        publisher.shutdown().await;

        if cli.json {
            println!("{}", serde_json::to_string_pretty(&batch.articles)?);
        } else {
            for article in &batch.articles {
                TerminalSink::print_article(article, batch.is_breaking(article));
            }
            println!(
                "{} articles, {} breaking, from {} sources ({} failed)",
                batch.len(),
                batch.breaking_count(),
                batch.summary.sources_ok,
                batch.summary.sources_failed
            );
        }
        return Ok(());
    }

    let interrupt = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            interrupt.stop();
        }
    });

    publisher.run().await;
    Ok(())
}
