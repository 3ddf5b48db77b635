//! Issue-Crawler main entry point
//!
//! This is the command-line interface for the Issue-Crawler tracker harvester.

use anyhow::Context;
use clap::Parser;
use issue_crawler::config::{load_config_with_hash, validate_crawl_limits, Config, CrawlerConfig};
use issue_crawler::crawler::{crawl, worker_count, CrawlRequest};
use issue_crawler::output::{load_latest_report, print_crawl_report, print_session_report};
use issue_crawler::storage::open_storage;
use issue_crawler::SessionStatus;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Issue-Crawler: a concurrent issue tracker harvester
///
/// Issue-Crawler logs in to the issue tracker, runs a search, and crawls
/// every matching issue with a pool of independently authenticated workers,
/// optionally following related issues. Every issue is stored in SQLite as
/// soon as it is fetched.
#[derive(Parser, Debug)]
#[command(name = "issue-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A concurrent issue tracker harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Product the search is scoped to
    #[arg(short, long, required_unless_present = "stats")]
    product: Option<String>,

    /// Search query in tracker syntax
    #[arg(long, required_unless_present = "stats")]
    query: Option<String>,

    /// Maximum number of search results to crawl (overrides config)
    #[arg(long)]
    max_results: Option<usize>,

    /// Follow related issues (overrides config)
    #[arg(long)]
    crawl_related: bool,

    /// Do not follow related issues, even if the config enables it
    #[arg(long, conflicts_with = "crawl_related")]
    no_crawl_related: bool,

    /// Maximum related-issue depth (overrides config)
    #[arg(long)]
    max_depth: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show the latest crawl session from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.stats {
        return handle_stats(&config);
    }

    let request = build_request(&cli, &config.crawler)?;

    if cli.dry_run {
        handle_dry_run(&config, &request);
        Ok(())
    } else {
        handle_crawl(&config, request).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("issue_crawler=info,warn"),
            1 => EnvFilter::new("issue_crawler=debug,info"),
            2 => EnvFilter::new("issue_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Merges command-line overrides into the config defaults
fn build_request(cli: &Cli, config: &CrawlerConfig) -> anyhow::Result<CrawlRequest> {
    let product = cli.product.clone().context("--product is required")?;
    let query = cli.query.clone().context("--query is required")?;

    let mut request = CrawlRequest::from_config(config, product, query);
    if let Some(max_results) = cli.max_results {
        request.max_results = max_results;
    }
    if let Some(max_depth) = cli.max_depth {
        request.max_depth = max_depth;
    }
    if cli.crawl_related {
        request.crawl_related = true;
    } else if cli.no_crawl_related {
        request.crawl_related = false;
    }

    validate_crawl_limits(request.max_results, request.max_depth)
        .context("Invalid command-line crawl limits")?;
    Ok(request)
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config, request: &CrawlRequest) {
    println!("=== Issue-Crawler Dry Run ===\n");

    println!("Tracker:");
    println!("  Base URL: {}", config.tracker.base_url);
    println!("  Username: {}", config.tracker.username);
    println!(
        "  Session timeout: {} minutes",
        config.tracker.session_timeout_minutes
    );
    println!("  Request timeout: {}s", config.tracker.request_timeout_secs);

    println!("\nCrawl:");
    println!("  Product: {}", request.product);
    println!("  Query: {}", request.query);
    println!("  Max results: {}", request.max_results);
    println!("  Crawl related: {}", request.crawl_related);
    println!("  Max depth: {}", request.max_depth);
    println!(
        "  Download attachments: {}",
        config.crawler.download_attachments
    );
    match config.crawler.crawl_timeout_secs {
        0 => println!("  Timeout: none"),
        secs => println!("  Timeout: {}s", secs),
    }
    println!(
        "  Workers: up to {} (for {} results)",
        worker_count(request.max_results),
        request.max_results
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    match &config.output.issues_dir {
        Some(dir) => println!("  JSON mirror: {}", dir),
        None => println!("  JSON mirror: disabled"),
    }
    println!("  Attachments: {}", config.output.attachments_dir);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows the latest session from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))
        .context("Failed to open database")?;

    match load_latest_report(&storage)? {
        Some(report) => print_session_report(&report),
        None => println!("No crawl sessions recorded yet"),
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, request: CrawlRequest) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing in-flight issues");
                cancel.cancel();
            }
        })
    };

    let result = crawl(config, request, cancel).await;
    ctrl_c.abort();

    match result {
        Ok(report) => {
            print_crawl_report(&report);
            if report.status() == SessionStatus::Cancelled {
                tracing::warn!("Crawl was cancelled; partial results were saved");
            } else {
                tracing::info!("Crawl completed successfully");
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
