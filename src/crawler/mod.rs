//! Crawler module: the concurrent crawl orchestrator
//!
//! This module contains the core crawling logic, including:
//! - The shared task queue with drain detection
//! - The dedup registry of claimed issue ids
//! - Per-worker session leases
//! - Statistics aggregation
//! - The worker loop and the session state machine driving it

mod dedup;
mod orchestrator;
mod queue;
mod session_pool;
mod stats;
mod task;
mod worker;

pub use dedup::DedupRegistry;
pub use orchestrator::{worker_count, CrawlOrchestrator, CrawlReport, CrawlRequest, MAX_WORKERS};
pub use queue::TaskQueue;
pub use session_pool::{SessionLease, SessionPool};
pub use stats::{IssueOutcome, StatsAggregator};
pub use task::FetchTask;
pub use worker::{Collaborators, Worker, WorkerContext};

use crate::config::Config;
use crate::storage::{CrawlStore, JsonMirror, SqliteStorage};
use crate::tracker::{ClientSettings, HttpAttachmentDownloader, HttpTracker};
use crate::{ConfigError, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// HTTP settings derived from the tracker section of the config
pub fn client_settings(config: &Config) -> ClientSettings {
    ClientSettings {
        request_timeout: Duration::from_secs(config.tracker.request_timeout_secs),
        session_ttl: Duration::from_secs(config.tracker.session_timeout_minutes * 60),
        ..ClientSettings::default()
    }
}

/// Wires the HTTP tracker, SQLite store, JSON mirror and attachment
/// downloader described by `config` into an orchestrator
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `cancel` - Token that stops the crawl when triggered
///
/// # Returns
///
/// * `Ok(CrawlOrchestrator)` - Ready to run
/// * `Err(CrawlerError)` - Bad base URL or the database could not be opened
pub fn build_orchestrator(config: &Config, cancel: CancellationToken) -> Result<CrawlOrchestrator> {
    let base_url = url::Url::parse(&config.tracker.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;
    let password = config.tracker.password.clone().unwrap_or_default();
    let tracker = Arc::new(HttpTracker::new(
        base_url,
        config.tracker.username.clone(),
        password,
    ));

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let mirror = config.output.issues_dir.as_ref().map(JsonMirror::new);
    let sink = Arc::new(CrawlStore::new(storage, mirror));

    let attachments = if config.crawler.download_attachments {
        Some(Arc::new(HttpAttachmentDownloader::new(&config.output.attachments_dir))
            as Arc<dyn crate::tracker::AttachmentProcessor>)
    } else {
        None
    };

    let collaborators = Collaborators {
        authenticator: tracker.clone(),
        search: tracker.clone(),
        fetcher: tracker,
        attachments,
        sink,
    };

    let mut orchestrator = CrawlOrchestrator::new(collaborators, client_settings(config))
        .with_cancellation(cancel);

    if config.crawler.crawl_timeout_secs > 0 {
        orchestrator =
            orchestrator.with_timeout(Duration::from_secs(config.crawler.crawl_timeout_secs));
    }

    Ok(orchestrator)
}

/// Runs a complete crawl session
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the SQLite database (and JSON mirror if configured)
/// 2. Log in to the tracker
/// 3. Run the search
/// 4. Crawl every hit, following related issues if requested
/// 5. Persist the session record and statistics
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `request` - What to crawl
/// * `cancel` - Token that stops the crawl when triggered
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The session finished (possibly cancelled)
/// * `Err(CrawlerError)` - The session failed
pub async fn crawl(
    config: &Config,
    request: CrawlRequest,
    cancel: CancellationToken,
) -> Result<CrawlReport> {
    build_orchestrator(config, cancel)?.crawl(request).await
}
