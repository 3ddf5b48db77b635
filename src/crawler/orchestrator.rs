//! Crawl orchestrator - top-level session state machine
//!
//! One call to `CrawlOrchestrator::crawl` runs a whole crawl session:
//! - AUTHENTICATING: log in once on the primary session
//! - SEARCHING: run the query and take the ranked seed list
//! - CRAWLING: seed the task queue and drain it with a worker pool
//! - COMPLETING: aggregate statistics and persist the session record
//!
//! Authentication and search failures abort the session. Per-task failures
//! never do; they only show up in the counters and the session error log.

use crate::config::{validate_crawl_limits, CrawlerConfig};
use crate::crawler::dedup::DedupRegistry;
use crate::crawler::queue::TaskQueue;
use crate::crawler::session_pool::SessionPool;
use crate::crawler::stats::StatsAggregator;
use crate::crawler::task::FetchTask;
use crate::crawler::worker::{panic_message, Collaborators, Worker, WorkerContext};
use crate::state::{CrawlSession, CrawledIssue, SessionStats, SessionStatus};
use crate::storage::SearchQueryRecord;
use crate::tracker::ClientSettings;
use crate::{CrawlerError, Result};
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Never run more workers than this, whatever the seed count
pub const MAX_WORKERS: usize = 10;

/// Share of the seed count used as worker count
const WORKERS_PER_SEED: f64 = 0.3;

/// Sizes the worker pool for `seeds` seed tasks
///
/// `clamp(round(0.3 * seeds), 1, 10)`: at least one worker, at most ten.
pub fn worker_count(seeds: usize) -> usize {
    ((seeds as f64 * WORKERS_PER_SEED).round() as usize).clamp(1, MAX_WORKERS)
}

/// Parameters of one crawl invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    pub product: String,
    /// Query string in the tracker's search syntax
    pub query: String,
    pub max_results: usize,
    pub crawl_related: bool,
    pub max_depth: u32,
}

impl CrawlRequest {
    /// A request using the crawl defaults from the config file
    pub fn from_config(
        config: &CrawlerConfig,
        product: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            product: product.into(),
            query: query.into(),
            max_results: config.max_results,
            crawl_related: config.crawl_related,
            max_depth: config.max_depth,
        }
    }
}

/// Everything a finished (or cancelled) crawl produced
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub session: CrawlSession,
    /// Successful issues: seeds in rank order, then related issues
    pub issues: Vec<CrawledIssue>,
}

impl CrawlReport {
    pub fn stats(&self) -> &SessionStats {
        &self.session.stats
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    /// Successful seed issues in search rank order
    pub fn seeds(&self) -> impl Iterator<Item = &CrawledIssue> {
        self.issues.iter().filter(|i| i.is_seed())
    }

    /// Successful related issues
    pub fn related(&self) -> impl Iterator<Item = &CrawledIssue> {
        self.issues.iter().filter(|i| !i.is_seed())
    }
}

/// Runs crawl sessions against a set of collaborators
pub struct CrawlOrchestrator {
    collaborators: Collaborators,
    pool: SessionPool,
    cancel: CancellationToken,
    crawl_timeout: Option<Duration>,
}

impl CrawlOrchestrator {
    /// Creates an orchestrator
    ///
    /// # Arguments
    ///
    /// * `collaborators` - Authenticator, search, fetcher, attachment processor and sink
    /// * `settings` - HTTP settings for the sessions the pool opens
    pub fn new(collaborators: Collaborators, settings: ClientSettings) -> Self {
        Self {
            collaborators,
            pool: SessionPool::new(settings),
            cancel: CancellationToken::new(),
            crawl_timeout: None,
        }
    }

    /// Uses an externally owned cancellation token (e.g. wired to Ctrl-C)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancels the crawl phase after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.crawl_timeout = Some(timeout);
        self
    }

    /// Token that cancels any running crawl when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs one crawl session to completion
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - Status COMPLETED, or CANCELLED with partial results
    /// * `Err(CrawlerError::Config)` - Invalid limits; no session is recorded
    /// * `Err(CrawlerError::Authentication)` - Primary login failed
    /// * `Err(CrawlerError::Search)` - Search failed; nothing was fetched
    /// * `Err(CrawlerError::WorkerPanic)` - A worker died outside task recovery
    pub async fn crawl(&self, request: CrawlRequest) -> Result<CrawlReport> {
        validate_crawl_limits(request.max_results, request.max_depth)?;

        let mut session = CrawlSession::new(
            request.product.clone(),
            request.query.clone(),
            request.max_results,
            request.crawl_related,
            request.max_depth,
        );
        let stats = Arc::new(StatsAggregator::new());
        let c = &self.collaborators;

        tracing::info!(
            session = %session.id,
            "Starting crawl: product={}, query={:?}, max_results={}, crawl_related={}, max_depth={}",
            request.product,
            request.query,
            request.max_results,
            request.crawl_related,
            request.max_depth
        );

        if let Err(e) = c.sink.begin_session(&session).await {
            tracing::warn!(session = %session.id, "Could not record session start: {}", e);
        }

        // ===== Authenticating =====
        session.transition(SessionStatus::Authenticating)?;
        let mut primary = match self.pool.primary() {
            Ok(primary) => primary,
            Err(e) => return Err(self.abort(&mut session, &stats, e.into()).await),
        };
        if let Err(e) = c.authenticator.login(&mut primary).await {
            return Err(self.abort(&mut session, &stats, e.into()).await);
        }

        // ===== Searching =====
        session.transition(SessionStatus::Searching)?;
        let search_started = Instant::now();
        let mut seeds = match c
            .search
            .search(&primary, &request.query, request.max_results)
            .await
        {
            Ok(seeds) => seeds,
            Err(e) => return Err(self.abort(&mut session, &stats, e.into()).await),
        };
        drop(primary);

        seeds.truncate(request.max_results);
        let search_time_ms = search_started.elapsed().as_millis() as u64;
        stats.set_issues_found(seeds.len());
        stats.set_search_time_ms(search_time_ms);
        tracing::info!(session = %session.id, "Search returned {} issues", seeds.len());

        let search = SearchQueryRecord {
            query: request.query.clone(),
            product: request.product.clone(),
            results_count: seeds.len(),
            search_time_ms,
            queried_at: Utc::now().to_rfc3339(),
        };
        if let Err(e) = c.sink.record_search(&session.id, &search).await {
            tracing::warn!(session = %session.id, "Could not record search: {}", e);
        }

        // ===== Crawling =====
        session.transition(SessionStatus::Crawling)?;
        let crawl_started = Instant::now();
        let workers = worker_count(seeds.len());
        stats.set_worker_count(workers);

        let leases = match (0..workers)
            .map(|_| self.pool.acquire())
            .collect::<std::result::Result<Vec<_>, _>>()
        {
            Ok(leases) => leases,
            Err(e) => return Err(self.abort(&mut session, &stats, e.into()).await),
        };

        let cancel = self.cancel.child_token();
        let queue = Arc::new(TaskQueue::new());
        queue.extend(
            seeds
                .into_iter()
                .enumerate()
                .map(|(rank, issue)| FetchTask::seed(issue, rank as u32 + 1)),
        );

        let ctx = Arc::new(WorkerContext {
            session_id: session.id.clone(),
            queue: Arc::clone(&queue),
            dedup: Arc::new(DedupRegistry::new()),
            stats: Arc::clone(&stats),
            collaborators: c.clone(),
            crawl_related: request.crawl_related,
            max_depth: request.max_depth,
            cancel: cancel.clone(),
        });

        let timer = self.crawl_timeout.map(|timeout| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        tracing::warn!("Crawl timeout of {:?} reached, cancelling", timeout);
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            })
        });

        tracing::info!(session = %session.id, "Launching {} workers", workers);

        let mut join_set = JoinSet::new();
        for (idx, lease) in leases.into_iter().enumerate() {
            let worker_id = idx + 1;
            let worker = Worker::new(worker_id, Arc::clone(&ctx), lease);
            join_set.spawn(async move {
                let result = AssertUnwindSafe(worker.run()).catch_unwind().await;
                (worker_id, result)
            });
        }

        let mut issues = Vec::new();
        let mut failure: Option<CrawlerError> = None;

        while let Some(joined) = join_set.join_next().await {
            let error = match joined {
                Ok((_, Ok(mut crawled))) => {
                    issues.append(&mut crawled);
                    continue;
                }
                Ok((worker, Err(panic))) => CrawlerError::WorkerPanic {
                    worker,
                    message: panic_message(panic.as_ref()),
                },
                Err(e) => CrawlerError::WorkerJoin(e),
            };

            tracing::error!(session = %session.id, "{}", error);
            // Stop the other workers; a dead worker may hold an unfinished task
            cancel.cancel();
            if failure.is_none() {
                failure = Some(error);
            }
        }

        let cancelled = cancel.is_cancelled() && !queue.is_drained();
        cancel.cancel();
        if let Some(timer) = timer {
            timer.abort();
        }

        stats.set_crawl_time_ms(crawl_started.elapsed().as_millis() as u64);

        if let Some(error) = failure {
            return Err(self.abort(&mut session, &stats, error).await);
        }

        // ===== Completing =====
        session.transition(SessionStatus::Completing)?;
        session.stats = stats.snapshot();
        issues.sort_by_key(|issue| (issue.crawl_order.is_none(), issue.crawl_order));

        let final_status = if cancelled {
            tracing::warn!(
                session = %session.id,
                "Crawl cancelled with {} tasks outstanding",
                queue.outstanding()
            );
            SessionStatus::Cancelled
        } else {
            SessionStatus::Completed
        };
        session.transition(final_status)?;

        if let Err(e) = c.sink.finish_session(&session).await {
            tracing::warn!(session = %session.id, "Could not persist session statistics: {}", e);
        }

        tracing::info!(
            session = %session.id,
            "Crawl {}: {} found, {} crawled, {} failed, {} related in {}ms",
            session.status,
            session.stats.issues_found,
            session.stats.issues_crawled,
            session.stats.failed_issues,
            session.stats.related_issues,
            session.stats.crawl_time_ms
        );

        Ok(CrawlReport { session, issues })
    }

    /// Moves the session to FAILED, persists it and hands back the error
    async fn abort(
        &self,
        session: &mut CrawlSession,
        stats: &StatsAggregator,
        error: CrawlerError,
    ) -> CrawlerError {
        tracing::error!(session = %session.id, "Crawl failed: {}", error);

        if let Err(e) = session.fail(error.to_string()) {
            tracing::warn!(session = %session.id, "{}", e);
        }
        session.stats = stats.snapshot();

        if let Err(e) = self.collaborators.sink.finish_session(session).await {
            tracing::warn!(session = %session.id, "Could not persist failed session: {}", e);
        }

        error
    }
}
