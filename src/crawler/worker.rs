//! Crawl worker loop
//!
//! A worker owns one session lease for its whole life and repeatedly:
//! 1. Dequeues a task (stopping on drain or cancellation)
//! 2. Claims the issue id, silently dropping duplicates
//! 3. Re-authenticates its own session if needed
//! 4. Fetches and parses the page, then claims the id the page reports when
//!    it differs from the link id, dropping the task if that id is taken
//! 5. Downloads attachments
//! 6. Writes the primary store (fatal to the task) and the mirror (best-effort)
//! 7. Fans out related issues while under the depth limit
//!
//! Any failure in 3-6, a panic included, releases every claim the task took,
//! is logged to the session error log and counted; the loop continues.

use crate::crawler::dedup::DedupRegistry;
use crate::crawler::queue::TaskQueue;
use crate::crawler::session_pool::SessionLease;
use crate::crawler::stats::{IssueOutcome, StatsAggregator};
use crate::crawler::task::FetchTask;
use crate::state::CrawledIssue;
use crate::storage::{PersistenceSink, SessionErrorRecord};
use crate::tracker::{
    AttachmentProcessor, Authenticator, FetchError, IssueFetcher, SearchExecutor,
};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// The external collaborators a crawl talks to
#[derive(Clone)]
pub struct Collaborators {
    pub authenticator: Arc<dyn Authenticator>,
    pub search: Arc<dyn SearchExecutor>,
    pub fetcher: Arc<dyn IssueFetcher>,
    /// None disables attachment downloads
    pub attachments: Option<Arc<dyn AttachmentProcessor>>,
    pub sink: Arc<dyn PersistenceSink>,
}

/// State shared by all workers of one crawl session
pub struct WorkerContext {
    /// UUID of the crawl session, used for persistence
    pub session_id: String,
    pub queue: Arc<TaskQueue>,
    pub dedup: Arc<DedupRegistry>,
    pub stats: Arc<StatsAggregator>,
    pub collaborators: Collaborators,
    pub crawl_related: bool,
    pub max_depth: u32,
    pub cancel: CancellationToken,
}

/// One member of the worker pool
pub struct Worker {
    id: usize,
    ctx: Arc<WorkerContext>,
    session: SessionLease,
    /// Page-reported id claimed by the current task, when it differs from the link id
    canonical_claim: Option<String>,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>, session: SessionLease) -> Self {
        Self {
            id,
            ctx,
            session,
            canonical_claim: None,
        }
    }

    /// Runs until the queue drains or the crawl is cancelled
    ///
    /// Returns the issues this worker crawled successfully. The session lease
    /// is dropped when this returns or unwinds.
    pub async fn run(mut self) -> Vec<CrawledIssue> {
        let mut crawled = Vec::new();
        tracing::debug!(worker = self.id, session = self.session.id(), "Worker started");

        while let Some(task) = self.ctx.queue.next(&self.ctx.cancel).await {
            if !self.ctx.dedup.claim(task.issue_id()) {
                tracing::debug!(
                    worker = self.id,
                    issue_id = %task.issue.id,
                    "Already claimed, dropping task"
                );
                self.ctx.queue.task_done();
                continue;
            }

            if let Some(issue) = self.handle(&task).await {
                crawled.push(issue);
            }

            self.ctx.queue.task_done();
        }

        tracing::debug!(worker = self.id, crawled = crawled.len(), "Worker finished");
        crawled
    }

    /// Processes one claimed task and records its outcome
    async fn handle(&mut self, task: &FetchTask) -> Option<CrawledIssue> {
        let started = Instant::now();
        self.canonical_claim = None;

        let result = match AssertUnwindSafe(self.process(task, started))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(FetchError::Panicked(panic_message(panic.as_ref()))),
        };

        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(None) => None,
            Ok(Some(issue)) => {
                let related_ids = issue.record.related_ids();

                if self.ctx.crawl_related && task.depth < self.ctx.max_depth {
                    for related in &issue.record.related {
                        self.ctx
                            .queue
                            .push(FetchTask::related(related.clone(), task.depth));
                    }
                    if !related_ids.is_empty() {
                        tracing::debug!(
                            worker = self.id,
                            issue_id = %task.issue.id,
                            depth = task.depth,
                            "Queued {} related issues",
                            related_ids.len()
                        );
                    }
                }

                self.ctx.stats.record(&IssueOutcome::succeeded(
                    task.issue_id(),
                    duration_ms,
                    task.crawl_order,
                    related_ids,
                    issue.record.downloaded_attachments(),
                ));

                tracing::info!(
                    worker = self.id,
                    issue_id = %task.issue.id,
                    depth = task.depth,
                    "Crawled issue in {}ms",
                    duration_ms
                );
                Some(issue)
            }
            Err(e) => {
                self.ctx.dedup.release(task.issue_id());
                if let Some(canonical) = self.canonical_claim.take() {
                    self.ctx.dedup.release(&canonical);
                }

                tracing::error!(
                    worker = self.id,
                    issue_id = %task.issue.id,
                    depth = task.depth,
                    "Failed to crawl issue: {}",
                    e
                );

                let entry = SessionErrorRecord::error(Some(task.issue_id()), e.kind(), e.to_string());
                if let Err(log_err) = self
                    .ctx
                    .collaborators
                    .sink
                    .record_error(&self.ctx.session_id, &entry)
                    .await
                {
                    tracing::warn!(issue_id = %task.issue.id, "Could not log session error: {}", log_err);
                }

                self.ctx.stats.record(&IssueOutcome::failed(
                    task.issue_id(),
                    duration_ms,
                    task.crawl_order,
                    e.to_string(),
                ));
                None
            }
        }
    }

    /// Authenticate, fetch, download attachments, persist
    ///
    /// Returns `Ok(None)` when the page turns out to be an issue another task
    /// already claimed under its canonical id.
    async fn process(
        &mut self,
        task: &FetchTask,
        started: Instant,
    ) -> Result<Option<CrawledIssue>, FetchError> {
        let collaborators = &self.ctx.collaborators;

        if !collaborators.authenticator.is_valid(&self.session) {
            tracing::debug!(worker = self.id, session = self.session.id(), "Authenticating session");
            collaborators
                .authenticator
                .reauthenticate(&mut self.session)
                .await?;
        }

        let mut record = collaborators
            .fetcher
            .fetch_issue(&mut self.session, &task.issue)
            .await?;

        if record.issue_id != task.issue_id() {
            if !self.ctx.dedup.claim(&record.issue_id) {
                tracing::debug!(
                    worker = self.id,
                    issue_id = %task.issue.id,
                    canonical_id = %record.issue_id,
                    "Page resolves to an issue already claimed, dropping task"
                );
                return Ok(None);
            }
            self.canonical_claim = Some(record.issue_id.clone());
        }

        if let Some(processor) = &collaborators.attachments {
            if !record.attachments.is_empty() {
                let issue_id = record.issue_id.clone();
                processor
                    .process_all(&self.session, &issue_id, &mut record.attachments)
                    .await;
            }
        }

        let issue = CrawledIssue {
            record,
            depth: task.depth,
            crawl_order: task.crawl_order,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        collaborators
            .sink
            .write_issue(&self.ctx.session_id, &issue)
            .await?;

        if let Err(e) = collaborators.sink.mirror_issue(&issue).await {
            tracing::warn!(issue_id = %task.issue.id, "Mirror write failed: {}", e);
        }

        Ok(Some(issue))
    }
}

/// Extracts a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
