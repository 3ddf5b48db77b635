//! Crawl session record, aggregate statistics and per-issue results

use crate::state::SessionStatus;
use crate::tracker::IssueRecord;
use crate::CrawlerError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Session-level counters produced by the stats aggregator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Seed issues returned by the search
    pub issues_found: usize,
    /// Successful outcomes (seed and related)
    pub issues_crawled: usize,
    pub failed_issues: usize,
    /// Successful outcomes of tasks without a crawl order
    pub related_issues: usize,
    pub attachments_downloaded: usize,
    pub search_time_ms: u64,
    pub crawl_time_ms: u64,
    /// Mean duration of successful outcomes, 0 when there were none
    pub avg_issue_time_ms: u64,
    pub worker_count: usize,
}

/// One successfully crawled issue, as returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawledIssue {
    pub record: IssueRecord,
    /// Hops from the seed that led here (0 for seeds)
    pub depth: u32,
    /// 1-based search rank; only seeds have one
    pub crawl_order: Option<u32>,
    pub duration_ms: u64,
}

impl CrawledIssue {
    pub fn issue_id(&self) -> &str {
        &self.record.issue_id
    }

    pub fn is_seed(&self) -> bool {
        self.crawl_order.is_some()
    }
}

/// One crawl invocation
///
/// Owned by the orchestrator, which is the only writer. Status changes go
/// through `transition`, which rejects moves the state machine forbids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlSession {
    /// UUID identifying the session in storage
    pub id: String,
    pub product: String,
    pub query: String,
    pub max_results: usize,
    pub crawl_related: bool,
    pub max_depth: u32,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stats: SessionStats,
    /// Fatal error message for failed sessions
    pub error: Option<String>,
}

impl CrawlSession {
    /// Creates a session in the `Init` state with a fresh UUID
    pub fn new(
        product: impl Into<String>,
        query: impl Into<String>,
        max_results: usize,
        crawl_related: bool,
        max_depth: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            product: product.into(),
            query: query.into(),
            max_results,
            crawl_related,
            max_depth,
            status: SessionStatus::Init,
            started_at: Utc::now(),
            completed_at: None,
            stats: SessionStats::default(),
            error: None,
        }
    }

    /// Moves the session to `next`
    ///
    /// Entering a terminal status stamps `completed_at`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The transition was applied
    /// * `Err(CrawlerError::InvalidTransition)` - The state machine forbids it
    pub fn transition(&mut self, next: SessionStatus) -> Result<(), CrawlerError> {
        if !self.status.can_transition_to(next) {
            return Err(CrawlerError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        tracing::debug!(session = %self.id, "Session {} -> {}", self.status, next);
        self.status = next;

        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }

        Ok(())
    }

    /// Marks the session failed with the given error message
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CrawlerError> {
        self.transition(SessionStatus::Failed)?;
        self.error = Some(message.into());
        Ok(())
    }
}
