//! Session statistics aggregation
//!
//! Workers report one `IssueOutcome` per finished task. Counters live behind
//! their own lock, separate from the dedup registry's.

use crate::state::SessionStats;
use std::sync::{Mutex, PoisonError};

/// Result of one task, consumed by the aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueOutcome {
    pub issue_id: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub discovered_related: Vec<String>,
    /// Copied from the task; None for related tasks
    pub crawl_order: Option<u32>,
    pub attachments_downloaded: usize,
}

impl IssueOutcome {
    pub fn succeeded(
        issue_id: impl Into<String>,
        duration_ms: u64,
        crawl_order: Option<u32>,
        discovered_related: Vec<String>,
        attachments_downloaded: usize,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            success: true,
            duration_ms,
            error: None,
            discovered_related,
            crawl_order,
            attachments_downloaded,
        }
    }

    pub fn failed(
        issue_id: impl Into<String>,
        duration_ms: u64,
        crawl_order: Option<u32>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            success: false,
            duration_ms,
            error: Some(error.into()),
            discovered_related: Vec::new(),
            crawl_order,
            attachments_downloaded: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    stats: SessionStats,
    success_duration_sum_ms: u64,
}

/// Thread-safe accumulator of session counters
#[derive(Debug, Default)]
pub struct StatsAggregator {
    inner: Mutex<Counters>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_counters<T>(&self, f: impl FnOnce(&mut Counters) -> T) -> T {
        let mut counters = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut counters)
    }

    /// Folds one outcome into the counters
    ///
    /// `related_issues` counts successful outcomes of tasks without a crawl
    /// order, so it is always a subset of `issues_crawled`.
    pub fn record(&self, outcome: &IssueOutcome) {
        self.with_counters(|c| {
            if outcome.success {
                c.stats.issues_crawled += 1;
                c.success_duration_sum_ms += outcome.duration_ms;
                c.stats.attachments_downloaded += outcome.attachments_downloaded;
                if outcome.crawl_order.is_none() {
                    c.stats.related_issues += 1;
                }
            } else {
                c.stats.failed_issues += 1;
            }
        });
    }

    pub fn set_issues_found(&self, found: usize) {
        self.with_counters(|c| c.stats.issues_found = found);
    }

    pub fn set_search_time_ms(&self, ms: u64) {
        self.with_counters(|c| c.stats.search_time_ms = ms);
    }

    pub fn set_crawl_time_ms(&self, ms: u64) {
        self.with_counters(|c| c.stats.crawl_time_ms = ms);
    }

    pub fn set_worker_count(&self, workers: usize) {
        self.with_counters(|c| c.stats.worker_count = workers);
    }

    /// Copy of the current counters with the average filled in
    ///
    /// The average is the rounded mean duration of successful outcomes, or 0
    /// when nothing succeeded.
    pub fn snapshot(&self) -> SessionStats {
        self.with_counters(|c| {
            let mut stats = c.stats.clone();
            stats.avg_issue_time_ms = match stats.issues_crawled {
                0 => 0,
                n => (c.success_duration_sum_ms as f64 / n as f64).round() as u64,
            };
            stats
        })
    }
}
