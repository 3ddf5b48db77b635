//! In-memory collaborators for driving the orchestrator without a tracker

use async_trait::async_trait;
use issue_crawler::crawler::{Collaborators, CrawlOrchestrator, CrawlRequest};
use issue_crawler::state::{CrawlSession, CrawledIssue};
use issue_crawler::storage::{
    PersistenceSink, SearchQueryRecord, SessionErrorRecord, StorageError, StorageResult,
};
use issue_crawler::tracker::{
    parse_issue_page, AuthError, AuthSession, Authenticator, ClientSettings, FetchError,
    IssueFetcher, IssueRecord, IssueRef, SearchError, SearchExecutor,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn issue_url(id: &str) -> String {
    format!("https://tracker.test/issues/{}", id)
}

/// Scriptable tracker: seeds, a related-issue graph, failing and panicking ids
///
/// Ids registered with [`MockTracker::page`] are served through the real
/// page parser instead of the synthetic record.
#[derive(Default)]
pub struct MockTracker {
    seeds: Vec<String>,
    graph: HashMap<String, Vec<String>>,
    pages: HashMap<String, String>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delay: Duration,
    reject_login: bool,
    fail_search: bool,

    pub logins: AtomicUsize,
    fetch_counts: Mutex<HashMap<String, usize>>,
    sessions_seen: Mutex<HashSet<usize>>,
}

impl MockTracker {
    pub fn with_seeds<S: AsRef<str>>(seeds: &[S]) -> Self {
        Self {
            seeds: seeds.iter().map(|s| s.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }

    /// Seeds "1".."n"
    pub fn numbered(n: usize) -> Self {
        let seeds: Vec<String> = (1..=n).map(|i| i.to_string()).collect();
        Self::with_seeds(&seeds[..])
    }

    pub fn related<S: AsRef<str>>(mut self, id: &str, related: &[S]) -> Self {
        self.graph.insert(
            id.to_string(),
            related.iter().map(|s| s.as_ref().to_string()).collect(),
        );
        self
    }

    pub fn page(mut self, id: &str, html: impl Into<String>) -> Self {
        self.pages.insert(id.to_string(), html.into());
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn panicking(mut self, id: &str) -> Self {
        self.panicking.insert(id.to_string());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn reject_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    pub fn fail_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn fetch_count(&self, id: &str) -> usize {
        self.fetch_counts.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetch_counts.lock().unwrap().values().sum()
    }

    pub fn sessions_seen(&self) -> HashSet<usize> {
        self.sessions_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Authenticator for MockTracker {
    async fn login(&self, session: &mut AuthSession) -> Result<(), AuthError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.reject_login {
            return Err(AuthError::Rejected("invalid credentials".to_string()));
        }
        session.mark_authenticated();
        Ok(())
    }
}

#[async_trait]
impl SearchExecutor for MockTracker {
    async fn search(
        &self,
        session: &AuthSession,
        _query: &str,
        max_results: usize,
    ) -> Result<Vec<IssueRef>, SearchError> {
        assert!(session.is_authenticated(), "search ran on an unauthenticated session");
        if self.fail_search {
            return Err(SearchError::Status {
                url: "https://tracker.test/search".to_string(),
                status: 503,
            });
        }
        Ok(self
            .seeds
            .iter()
            .take(max_results)
            .map(|id| IssueRef::new(id.clone(), issue_url(id)))
            .collect())
    }
}

#[async_trait]
impl IssueFetcher for MockTracker {
    async fn fetch_issue(
        &self,
        session: &mut AuthSession,
        issue: &IssueRef,
    ) -> Result<IssueRecord, FetchError> {
        assert!(session.is_fresh(), "fetch ran on an unauthenticated session");
        self.sessions_seen.lock().unwrap().insert(session.id());
        *self
            .fetch_counts
            .lock()
            .unwrap()
            .entry(issue.id.clone())
            .or_default() += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.panicking.contains(&issue.id) {
            panic!("parser exploded on {}", issue.id);
        }

        if self.failing.contains(&issue.id) {
            return Err(FetchError::Status {
                url: issue.url.clone(),
                status: 500,
            });
        }

        if let Some(html) = self.pages.get(&issue.id) {
            let crawled_at = chrono::Utc::now().to_rfc3339();
            return parse_issue_page(html, issue, &crawled_at).map_err(|message| {
                FetchError::Parse {
                    url: issue.url.clone(),
                    message,
                }
            });
        }

        let related = self
            .graph
            .get(&issue.id)
            .map(|ids| ids.iter().map(|id| IssueRef::new(id.clone(), issue_url(id))).collect())
            .unwrap_or_default();

        Ok(IssueRecord {
            issue_id: issue.id.clone(),
            url: issue.url.clone(),
            title: Some(format!("Issue {}", issue.id)),
            related,
            crawled_at: chrono::Utc::now().to_rfc3339(),
            ..Default::default()
        })
    }
}

/// Persistence sink keeping everything in memory
#[derive(Default)]
pub struct MemorySink {
    failing_writes: HashSet<String>,
    fail_mirror: bool,
    panic_on_error_log: bool,

    begun: Mutex<Vec<CrawlSession>>,
    written: Mutex<Vec<CrawledIssue>>,
    mirrored: AtomicUsize,
    searches: Mutex<Vec<SearchQueryRecord>>,
    errors: Mutex<Vec<SessionErrorRecord>>,
    finished: Mutex<Vec<CrawlSession>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_write(mut self, id: &str) -> Self {
        self.failing_writes.insert(id.to_string());
        self
    }

    pub fn failing_mirror(mut self) -> Self {
        self.fail_mirror = true;
        self
    }

    /// `record_error` panics, simulating a bug outside the per-task recovery
    pub fn panicking_error_log(mut self) -> Self {
        self.panic_on_error_log = true;
        self
    }

    pub fn written_ids(&self) -> Vec<String> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.record.issue_id.clone())
            .collect()
    }

    pub fn mirrored(&self) -> usize {
        self.mirrored.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> Vec<SearchQueryRecord> {
        self.searches.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<SessionErrorRecord> {
        self.errors.lock().unwrap().clone()
    }

    pub fn begun(&self) -> usize {
        self.begun.lock().unwrap().len()
    }

    pub fn finished(&self) -> Option<CrawlSession> {
        self.finished.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn begin_session(&self, session: &CrawlSession) -> StorageResult<()> {
        self.begun.lock().unwrap().push(session.clone());
        Ok(())
    }

    async fn write_issue(&self, _session_id: &str, issue: &CrawledIssue) -> StorageResult<()> {
        if self.failing_writes.contains(&issue.record.issue_id) {
            return Err(StorageError::Database("disk full".to_string()));
        }
        self.written.lock().unwrap().push(issue.clone());
        Ok(())
    }

    async fn mirror_issue(&self, _issue: &CrawledIssue) -> StorageResult<()> {
        if self.fail_mirror {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only mirror",
            )));
        }
        self.mirrored.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn record_search(
        &self,
        _session_id: &str,
        search: &SearchQueryRecord,
    ) -> StorageResult<()> {
        self.searches.lock().unwrap().push(search.clone());
        Ok(())
    }

    async fn record_error(
        &self,
        _session_id: &str,
        error: &SessionErrorRecord,
    ) -> StorageResult<()> {
        if self.panic_on_error_log {
            panic!("error log unavailable");
        }
        self.errors.lock().unwrap().push(error.clone());
        Ok(())
    }

    async fn finish_session(&self, session: &CrawlSession) -> StorageResult<()> {
        self.finished.lock().unwrap().push(session.clone());
        Ok(())
    }
}

pub fn orchestrator(tracker: &Arc<MockTracker>, sink: &Arc<MemorySink>) -> CrawlOrchestrator {
    let collaborators = Collaborators {
        authenticator: tracker.clone(),
        search: tracker.clone(),
        fetcher: tracker.clone(),
        attachments: None,
        sink: sink.clone(),
    };
    CrawlOrchestrator::new(collaborators, ClientSettings::default())
}

pub fn request(max_results: usize, crawl_related: bool, max_depth: u32) -> CrawlRequest {
    CrawlRequest {
        product: "OpenFrame".to_string(),
        query: "crash".to_string(),
        max_results,
        crawl_related,
        max_depth,
    }
}
