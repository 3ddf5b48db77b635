//! Persistence sink used by the crawl workers
//!
//! The SQLite database is the primary store: a failed write there fails the
//! task. The JSON mirror is secondary: callers log its failures and move on.

use crate::state::{CrawlSession, CrawledIssue};
use crate::storage::{
    JsonMirror, SearchQueryRecord, SessionErrorRecord, SessionIssueRecord, SqliteStorage, Storage,
    StorageError, StorageResult,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Where crawl results go
///
/// Implementations must accept fully concurrent calls from all workers.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Records the start of a session
    async fn begin_session(&self, session: &CrawlSession) -> StorageResult<()>;

    /// Durably stores one issue in the primary store
    async fn write_issue(&self, session_id: &str, issue: &CrawledIssue) -> StorageResult<()>;

    /// Copies one issue to the secondary store
    async fn mirror_issue(&self, _issue: &CrawledIssue) -> StorageResult<()> {
        Ok(())
    }

    /// Records the search that seeded the session
    async fn record_search(
        &self,
        _session_id: &str,
        _search: &SearchQueryRecord,
    ) -> StorageResult<()> {
        Ok(())
    }

    /// Appends to the session error log
    async fn record_error(&self, session_id: &str, error: &SessionErrorRecord)
        -> StorageResult<()>;

    /// Stores the final status and statistics
    async fn finish_session(&self, session: &CrawlSession) -> StorageResult<()>;
}

/// SQLite primary store plus optional JSON mirror
#[derive(Clone)]
pub struct CrawlStore {
    storage: Arc<Mutex<SqliteStorage>>,
    mirror: Option<JsonMirror>,
}

impl CrawlStore {
    pub fn new(storage: SqliteStorage, mirror: Option<JsonMirror>) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            mirror,
        }
    }

    /// Runs `f` with exclusive access to the database
    pub fn with_storage<T>(
        &self,
        f: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut storage = self
            .storage
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        f(&mut storage)
    }
}

#[async_trait]
impl PersistenceSink for CrawlStore {
    async fn begin_session(&self, session: &CrawlSession) -> StorageResult<()> {
        self.with_storage(|s| s.create_session(session).map(|_| ()))
    }

    async fn write_issue(&self, session_id: &str, issue: &CrawledIssue) -> StorageResult<()> {
        let link = SessionIssueRecord {
            issue_id: issue.record.issue_id.clone(),
            crawl_order: issue.crawl_order,
            depth: issue.depth,
            crawl_duration_ms: issue.duration_ms,
            had_errors: issue.record.attachments.iter().any(|a| a.error.is_some()),
        };

        self.with_storage(|s| {
            let crawl_count = s.upsert_issue(&issue.record)?;
            s.link_session_issue(session_id, &link)?;
            tracing::trace!(
                issue_id = %issue.record.issue_id,
                crawl_count,
                "Stored issue"
            );
            Ok(())
        })
    }

    async fn mirror_issue(&self, issue: &CrawledIssue) -> StorageResult<()> {
        match &self.mirror {
            Some(mirror) => mirror.write(&issue.record).await.map(|_| ()),
            None => Ok(()),
        }
    }

    async fn record_search(
        &self,
        session_id: &str,
        search: &SearchQueryRecord,
    ) -> StorageResult<()> {
        self.with_storage(|s| s.record_search_query(session_id, search))
    }

    async fn record_error(
        &self,
        session_id: &str,
        error: &SessionErrorRecord,
    ) -> StorageResult<()> {
        self.with_storage(|s| s.record_error(session_id, error))
    }

    async fn finish_session(&self, session: &CrawlSession) -> StorageResult<()> {
        self.with_storage(|s| s.finish_session(session))
    }
}
