//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{CrawlSession, SessionStatus};
use crate::storage::{SearchQueryRecord, SessionErrorRecord, SessionIssueRecord, StoredIssue};
use crate::tracker::IssueRecord;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the crawler.
/// Implementations are used behind a mutex by the persistence sink.
pub trait Storage {
    // ===== Session Management =====

    /// Inserts the session record
    ///
    /// # Arguments
    ///
    /// * `session` - The session as created by the orchestrator
    ///
    /// # Returns
    ///
    /// The row ID of the new session
    fn create_session(&mut self, session: &CrawlSession) -> StorageResult<i64>;

    /// Updates only the status of a session
    fn update_session_status(&mut self, session_id: &str, status: SessionStatus)
        -> StorageResult<()>;

    /// Writes the final status, completion time, statistics and error
    ///
    /// Creates the record if `create_session` never succeeded for it.
    fn finish_session(&mut self, session: &CrawlSession) -> StorageResult<()>;

    /// Gets a session by UUID
    fn get_session(&self, session_id: &str) -> StorageResult<CrawlSession>;

    /// Gets the most recently started session
    fn get_latest_session(&self) -> StorageResult<Option<CrawlSession>>;

    // ===== Issue Management =====

    /// Inserts or updates an issue and replaces its attachment and history rows
    ///
    /// Re-crawling an existing issue increments its `crawl_count`.
    ///
    /// # Returns
    ///
    /// The crawl count after this write
    fn upsert_issue(&mut self, record: &IssueRecord) -> StorageResult<u32>;

    /// Gets a stored issue by tracker identifier
    fn get_issue(&self, issue_id: &str) -> StorageResult<Option<StoredIssue>>;

    /// Associates an issue with a session
    fn link_session_issue(
        &mut self,
        session_id: &str,
        link: &SessionIssueRecord,
    ) -> StorageResult<()>;

    /// Issues crawled in a session, seeds first in rank order
    fn get_session_issues(&self, session_id: &str) -> StorageResult<Vec<SessionIssueRecord>>;

    // ===== Search Log =====

    /// Records a search the session ran
    fn record_search_query(
        &mut self,
        session_id: &str,
        search: &SearchQueryRecord,
    ) -> StorageResult<()>;

    /// Searches recorded for a session, oldest first
    fn get_search_queries(&self, session_id: &str) -> StorageResult<Vec<SearchQueryRecord>>;

    // ===== Error Log =====

    /// Appends an entry to the session error log
    fn record_error(&mut self, session_id: &str, error: &SessionErrorRecord) -> StorageResult<()>;

    /// Error log entries for a session, oldest first
    fn get_session_errors(&self, session_id: &str) -> StorageResult<Vec<SessionErrorRecord>>;

    // ===== Statistics =====

    /// Counts stored issues
    fn count_issues(&self) -> StorageResult<usize>;

    /// Counts stored sessions grouped by status
    fn count_sessions_by_status(&self) -> StorageResult<Vec<(SessionStatus, usize)>>;
}
