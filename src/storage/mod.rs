//! Storage module for persisting crawl data
//!
//! This module handles all persistence for the crawler, including:
//! - SQLite database initialization and schema management
//! - Crawl session records and their final statistics
//! - Issue upserts with crawl counts, attachment and history rows
//! - The searches each session ran
//! - The per-session issue list and error log
//! - The JSON file mirror used as secondary store
//! - `CrawlStore`, the persistence sink the workers write through

mod mirror;
mod schema;
mod sink;
mod sqlite;
mod traits;

pub use mirror::JsonMirror;
pub use sink::{CrawlStore, PersistenceSink};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::tracker::IssueRecord;

use std::path::Path;

/// Opens (creating if needed) the SQLite database at `path`
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to open or initialize the database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// An issue as stored, with crawl bookkeeping
#[derive(Debug, Clone)]
pub struct StoredIssue {
    pub record: IssueRecord,
    pub first_crawled_at: String,
    pub last_crawled_at: String,
    pub crawl_count: u32,
}

/// Association between a session and an issue it crawled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIssueRecord {
    pub issue_id: String,
    pub crawl_order: Option<u32>,
    pub depth: u32,
    pub crawl_duration_ms: u64,
    /// True when some attachment of the issue failed to download
    pub had_errors: bool,
}

/// A search a session ran and how many issues it returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQueryRecord {
    pub query: String,
    pub product: String,
    pub results_count: usize,
    pub search_time_ms: u64,
    pub queried_at: String,
}

/// Entry in a session's error log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionErrorRecord {
    pub issue_id: Option<String>,
    pub error_type: String,
    pub severity: ErrorSeverity,
    pub message: String,
    pub occurred_at: String,
}

impl SessionErrorRecord {
    /// An error-severity entry stamped with the current time
    pub fn error(
        issue_id: Option<&str>,
        error_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            issue_id: issue_id.map(str::to_string),
            error_type: error_type.into(),
            severity: ErrorSeverity::Error,
            message: message.into(),
            occurred_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Severity of a session error log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
}

impl ErrorSeverity {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}
