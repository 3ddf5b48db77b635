//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{CrawlSession, SessionStats, SessionStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    ErrorSeverity, SearchQueryRecord, SessionErrorRecord, SessionIssueRecord, StoredIssue,
};
use crate::tracker::{AttachmentInfo, HistoryEntry, IssueRecord};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const SESSION_COLUMNS: &str = "session_uuid, product, query, max_results, crawl_related, max_depth,
     status, started_at, completed_at, total_issues_found, issues_crawled, failed_issues,
     related_issues, attachments_downloaded, search_time_ms, crawl_time_ms, avg_issue_time_ms,
     parallel_workers, error_message";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn load_attachments(&self, issue_id: &str) -> StorageResult<Vec<AttachmentInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT filename, url, file_path, file_size, downloaded, extracted_text, error_message
             FROM attachments WHERE issue_id = ?1 ORDER BY id",
        )?;

        let attachments = stmt
            .query_map(params![issue_id], |row| {
                Ok(AttachmentInfo {
                    filename: row.get(0)?,
                    url: row.get(1)?,
                    file_path: row.get(2)?,
                    file_size: row.get::<_, Option<i64>>(3)?.map(|s| s as u64),
                    downloaded: row.get(4)?,
                    extracted_text: row.get(5)?,
                    error: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(attachments)
    }

    fn load_history(&self, issue_id: &str) -> StorageResult<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT changed_by, changed_at, change_type, details
             FROM issue_history WHERE issue_id = ?1 ORDER BY id",
        )?;

        let history = stmt
            .query_map(params![issue_id], |row| {
                Ok(HistoryEntry {
                    user: row.get(0)?,
                    date: row.get(1)?,
                    action: row.get(2)?,
                    details: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(history)
    }
}

/// Parses an RFC 3339 column into a UTC timestamp
fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Maps a row selected with `SESSION_COLUMNS`
fn session_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlSession> {
    let completed_at = match row.get::<_, Option<String>>(8)? {
        Some(_) => Some(timestamp_column(row, 8)?),
        None => None,
    };

    Ok(CrawlSession {
        id: row.get(0)?,
        product: row.get(1)?,
        query: row.get(2)?,
        max_results: row.get::<_, i64>(3)? as usize,
        crawl_related: row.get(4)?,
        max_depth: row.get(5)?,
        status: SessionStatus::from_db_string(&row.get::<_, String>(6)?)
            .unwrap_or(SessionStatus::Failed),
        started_at: timestamp_column(row, 7)?,
        completed_at,
        stats: SessionStats {
            issues_found: row.get::<_, i64>(9)? as usize,
            issues_crawled: row.get::<_, i64>(10)? as usize,
            failed_issues: row.get::<_, i64>(11)? as usize,
            related_issues: row.get::<_, i64>(12)? as usize,
            attachments_downloaded: row.get::<_, i64>(13)? as usize,
            search_time_ms: row.get::<_, i64>(14)? as u64,
            crawl_time_ms: row.get::<_, i64>(15)? as u64,
            avg_issue_time_ms: row.get::<_, i64>(16)? as u64,
            worker_count: row.get::<_, i64>(17)? as usize,
        },
        error: row.get(18)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Session Management =====

    fn create_session(&mut self, session: &CrawlSession) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO crawl_sessions
             (session_uuid, product, query, max_results, crawl_related, max_depth, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session.id,
                session.product,
                session.query,
                session.max_results as i64,
                session.crawl_related,
                session.max_depth,
                session.status.to_db_string(),
                session.started_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_session_status(
        &mut self,
        session_id: &str,
        status: SessionStatus,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE crawl_sessions SET status = ?1 WHERE session_uuid = ?2",
            params![status.to_db_string(), session_id],
        )?;

        if updated == 0 {
            return Err(StorageError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    fn finish_session(&mut self, session: &CrawlSession) -> StorageResult<()> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM crawl_sessions WHERE session_uuid = ?1",
                params![session.id],
                |row| row.get(0),
            )
            .optional()?;

        if exists.is_none() {
            self.create_session(session)?;
        }

        let stats = &session.stats;
        self.conn.execute(
            "UPDATE crawl_sessions SET
                status = ?1, completed_at = ?2,
                total_issues_found = ?3, issues_crawled = ?4, failed_issues = ?5,
                related_issues = ?6, attachments_downloaded = ?7,
                search_time_ms = ?8, crawl_time_ms = ?9, avg_issue_time_ms = ?10,
                parallel_workers = ?11, error_message = ?12
             WHERE session_uuid = ?13",
            params![
                session.status.to_db_string(),
                session.completed_at.map(|t| t.to_rfc3339()),
                stats.issues_found as i64,
                stats.issues_crawled as i64,
                stats.failed_issues as i64,
                stats.related_issues as i64,
                stats.attachments_downloaded as i64,
                stats.search_time_ms as i64,
                stats.crawl_time_ms as i64,
                stats.avg_issue_time_ms as i64,
                stats.worker_count as i64,
                session.error,
                session.id,
            ],
        )?;
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> StorageResult<CrawlSession> {
        let sql = format!(
            "SELECT {} FROM crawl_sessions WHERE session_uuid = ?1",
            SESSION_COLUMNS
        );

        self.conn
            .query_row(&sql, params![session_id], session_from_row)
            .optional()?
            .ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))
    }

    fn get_latest_session(&self) -> StorageResult<Option<CrawlSession>> {
        let sql = format!(
            "SELECT {} FROM crawl_sessions ORDER BY id DESC LIMIT 1",
            SESSION_COLUMNS
        );

        let session = self.conn.query_row(&sql, [], session_from_row).optional()?;
        Ok(session)
    }

    // ===== Issue Management =====

    fn upsert_issue(&mut self, record: &IssueRecord) -> StorageResult<u32> {
        let comments_json = serde_json::to_string(&record.comments)?;
        let related_json = serde_json::to_string(&record.related)?;

        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO issues
             (issue_id, url, title, description, product, status, priority, reporter, assignee,
              created_date, updated_date, comments_json, related_json,
              first_crawled_at, last_crawled_at, crawl_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14, 1)
             ON CONFLICT(issue_id) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                description = excluded.description,
                product = excluded.product,
                status = excluded.status,
                priority = excluded.priority,
                reporter = excluded.reporter,
                assignee = excluded.assignee,
                created_date = excluded.created_date,
                updated_date = excluded.updated_date,
                comments_json = excluded.comments_json,
                related_json = excluded.related_json,
                last_crawled_at = excluded.last_crawled_at,
                crawl_count = issues.crawl_count + 1",
            params![
                record.issue_id,
                record.url,
                record.title,
                record.description,
                record.product,
                record.status,
                record.priority,
                record.reporter,
                record.assignee,
                record.created_date,
                record.updated_date,
                comments_json,
                related_json,
                record.crawled_at,
            ],
        )?;

        tx.execute(
            "DELETE FROM attachments WHERE issue_id = ?1",
            params![record.issue_id],
        )?;

        for attachment in &record.attachments {
            tx.execute(
                "INSERT INTO attachments
                 (issue_id, filename, url, file_path, file_size, downloaded, extracted_text, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.issue_id,
                    attachment.filename,
                    attachment.url,
                    attachment.file_path,
                    attachment.file_size.map(|s| s as i64),
                    attachment.downloaded,
                    attachment.extracted_text,
                    attachment.error,
                ],
            )?;
        }

        tx.execute(
            "DELETE FROM issue_history WHERE issue_id = ?1",
            params![record.issue_id],
        )?;

        for entry in &record.history {
            tx.execute(
                "INSERT INTO issue_history (issue_id, changed_by, changed_at, change_type, details)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.issue_id,
                    entry.user,
                    entry.date,
                    entry.action,
                    entry.details,
                ],
            )?;
        }

        let crawl_count: u32 = tx.query_row(
            "SELECT crawl_count FROM issues WHERE issue_id = ?1",
            params![record.issue_id],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok(crawl_count)
    }

    fn get_issue(&self, issue_id: &str) -> StorageResult<Option<StoredIssue>> {
        let row = self
            .conn
            .query_row(
                "SELECT issue_id, url, title, description, product, status, priority, reporter,
                 assignee, created_date, updated_date, comments_json, related_json,
                 first_crawled_at, last_crawled_at, crawl_count
                 FROM issues WHERE issue_id = ?1",
                params![issue_id],
                |row| {
                    let record = IssueRecord {
                        issue_id: row.get(0)?,
                        url: row.get(1)?,
                        title: row.get(2)?,
                        description: row.get(3)?,
                        product: row.get(4)?,
                        status: row.get(5)?,
                        priority: row.get(6)?,
                        reporter: row.get(7)?,
                        assignee: row.get(8)?,
                        created_date: row.get(9)?,
                        updated_date: row.get(10)?,
                        crawled_at: row.get(14)?,
                        ..Default::default()
                    };
                    let comments_json: String = row.get(11)?;
                    let related_json: String = row.get(12)?;
                    let first_crawled_at: String = row.get(13)?;
                    let crawl_count: u32 = row.get(15)?;
                    Ok((record, comments_json, related_json, first_crawled_at, crawl_count))
                },
            )
            .optional()?;

        let Some((mut record, comments_json, related_json, first_crawled_at, crawl_count)) = row
        else {
            return Ok(None);
        };

        record.comments = serde_json::from_str(&comments_json)?;
        record.related = serde_json::from_str(&related_json)?;
        record.attachments = self.load_attachments(issue_id)?;
        record.history = self.load_history(issue_id)?;

        Ok(Some(StoredIssue {
            last_crawled_at: record.crawled_at.clone(),
            record,
            first_crawled_at,
            crawl_count,
        }))
    }

    fn link_session_issue(
        &mut self,
        session_id: &str,
        link: &SessionIssueRecord,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO session_issues
             (session_uuid, issue_id, crawl_order, depth, crawl_duration_ms, had_errors, crawled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(session_uuid, issue_id) DO UPDATE SET
                crawl_order = excluded.crawl_order,
                depth = excluded.depth,
                crawl_duration_ms = excluded.crawl_duration_ms,
                had_errors = excluded.had_errors,
                crawled_at = excluded.crawled_at",
            params![
                session_id,
                link.issue_id,
                link.crawl_order,
                link.depth,
                link.crawl_duration_ms as i64,
                link.had_errors,
                now,
            ],
        )?;
        Ok(())
    }

    fn get_session_issues(&self, session_id: &str) -> StorageResult<Vec<SessionIssueRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT issue_id, crawl_order, depth, crawl_duration_ms, had_errors
             FROM session_issues WHERE session_uuid = ?1
             ORDER BY crawl_order IS NULL, crawl_order, id",
        )?;

        let links = stmt
            .query_map(params![session_id], |row| {
                Ok(SessionIssueRecord {
                    issue_id: row.get(0)?,
                    crawl_order: row.get(1)?,
                    depth: row.get(2)?,
                    crawl_duration_ms: row.get::<_, i64>(3)? as u64,
                    had_errors: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(links)
    }

    // ===== Search Log =====

    fn record_search_query(
        &mut self,
        session_id: &str,
        search: &SearchQueryRecord,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO search_queries
             (session_uuid, query, product, results_count, search_time_ms, queried_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                search.query,
                search.product,
                search.results_count as i64,
                search.search_time_ms as i64,
                search.queried_at,
            ],
        )?;
        Ok(())
    }

    fn get_search_queries(&self, session_id: &str) -> StorageResult<Vec<SearchQueryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT query, product, results_count, search_time_ms, queried_at
             FROM search_queries WHERE session_uuid = ?1 ORDER BY id",
        )?;

        let searches = stmt
            .query_map(params![session_id], |row| {
                Ok(SearchQueryRecord {
                    query: row.get(0)?,
                    product: row.get(1)?,
                    results_count: row.get::<_, i64>(2)? as usize,
                    search_time_ms: row.get::<_, i64>(3)? as u64,
                    queried_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(searches)
    }

    // ===== Error Log =====

    fn record_error(&mut self, session_id: &str, error: &SessionErrorRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO session_errors
             (session_uuid, issue_id, error_type, severity, message, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                error.issue_id,
                error.error_type,
                error.severity.to_db_string(),
                error.message,
                error.occurred_at,
            ],
        )?;
        Ok(())
    }

    fn get_session_errors(&self, session_id: &str) -> StorageResult<Vec<SessionErrorRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT issue_id, error_type, severity, message, occurred_at
             FROM session_errors WHERE session_uuid = ?1 ORDER BY id",
        )?;

        let errors = stmt
            .query_map(params![session_id], |row| {
                Ok(SessionErrorRecord {
                    issue_id: row.get(0)?,
                    error_type: row.get(1)?,
                    severity: ErrorSeverity::from_db_string(&row.get::<_, String>(2)?)
                        .unwrap_or(ErrorSeverity::Error),
                    message: row.get(3)?,
                    occurred_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(errors)
    }

    // ===== Statistics =====

    fn count_issues(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn count_sessions_by_status(&self) -> StorageResult<Vec<(SessionStatus, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM crawl_sessions GROUP BY status ORDER BY status",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(status, count)| {
                SessionStatus::from_db_string(&status).map(|s| (s, count as usize))
            })
            .collect())
    }
}
