//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Issue-Crawler database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per crawl invocation
CREATE TABLE IF NOT EXISTS crawl_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_uuid TEXT NOT NULL UNIQUE,
    product TEXT NOT NULL,
    query TEXT NOT NULL,
    max_results INTEGER NOT NULL,
    crawl_related INTEGER NOT NULL,
    max_depth INTEGER NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    total_issues_found INTEGER NOT NULL DEFAULT 0,
    issues_crawled INTEGER NOT NULL DEFAULT 0,
    failed_issues INTEGER NOT NULL DEFAULT 0,
    related_issues INTEGER NOT NULL DEFAULT 0,
    attachments_downloaded INTEGER NOT NULL DEFAULT 0,
    search_time_ms INTEGER NOT NULL DEFAULT 0,
    crawl_time_ms INTEGER NOT NULL DEFAULT 0,
    avg_issue_time_ms INTEGER NOT NULL DEFAULT 0,
    parallel_workers INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_sessions_status ON crawl_sessions(status);

-- Issues, keyed by tracker identifier
CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    title TEXT,
    description TEXT,
    product TEXT,
    status TEXT,
    priority TEXT,
    reporter TEXT,
    assignee TEXT,
    created_date TEXT,
    updated_date TEXT,
    comments_json TEXT NOT NULL DEFAULT '[]',
    related_json TEXT NOT NULL DEFAULT '[]',
    first_crawled_at TEXT NOT NULL,
    last_crawled_at TEXT NOT NULL,
    crawl_count INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_issues_product ON issues(product);

-- Attachments of the latest crawl of each issue
CREATE TABLE IF NOT EXISTS attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id TEXT NOT NULL REFERENCES issues(issue_id),
    filename TEXT NOT NULL,
    url TEXT,
    file_path TEXT,
    file_size INTEGER,
    downloaded INTEGER NOT NULL DEFAULT 0,
    extracted_text TEXT,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_attachments_issue ON attachments(issue_id);

-- Change history of the latest crawl of each issue
CREATE TABLE IF NOT EXISTS issue_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id TEXT NOT NULL REFERENCES issues(issue_id),
    changed_by TEXT,
    changed_at TEXT,
    change_type TEXT,
    details TEXT
);

CREATE INDEX IF NOT EXISTS idx_issue_history_issue ON issue_history(issue_id);

-- Searches run by each session
CREATE TABLE IF NOT EXISTS search_queries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_uuid TEXT NOT NULL,
    query TEXT NOT NULL,
    product TEXT NOT NULL,
    results_count INTEGER NOT NULL,
    search_time_ms INTEGER NOT NULL DEFAULT 0,
    queried_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_search_queries_session ON search_queries(session_uuid);

-- Which issues each session crawled
CREATE TABLE IF NOT EXISTS session_issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_uuid TEXT NOT NULL,
    issue_id TEXT NOT NULL REFERENCES issues(issue_id),
    crawl_order INTEGER,
    depth INTEGER NOT NULL DEFAULT 0,
    crawl_duration_ms INTEGER NOT NULL DEFAULT 0,
    had_errors INTEGER NOT NULL DEFAULT 0,
    crawled_at TEXT NOT NULL,
    UNIQUE(session_uuid, issue_id)
);

CREATE INDEX IF NOT EXISTS idx_session_issues_session ON session_issues(session_uuid);

-- Non-fatal errors raised during a session
CREATE TABLE IF NOT EXISTS session_errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_uuid TEXT NOT NULL,
    issue_id TEXT,
    error_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    occurred_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_errors_session ON session_errors(session_uuid);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
