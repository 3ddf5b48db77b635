//! Crawl session reports
//!
//! This module renders the final report of a crawl (found / crawled /
//! failed / related counts, timings and workers) and loads the latest
//! session report back from storage for `--stats`.

use crate::crawler::CrawlReport;
use crate::state::{CrawlSession, SessionStatus};
use crate::storage::{SessionErrorRecord, SessionIssueRecord, Storage, StorageResult};
use std::fmt::Write;

/// A stored session with its issue list and error log
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session: CrawlSession,
    pub issues: Vec<SessionIssueRecord>,
    pub errors: Vec<SessionErrorRecord>,
    /// Issues in the database across all sessions
    pub total_issues_stored: usize,
    pub sessions_by_status: Vec<(SessionStatus, usize)>,
}

/// Loads the report of the most recent session
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(Some(SessionReport))` - The latest session and its details
/// * `Ok(None)` - No session has been recorded yet
/// * `Err(StorageError)` - Failed to query storage
pub fn load_latest_report(storage: &dyn Storage) -> StorageResult<Option<SessionReport>> {
    let Some(session) = storage.get_latest_session()? else {
        return Ok(None);
    };

    let issues = storage.get_session_issues(&session.id)?;
    let errors = storage.get_session_errors(&session.id)?;

    Ok(Some(SessionReport {
        total_issues_stored: storage.count_issues()?,
        sessions_by_status: storage.count_sessions_by_status()?,
        session,
        issues,
        errors,
    }))
}

/// Renders the session header and counters
pub fn format_session_summary(session: &CrawlSession) -> String {
    let stats = &session.stats;
    let mut out = String::new();

    let _ = writeln!(out, "=== Crawl Session {} ===\n", session.id);
    let _ = writeln!(out, "Product: {}", session.product);
    let _ = writeln!(out, "Query: {}", session.query);
    let _ = writeln!(
        out,
        "Max results: {}, crawl related: {}, max depth: {}",
        session.max_results, session.crawl_related, session.max_depth
    );
    let _ = writeln!(out, "Status: {}", session.status);
    let _ = writeln!(out, "Started: {}", session.started_at.to_rfc3339());
    if let Some(completed) = session.completed_at {
        let _ = writeln!(
            out,
            "Completed: {} ({}s)",
            completed.to_rfc3339(),
            (completed - session.started_at).num_seconds()
        );
    }
    if let Some(error) = &session.error {
        let _ = writeln!(out, "Error: {}", error);
    }
    out.push('\n');

    let _ = writeln!(out, "Issues:");
    let _ = writeln!(out, "  Found: {}", stats.issues_found);
    let _ = writeln!(out, "  Crawled: {}", stats.issues_crawled);
    let _ = writeln!(out, "  Failed: {}", stats.failed_issues);
    let _ = writeln!(out, "  Related: {}", stats.related_issues);
    let _ = writeln!(out, "  Attachments downloaded: {}", stats.attachments_downloaded);
    out.push('\n');

    let _ = writeln!(out, "Timing:");
    let _ = writeln!(out, "  Search: {}ms", stats.search_time_ms);
    let _ = writeln!(out, "  Crawl: {}ms", stats.crawl_time_ms);
    let _ = writeln!(out, "  Average per issue: {}ms", stats.avg_issue_time_ms);
    let _ = writeln!(out, "  Workers: {}", stats.worker_count);

    out
}

/// Prints the report of a crawl that just finished
pub fn print_crawl_report(report: &CrawlReport) {
    print!("{}", format_session_summary(&report.session));

    if !report.issues.is_empty() {
        println!("\nCrawled Issues:");
        for issue in &report.issues {
            let title = issue.record.title.as_deref().unwrap_or("(untitled)");
            match issue.crawl_order {
                Some(order) => println!("  #{:<3} {} - {}", order, issue.issue_id(), title),
                None => println!(
                    "  rel  {} - {} (depth {})",
                    issue.issue_id(),
                    title,
                    issue.depth
                ),
            }
        }
    }
}

/// Prints a stored session report
pub fn print_session_report(report: &SessionReport) {
    print!("{}", format_session_summary(&report.session));

    if !report.errors.is_empty() {
        println!("\nErrors ({}):", report.errors.len());
        for error in &report.errors {
            println!(
                "  [{}] {} {}: {}",
                error.severity.to_db_string(),
                error.issue_id.as_deref().unwrap_or("-"),
                error.error_type,
                error.message
            );
        }
    }

    let seeds = report.issues.iter().filter(|i| i.crawl_order.is_some()).count();
    println!(
        "\nSession issues: {} ({} seeds, {} related)",
        report.issues.len(),
        seeds,
        report.issues.len() - seeds
    );

    println!("\nDatabase:");
    println!("  Issues stored: {}", report.total_issues_stored);
    for (status, count) in &report.sessions_by_status {
        println!("  Sessions {}: {}", status, count);
    }
}
