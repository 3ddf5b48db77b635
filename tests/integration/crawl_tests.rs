//! Integration tests for the crawl orchestrator
//!
//! These tests drive a full crawl session against in-memory collaborators so
//! dedup, depth limits, failure isolation and cancellation can be checked
//! deterministically.

use crate::support::{orchestrator, request, MemorySink, MockTracker};
use issue_crawler::{CrawlerError, SessionStatus};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_crawl_seeds_in_rank_order() {
    let tracker = Arc::new(MockTracker::numbered(5));
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(5, false, 0))
        .await
        .unwrap();

    assert_eq!(report.status(), SessionStatus::Completed);
    assert_eq!(report.stats().issues_found, 5);
    assert_eq!(report.stats().issues_crawled, 5);
    assert_eq!(report.stats().failed_issues, 0);
    assert_eq!(report.stats().related_issues, 0);
    assert_eq!(report.stats().worker_count, 2);

    let orders: Vec<Option<u32>> = report.issues.iter().map(|i| i.crawl_order).collect();
    assert_eq!(orders, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
    let ids: Vec<&str> = report.issues.iter().map(|i| i.issue_id()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);

    assert_eq!(sink.written_ids().len(), 5);
    assert_eq!(sink.mirrored(), 5);
    assert_eq!(sink.begun(), 1);

    let searches = sink.searches();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].query, "crash");
    assert_eq!(searches[0].product, "OpenFrame");
    assert_eq!(searches[0].results_count, 5);

    let finished = sink.finished().unwrap();
    assert_eq!(finished.id, report.session.id);
    assert_eq!(finished.status, SessionStatus::Completed);
    assert!(finished.completed_at.is_some());
}

#[tokio::test]
async fn test_related_issues_stop_at_max_depth() {
    let mut tracker = MockTracker::numbered(10);
    for seed in 1..=10 {
        let a = format!("{}a", seed);
        let b = format!("{}b", seed);
        // The related issues link further out; depth 1 must not follow them
        tracker = tracker
            .related(&seed.to_string(), &[a.clone(), b.clone()])
            .related(&a, &[format!("{}x", seed)])
            .related(&b, &[format!("{}y", seed)]);
    }
    let tracker = Arc::new(tracker);
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(10, true, 1))
        .await
        .unwrap();

    assert_eq!(report.status(), SessionStatus::Completed);
    assert_eq!(report.stats().issues_found, 10);
    assert_eq!(report.stats().issues_crawled, 30);
    assert_eq!(report.stats().related_issues, 20);
    assert_eq!(report.stats().worker_count, 3);

    assert_eq!(report.seeds().count(), 10);
    assert_eq!(report.related().count(), 20);
    assert!(report.issues.iter().all(|i| i.depth <= 1));
    assert!(report.related().all(|i| i.depth == 1 && i.crawl_order.is_none()));

    assert_eq!(tracker.fetch_count("1x"), 0);
    assert_eq!(tracker.fetch_count("10y"), 0);
    assert_eq!(tracker.total_fetches(), 30);
}

#[tokio::test]
async fn test_depth_chain() {
    let tracker = Arc::new(
        MockTracker::with_seeds(&["1"])
            .related("1", &["2"])
            .related("2", &["3"])
            .related("3", &["4"]),
    );
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(1, true, 2))
        .await
        .unwrap();

    let depths: Vec<(&str, u32)> = report.issues.iter().map(|i| (i.issue_id(), i.depth)).collect();
    assert!(depths.contains(&("1", 0)));
    assert!(depths.contains(&("2", 1)));
    assert!(depths.contains(&("3", 2)));
    assert_eq!(depths.len(), 3);
    assert_eq!(tracker.fetch_count("4"), 0);
}

#[tokio::test]
async fn test_related_not_followed_when_disabled() {
    let tracker = Arc::new(MockTracker::numbered(3).related("1", &["7", "8"]));
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(3, false, 5))
        .await
        .unwrap();

    assert_eq!(report.stats().issues_crawled, 3);
    assert_eq!(report.related().count(), 0);
    assert_eq!(tracker.fetch_count("7"), 0);
}

#[tokio::test]
async fn test_authentication_failure_aborts_session() {
    let tracker = Arc::new(MockTracker::numbered(5).reject_login());
    let sink = Arc::new(MemorySink::new());

    let result = orchestrator(&tracker, &sink)
        .crawl(request(5, false, 0))
        .await;

    assert!(matches!(result, Err(CrawlerError::Authentication(_))));
    assert_eq!(tracker.logins.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.total_fetches(), 0);
    assert!(sink.written_ids().is_empty());

    let finished = sink.finished().unwrap();
    assert_eq!(finished.status, SessionStatus::Failed);
    assert!(finished.error.unwrap().contains("invalid credentials"));
    assert_eq!(finished.stats.issues_crawled, 0);
}

#[tokio::test]
async fn test_search_failure_aborts_session() {
    let tracker = Arc::new(MockTracker::numbered(5).fail_search());
    let sink = Arc::new(MemorySink::new());

    let result = orchestrator(&tracker, &sink)
        .crawl(request(5, false, 0))
        .await;

    assert!(matches!(result, Err(CrawlerError::Search(_))));
    assert_eq!(tracker.total_fetches(), 0);
    assert!(sink.searches().is_empty());
    assert_eq!(sink.finished().unwrap().status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_invalid_limits_rejected_before_login() {
    let tracker = Arc::new(MockTracker::numbered(5));
    let sink = Arc::new(MemorySink::new());

    let result = orchestrator(&tracker, &sink)
        .crawl(request(0, false, 0))
        .await;

    assert!(matches!(result, Err(CrawlerError::Config(_))));
    assert_eq!(tracker.logins.load(Ordering::SeqCst), 0);
    assert_eq!(sink.begun(), 0);
}

#[tokio::test]
async fn test_empty_search_completes() {
    let tracker = Arc::new(MockTracker::numbered(0));
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(10, true, 2))
        .await
        .unwrap();

    assert_eq!(report.status(), SessionStatus::Completed);
    assert_eq!(report.stats().issues_found, 0);
    assert_eq!(report.stats().issues_crawled, 0);
    assert_eq!(report.stats().avg_issue_time_ms, 0);
    assert_eq!(report.stats().worker_count, 1);
    assert!(report.issues.is_empty());
}

#[tokio::test]
async fn test_search_results_truncated_to_max_results() {
    let tracker = Arc::new(MockTracker::numbered(8));
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(3, false, 0))
        .await
        .unwrap();

    assert_eq!(report.stats().issues_found, 3);
    assert_eq!(tracker.fetch_count("4"), 0);
}

#[tokio::test]
async fn test_shared_related_issue_crawled_once() {
    let tracker = Arc::new(
        MockTracker::with_seeds(&["100", "200"])
            .related("100", &["999"])
            .related("200", &["999"]),
    );
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(2, true, 1))
        .await
        .unwrap();

    assert_eq!(report.stats().issues_crawled, 3);
    assert_eq!(report.stats().related_issues, 1);
    assert_eq!(tracker.fetch_count("999"), 1);
    assert_eq!(
        sink.written_ids().iter().filter(|id| id.as_str() == "999").count(),
        1
    );
    assert!(sink.errors().is_empty());
}

#[tokio::test]
async fn test_dedup_under_concurrency() {
    // Every seed links to every other seed and to a shared hub
    let seeds: Vec<String> = (1..=20).map(|i| i.to_string()).collect();
    let mut tracker = MockTracker::with_seeds(&seeds[..]).delay(Duration::from_millis(5));
    for seed in &seeds {
        let mut links: Vec<String> = seeds.iter().filter(|s| *s != seed).cloned().collect();
        links.push("hub".to_string());
        tracker = tracker.related(seed, &links[..]);
    }
    let tracker = Arc::new(tracker.related("hub", &seeds[..]));
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(20, true, 3))
        .await
        .unwrap();

    assert_eq!(report.stats().worker_count, 6);
    assert_eq!(report.stats().issues_crawled, 21);

    let written = sink.written_ids();
    let unique: HashSet<&String> = written.iter().collect();
    assert_eq!(written.len(), unique.len());
    assert_eq!(tracker.fetch_count("hub"), 1);
    for seed in &seeds {
        assert_eq!(tracker.fetch_count(seed), 1, "issue {} fetched twice", seed);
    }

    // Seeds keep their search rank even when also discovered as related
    let seed_orders: Vec<u32> = report.seeds().filter_map(|i| i.crawl_order).collect();
    assert_eq!(seed_orders, (1..=20).collect::<Vec<u32>>());
}

#[tokio::test]
async fn test_failed_issue_does_not_abort_crawl() {
    let tracker = Arc::new(MockTracker::with_seeds(&["121", "122", "123", "124"]).failing("123"));
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(4, false, 0))
        .await
        .unwrap();

    assert_eq!(report.status(), SessionStatus::Completed);
    assert_eq!(report.stats().issues_found, 4);
    assert_eq!(report.stats().issues_crawled, 3);
    assert_eq!(report.stats().failed_issues, 1);
    assert!(report.issues.iter().all(|i| i.issue_id() != "123"));

    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].issue_id.as_deref(), Some("123"));
    assert_eq!(errors[0].error_type, "http_status");
    assert!(errors[0].message.contains("500"));
}

#[tokio::test]
async fn test_failed_issue_claim_is_released() {
    // One worker: both seeds run first, then "bad" is queued twice
    let tracker = Arc::new(
        MockTracker::with_seeds(&["1", "2"])
            .related("1", &["bad"])
            .related("2", &["bad"])
            .failing("bad"),
    );
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(2, true, 1))
        .await
        .unwrap();

    assert_eq!(report.stats().worker_count, 1);
    assert_eq!(tracker.fetch_count("bad"), 2);
    assert_eq!(report.stats().failed_issues, 2);
    assert_eq!(report.stats().issues_crawled, 2);
    assert_eq!(report.status(), SessionStatus::Completed);
}

#[tokio::test]
async fn test_panicking_fetch_is_isolated() {
    let tracker = Arc::new(MockTracker::with_seeds(&["1", "boom", "3"]).panicking("boom"));
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(3, false, 0))
        .await
        .unwrap();

    assert_eq!(report.status(), SessionStatus::Completed);
    assert_eq!(report.stats().issues_crawled, 2);
    assert_eq!(report.stats().failed_issues, 1);

    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_type, "panic");
    assert!(errors[0].message.contains("parser exploded on boom"));
}

#[tokio::test]
async fn test_all_failed_average_is_zero() {
    let tracker = Arc::new(
        MockTracker::with_seeds(&["1", "2"])
            .failing("1")
            .failing("2"),
    );
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(2, false, 0))
        .await
        .unwrap();

    assert_eq!(report.status(), SessionStatus::Completed);
    assert_eq!(report.stats().issues_crawled, 0);
    assert_eq!(report.stats().failed_issues, 2);
    assert_eq!(report.stats().avg_issue_time_ms, 0);
    assert!(report.issues.is_empty());
}

#[tokio::test]
async fn test_primary_store_failure_fails_task() {
    let tracker = Arc::new(MockTracker::numbered(3));
    let sink = Arc::new(MemorySink::new().failing_write("2"));

    let report = orchestrator(&tracker, &sink)
        .crawl(request(3, false, 0))
        .await
        .unwrap();

    assert_eq!(report.stats().issues_crawled, 2);
    assert_eq!(report.stats().failed_issues, 1);
    assert_eq!(sink.errors()[0].error_type, "persistence");
    assert_eq!(sink.mirrored(), 2);
}

#[tokio::test]
async fn test_mirror_failure_does_not_fail_task() {
    let tracker = Arc::new(MockTracker::numbered(3));
    let sink = Arc::new(MemorySink::new().failing_mirror());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(3, false, 0))
        .await
        .unwrap();

    assert_eq!(report.stats().issues_crawled, 3);
    assert_eq!(report.stats().failed_issues, 0);
    assert!(sink.errors().is_empty());
    assert_eq!(sink.written_ids().len(), 3);
}

#[tokio::test]
async fn test_workers_use_their_own_sessions() {
    let tracker = Arc::new(MockTracker::numbered(10).delay(Duration::from_millis(5)));
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(10, false, 0))
        .await
        .unwrap();

    let workers = report.stats().worker_count;
    assert_eq!(workers, 3);

    let sessions = tracker.sessions_seen();
    assert!(!sessions.contains(&0), "primary session used for fetching");
    assert!(sessions.len() <= workers);

    // One login for the primary session plus one per worker session
    assert_eq!(tracker.logins.load(Ordering::SeqCst), 1 + workers);
}

#[tokio::test]
async fn test_cancellation_keeps_partial_results() {
    let tracker = Arc::new(MockTracker::numbered(20).delay(Duration::from_millis(100)));
    let sink = Arc::new(MemorySink::new());
    let orchestrator = orchestrator(&tracker, &sink);

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
    });

    let report = orchestrator.crawl(request(20, false, 0)).await.unwrap();

    assert_eq!(report.status(), SessionStatus::Cancelled);
    assert!(report.stats().issues_crawled > 0);
    assert!(report.stats().issues_crawled < 20);
    assert_eq!(report.issues.len(), sink.written_ids().len());

    let finished = sink.finished().unwrap();
    assert_eq!(finished.status, SessionStatus::Cancelled);
    assert!(finished.completed_at.is_some());
}

#[tokio::test]
async fn test_crawl_timeout_cancels() {
    let tracker = Arc::new(MockTracker::numbered(20).delay(Duration::from_millis(100)));
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .with_timeout(Duration::from_millis(150))
        .crawl(request(20, false, 0))
        .await
        .unwrap();

    assert_eq!(report.status(), SessionStatus::Cancelled);
    assert!(report.stats().issues_crawled < 20);
}

fn tracker_page(displayed_id: &str, related: &[&str]) -> String {
    let links: String = related
        .iter()
        .map(|id| format!(r#"<li><a href="/issues/{id}">{id}</a></li>"#))
        .collect();
    format!(
        r#"<html><body>
        <span class="issue-id">{displayed_id}</span>
        <h1 class="issue-title">Issue {displayed_id}</h1>
        <ul class="related-issues">{links}</ul>
        </body></html>"#
    )
}

#[tokio::test]
async fn test_related_link_to_canonical_id_not_recrawled() {
    // Search links use numeric ids, pages and related links use "IMS-" ids
    let tracker = Arc::new(
        MockTracker::with_seeds(&["1", "2"])
            .page("1", tracker_page("IMS-1", &[]))
            .page("2", tracker_page("IMS-2", &["IMS-1"])),
    );
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(2, true, 1))
        .await
        .unwrap();

    assert_eq!(report.status(), SessionStatus::Completed);
    assert_eq!(report.stats().issues_crawled, 2);
    assert_eq!(report.stats().failed_issues, 0);

    let mut written = sink.written_ids();
    written.sort();
    assert_eq!(written, vec!["IMS-1".to_string(), "IMS-2".to_string()]);
    assert!(sink.errors().is_empty());
}

#[tokio::test]
async fn test_two_links_to_same_page_persist_once() {
    let tracker = Arc::new(
        MockTracker::with_seeds(&["1", "one"])
            .page("1", tracker_page("IMS-1", &[]))
            .page("one", tracker_page("IMS-1", &[])),
    );
    let sink = Arc::new(MemorySink::new());

    let report = orchestrator(&tracker, &sink)
        .crawl(request(2, false, 0))
        .await
        .unwrap();

    assert_eq!(report.stats().issues_found, 2);
    assert_eq!(report.stats().issues_crawled, 1);
    assert_eq!(report.stats().failed_issues, 0);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(sink.written_ids(), vec!["IMS-1".to_string()]);
}

#[tokio::test]
async fn test_failed_write_releases_canonical_claim() {
    // Both links resolve to IMS-1; the first failure must not block the second attempt
    let tracker = Arc::new(
        MockTracker::with_seeds(&["1", "one"])
            .page("1", tracker_page("IMS-1", &[]))
            .page("one", tracker_page("IMS-1", &[])),
    );
    let sink = Arc::new(MemorySink::new().failing_write("IMS-1"));

    let report = orchestrator(&tracker, &sink)
        .crawl(request(2, false, 0))
        .await
        .unwrap();

    assert_eq!(tracker.fetch_count("1"), 1);
    assert_eq!(tracker.fetch_count("one"), 1);
    assert_eq!(report.stats().failed_issues, 2);
    assert_eq!(report.stats().issues_crawled, 0);
    assert_eq!(sink.errors().len(), 2);
}

#[tokio::test]
async fn test_panic_outside_task_recovery_fails_session() {
    // The error log itself panics, which escapes the per-task recovery
    let tracker = Arc::new(MockTracker::numbered(6).failing("2"));
    let sink = Arc::new(MemorySink::new().panicking_error_log());

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator(&tracker, &sink).crawl(request(6, false, 0)),
    )
    .await
    .expect("crawl did not return after a worker died");

    match result {
        Err(CrawlerError::WorkerPanic { message, .. }) => {
            assert!(message.contains("error log unavailable"));
        }
        other => panic!("expected WorkerPanic, got {:?}", other.map(|r| r.status())),
    }

    let finished = sink.finished().unwrap();
    assert_eq!(finished.status, SessionStatus::Failed);
    assert!(finished.completed_at.is_some());
    assert!(finished
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("panicked"));
}
