//! HTML parser for tracker pages
//!
//! This module handles extracting:
//! - Issue links from search result pages
//! - Issue fields, comments, history, attachments and related issues from
//!   detail pages
//! - Page titles (used to detect the login page)
//!
//! Each field is looked up through a short list of selectors; the first one
//! that yields non-empty text wins.

use crate::tracker::types::{AttachmentInfo, Comment, HistoryEntry, IssueRef, IssueRecord};
use scraper::{ElementRef, Html, Selector};
use url::Url;

const ISSUE_ID_SELECTORS: &[&str] = &[".issue-id", "#issue-id", "[data-field='issue_id']"];
const TITLE_SELECTORS: &[&str] = &[".issue-title", "#issue-title", "h1"];
const DESCRIPTION_SELECTORS: &[&str] = &[".issue-description", "#description", ".description"];
const PRODUCT_SELECTORS: &[&str] = &[".issue-product", "[data-field='product']"];
const STATUS_SELECTORS: &[&str] = &[".issue-status", "[data-field='status']"];
const PRIORITY_SELECTORS: &[&str] = &[".issue-priority", "[data-field='priority']"];
const REPORTER_SELECTORS: &[&str] = &[".issue-reporter", "[data-field='reporter']"];
const ASSIGNEE_SELECTORS: &[&str] = &[".issue-assignee", "[data-field='assignee']"];
const CREATED_SELECTORS: &[&str] = &[".issue-created", "[data-field='created']"];
const UPDATED_SELECTORS: &[&str] = &[".issue-updated", "[data-field='updated']"];

/// Extracts the page title
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Returns true if a URL or page title indicates the tracker's login page
pub fn is_login_page(url: &str, title: Option<&str>) -> bool {
    if url.contains("login.do") || url.contains("/auth/login") {
        return true;
    }

    title
        .map(|t| t.to_lowercase().contains("login"))
        .unwrap_or(false)
}

/// Parses a search result page into ranked issue references
///
/// Issue links are `a.issue-link` elements; the identifier comes from a
/// `data-issue-id` attribute, an `issueId` query parameter, or the last path
/// segment, in that order. Duplicate identifiers keep their first position.
pub fn parse_search_results(html: &str, base_url: &Url, max_results: usize) -> Vec<IssueRef> {
    let document = Html::parse_document(html);
    let mut results: Vec<IssueRef> = Vec::new();

    let Ok(selector) = Selector::parse("a.issue-link[href]") else {
        return results;
    };

    for element in document.select(&selector) {
        if results.len() >= max_results {
            break;
        }

        if let Some(issue) = issue_ref_from_link(element, base_url) {
            if !results.iter().any(|r| r.id == issue.id) {
                results.push(issue);
            }
        }
    }

    results
}

/// Parses an issue detail page
///
/// # Arguments
///
/// * `html` - The page HTML
/// * `issue` - The reference the page was fetched for; supplies the id when
///   the page does not show one and the base for relative links
/// * `crawled_at` - RFC 3339 timestamp stored on the record
///
/// # Returns
///
/// * `Ok(IssueRecord)` - The parsed issue
/// * `Err(String)` - The page has no recognisable issue content
pub fn parse_issue_page(
    html: &str,
    issue: &IssueRef,
    crawled_at: &str,
) -> Result<IssueRecord, String> {
    let base_url =
        Url::parse(&issue.url).map_err(|e| format!("Invalid issue URL {}: {}", issue.url, e))?;
    let document = Html::parse_document(html);

    let issue_id = first_text(&document, ISSUE_ID_SELECTORS).unwrap_or_else(|| issue.id.clone());
    let title = first_text(&document, TITLE_SELECTORS);
    let description = first_text(&document, DESCRIPTION_SELECTORS);

    if title.is_none() && description.is_none() {
        return Err("No issue title or description found".to_string());
    }

    let related = extract_related(&document, &base_url)
        .into_iter()
        .filter(|r| r.id != issue_id)
        .collect();

    Ok(IssueRecord {
        issue_id,
        url: issue.url.clone(),
        title,
        description,
        product: first_text(&document, PRODUCT_SELECTORS),
        status: first_text(&document, STATUS_SELECTORS),
        priority: first_text(&document, PRIORITY_SELECTORS),
        reporter: first_text(&document, REPORTER_SELECTORS),
        assignee: first_text(&document, ASSIGNEE_SELECTORS),
        created_date: first_text(&document, CREATED_SELECTORS),
        updated_date: first_text(&document, UPDATED_SELECTORS),
        comments: extract_comments(&document),
        history: extract_history(&document),
        attachments: extract_attachments(&document, &base_url),
        related,
        crawled_at: crawled_at.to_string(),
    })
}

/// Returns the trimmed text of the first selector that matches with content
fn first_text(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// Same as `first_text` but scoped to one element
fn child_text(element: ElementRef<'_>, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    element
        .select(&selector)
        .map(element_text)
        .find(|text| !text.is_empty())
}

/// Collapses whitespace in an element's text
fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_comments(document: &Html) -> Vec<Comment> {
    let Ok(selector) = Selector::parse(".comment") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| {
            let content = child_text(element, ".comment-content, .content")?;
            Some(Comment {
                author: child_text(element, ".comment-author, .author"),
                date: child_text(element, ".comment-date, .date"),
                content,
            })
        })
        .collect()
}

/// Entries with none of the four fields are skipped
fn extract_history(document: &Html) -> Vec<HistoryEntry> {
    let Ok(selector) = Selector::parse(".history-item, .activity-item") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(|element| HistoryEntry {
            user: child_text(element, ".user, .author"),
            date: child_text(element, ".date, .timestamp"),
            action: child_text(element, ".action, .change"),
            details: child_text(element, ".details, .history-details"),
        })
        .filter(|entry| {
            entry.user.is_some()
                || entry.date.is_some()
                || entry.action.is_some()
                || entry.details.is_some()
        })
        .collect()
}

fn extract_attachments(document: &Html, base_url: &Url) -> Vec<AttachmentInfo> {
    let Ok(selector) = Selector::parse(".attachment a[href], a.attachment[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| {
            let href = element.value().attr("href")?;
            let url = resolve_link(href, base_url)?;
            let filename = element
                .value()
                .attr("data-filename")
                .map(str::to_string)
                .or_else(|| Some(element_text(element)).filter(|t| !t.is_empty()))
                .or_else(|| last_segment(&url))?;

            Some(AttachmentInfo {
                filename,
                url: Some(url.to_string()),
                ..Default::default()
            })
        })
        .collect()
}

fn extract_related(document: &Html, base_url: &Url) -> Vec<IssueRef> {
    let Ok(selector) = Selector::parse(".related-issues a[href], a.related-issue[href]") else {
        return Vec::new();
    };

    let mut related: Vec<IssueRef> = Vec::new();
    for element in document.select(&selector) {
        if let Some(issue) = issue_ref_from_link(element, base_url) {
            if !related.iter().any(|r| r.id == issue.id) {
                related.push(issue);
            }
        }
    }
    related
}

/// Builds an issue reference from an anchor element
fn issue_ref_from_link(element: ElementRef<'_>, base_url: &Url) -> Option<IssueRef> {
    let href = element.value().attr("href")?;
    let url = resolve_link(href, base_url)?;

    let id = element
        .value()
        .attr("data-issue-id")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            url.query_pairs()
                .find(|(key, _)| key == "issueId")
                .map(|(_, value)| value.into_owned())
        })
        .or_else(|| last_segment(&url))?;

    Some(IssueRef::new(id, url.to_string()))
}

fn last_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

/// Resolves a link href against the page URL
///
/// Returns None for empty hrefs, `javascript:` / `mailto:` links and anything
/// that does not end up as HTTP(S).
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:") || href.starts_with("mailto:") {
        return None;
    }

    let url = base_url.join(href).ok()?;

    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}
