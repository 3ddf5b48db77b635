//! Issue tracker collaborators
//!
//! This module contains everything that talks to the tracker:
//! - The collaborator traits the crawl orchestrator depends on
//! - The issue record model
//! - Per-worker authenticated sessions
//! - The reqwest/scraper implementation and attachment downloader

mod attachments;
mod http;
mod parser;
mod session;
mod traits;
mod types;

pub use attachments::HttpAttachmentDownloader;
pub use http::HttpTracker;
pub use parser::{is_login_page, page_title, parse_issue_page, parse_search_results};
pub use session::{build_http_client, AuthSession, ClientSettings};
pub use traits::{
    AttachmentError, AttachmentProcessor, AuthError, Authenticator, FetchError, IssueFetcher,
    SearchError, SearchExecutor,
};
pub use types::{AttachmentInfo, Comment, HistoryEntry, IssueRecord, IssueRef};
