//! Collaborator traits and error types for talking to the tracker
//!
//! The crawl orchestrator only sees these traits. The HTTP implementation
//! lives in `tracker::http`; tests substitute in-memory fakes.

use crate::storage::StorageError;
use crate::tracker::session::AuthSession;
use crate::tracker::types::{AttachmentInfo, IssueRecord, IssueRef};
use async_trait::async_trait;
use thiserror::Error;

/// Authentication failures (fatal for the crawl session when hit on the primary session)
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Login rejected: {0}")]
    Rejected(String),

    #[error("Login request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Unexpected HTTP {status} from {url}")]
    Status { url: String, status: u16 },
}

/// Search failures (fatal: nothing is fetched)
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Search returned HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Search redirected to the login page")]
    SessionExpired,

    #[error("Invalid search URL: {0}")]
    InvalidUrl(String),
}

/// Per-issue failures; the task fails, the crawl continues
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Session expired while fetching {url}")]
    SessionExpired { url: String },

    #[error("Parse error for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Re-authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Primary store write failed: {0}")]
    Persistence(#[from] StorageError),

    #[error("Task panicked: {0}")]
    Panicked(String),
}

impl FetchError {
    /// Short category stored with session errors
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Status { .. } => "http_status",
            Self::SessionExpired { .. } => "session_expired",
            Self::Parse { .. } => "parse",
            Self::Auth(_) => "authentication",
            Self::Persistence(_) => "persistence",
            Self::Panicked(_) => "panic",
        }
    }
}

/// Per-attachment failures; never fail the owning issue
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Attachment {0} has no download URL")]
    MissingUrl(String),

    #[error("Download of {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Download of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Establishes and checks authenticated state on a session
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Logs the session in, or fails with an authentication error
    async fn login(&self, session: &mut AuthSession) -> Result<(), AuthError>;

    /// Whether the session can be used without logging in again
    fn is_valid(&self, session: &AuthSession) -> bool {
        session.is_fresh()
    }

    /// Drops any previous login and logs in again
    async fn reauthenticate(&self, session: &mut AuthSession) -> Result<(), AuthError> {
        session.invalidate();
        self.login(session).await
    }
}

/// Runs a built query and returns the ranked seed set
#[async_trait]
pub trait SearchExecutor: Send + Sync {
    /// Returns at most `max_results` issue references in rank order
    async fn search(
        &self,
        session: &AuthSession,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<IssueRef>, SearchError>;
}

/// Fetches and parses one issue page
#[async_trait]
pub trait IssueFetcher: Send + Sync {
    /// The session is mutable so an implementation can invalidate it when it
    /// notices the tracker has logged it out.
    async fn fetch_issue(
        &self,
        session: &mut AuthSession,
        issue: &IssueRef,
    ) -> Result<IssueRecord, FetchError>;
}

/// Downloads attachments for a parsed issue
#[async_trait]
pub trait AttachmentProcessor: Send + Sync {
    /// Downloads one attachment, filling in its local path and size
    async fn download(
        &self,
        session: &AuthSession,
        issue_id: &str,
        attachment: &mut AttachmentInfo,
    ) -> Result<(), AttachmentError>;

    /// Downloads every attachment, recording failures on the attachment itself
    ///
    /// Returns the number of attachments downloaded.
    async fn process_all(
        &self,
        session: &AuthSession,
        issue_id: &str,
        attachments: &mut [AttachmentInfo],
    ) -> usize {
        let mut downloaded = 0;

        for attachment in attachments.iter_mut() {
            match self.download(session, issue_id, attachment).await {
                Ok(()) => {
                    attachment.downloaded = true;
                    downloaded += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        issue_id,
                        filename = %attachment.filename,
                        "Attachment download failed: {}",
                        e
                    );
                    attachment.downloaded = false;
                    attachment.error = Some(e.to_string());
                }
            }
        }

        downloaded
    }
}
