/// Crawl session state definitions
///
/// This module defines the lifecycle of one crawl invocation, from
/// authentication through to the final report.
use serde::Serialize;
use std::fmt;

/// Represents the current phase of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    // ===== Active States =====
    /// Session record exists but nothing has happened yet
    Init,

    /// Primary session is logging in
    Authenticating,

    /// Search is running to produce the seed set
    Searching,

    /// Workers are draining the task queue
    Crawling,

    /// Workers have returned, final statistics are being assembled
    Completing,

    // ===== Terminal States =====
    /// All tasks were accounted for (individual tasks may have failed)
    Completed,

    /// Authentication, search or worker infrastructure failed
    Failed,

    /// Cancellation stopped the crawl early; persisted work is kept
    Cancelled,
}

impl SessionStatus {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true while the session is still running
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Checks whether moving from `self` to `next` is a legal transition
    ///
    /// The happy path is strictly linear. Any active state may fail.
    /// Only the crawling and completing phases may be cancelled, since
    /// nothing has been queued before that.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;

        match (self, next) {
            (Init, Authenticating)
            | (Authenticating, Searching)
            | (Searching, Crawling)
            | (Crawling, Completing)
            | (Completing, Completed) => true,
            (Crawling | Completing, Cancelled) => true,
            (current, Failed) => current.is_active(),
            _ => false,
        }
    }

    /// Converts the status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Authenticating => "authenticating",
            Self::Searching => "searching",
            Self::Crawling => "crawling",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from a database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "init" => Some(Self::Init),
            "authenticating" => Some(Self::Authenticating),
            "searching" => Some(Self::Searching),
            "crawling" => Some(Self::Crawling),
            "completing" => Some(Self::Completing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Init,
            Self::Authenticating,
            Self::Searching,
            Self::Crawling,
            Self::Completing,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
