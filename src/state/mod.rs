//! State module for tracking crawl session progress
//!
//! # Components
//!
//! - `SessionStatus`: The lifecycle of one crawl invocation
//!   (authenticating, searching, crawling, completing, and the terminal states)
//! - `CrawlSession`: The session record the orchestrator owns and persists
//! - `SessionStats`: Aggregate counters for a session
//! - `CrawledIssue`: A successful per-issue result

mod crawl_session;
mod session_state;

pub use crawl_session::{CrawlSession, CrawledIssue, SessionStats};
pub use session_state::SessionStatus;
