//! Issue-Crawler: a concurrent issue tracker harvester
//!
//! This crate authenticates against an issue tracking service, runs a search,
//! and crawls every matching issue (optionally following related issues to a
//! bounded depth) with a pool of workers that each own their own session.
//! Every fetched issue is persisted as soon as it is parsed.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod tracker;

use thiserror::Error;

/// Main error type for Issue-Crawler operations
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication failed: {0}")]
    Authentication(#[from] tracker::AuthError),

    #[error("Search failed: {0}")]
    Search(#[from] tracker::SearchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid session transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::SessionStatus,
        to: state::SessionStatus,
    },

    #[error("Worker {worker} panicked: {message}")]
    WorkerPanic { worker: usize, message: String },

    #[error("Worker task failed: {0}")]
    WorkerJoin(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Issue-Crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOrchestrator, CrawlReport, CrawlRequest};
pub use state::SessionStatus;
