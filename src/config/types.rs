use serde::Deserialize;

/// Main configuration structure for Issue-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
}

/// Connection and credential settings for the issue tracker
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Root URL of the tracker (login page lives under it)
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Account used for every worker session
    pub username: String,

    /// Account password; the `ISSUE_CRAWLER_PASSWORD` environment variable overrides it
    #[serde(default)]
    pub password: Option<String>,

    /// Minutes after which an authenticated session is considered expired
    #[serde(rename = "session-timeout-minutes", default = "default_session_timeout")]
    pub session_timeout_minutes: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Default crawl parameters; command-line flags override these per run
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of search hits to crawl
    #[serde(rename = "max-results", default = "default_max_results")]
    pub max_results: usize,

    /// Whether related issues are followed
    #[serde(rename = "crawl-related", default)]
    pub crawl_related: bool,

    /// How many hops away from a seed issue related issues are followed
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Whether attachments are downloaded alongside issues
    #[serde(rename = "download-attachments", default = "default_true")]
    pub download_attachments: bool,

    /// Session-wide timeout in seconds (0 disables it)
    #[serde(rename = "crawl-timeout-secs", default)]
    pub crawl_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            crawl_related: false,
            max_depth: default_max_depth(),
            download_attachments: true,
            crawl_timeout_secs: 0,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file (primary store)
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory receiving one JSON file per crawled issue (secondary store)
    #[serde(rename = "issues-dir", default)]
    pub issues_dir: Option<String>,

    /// Directory receiving downloaded attachments
    #[serde(rename = "attachments-dir", default = "default_attachments_dir")]
    pub attachments_dir: String,
}

fn default_session_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_results() -> usize {
    100
}

fn default_max_depth() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

fn default_attachments_dir() -> String {
    "./data/attachments".to_string()
}
