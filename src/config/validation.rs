use crate::config::types::{Config, CrawlerConfig, OutputConfig, TrackerConfig};
use crate::ConfigError;
use url::Url;

/// Upper bound on search hits a single run may crawl
pub const MAX_RESULTS_LIMIT: usize = 1000;

/// Upper bound on related-issue depth
pub const MAX_DEPTH_LIMIT: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_tracker_config(&config.tracker)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates tracker connection settings
fn validate_tracker_config(config: &TrackerConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.username.trim().is_empty() {
        return Err(ConfigError::Validation(
            "username cannot be empty".to_string(),
        ));
    }

    match &config.password {
        Some(p) if !p.is_empty() => {}
        _ => {
            return Err(ConfigError::Validation(
                "password must be set in the config file or ISSUE_CRAWLER_PASSWORD".to_string(),
            ))
        }
    }

    if config.session_timeout_minutes < 1 {
        return Err(ConfigError::Validation(format!(
            "session-timeout-minutes must be >= 1, got {}",
            config.session_timeout_minutes
        )));
    }

    if config.request_timeout_secs < 1 || config.request_timeout_secs > 600 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be between 1 and 600, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
}

/// Validates crawl defaults
pub fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_crawl_limits(config.max_results, config.max_depth)
}

/// Validates the per-run limits shared by the config file and CLI overrides
pub fn validate_crawl_limits(max_results: usize, max_depth: u32) -> Result<(), ConfigError> {
    if max_results < 1 || max_results > MAX_RESULTS_LIMIT {
        return Err(ConfigError::Validation(format!(
            "max-results must be between 1 and {}, got {}",
            MAX_RESULTS_LIMIT, max_results
        )));
    }

    if max_depth > MAX_DEPTH_LIMIT {
        return Err(ConfigError::Validation(format!(
            "max-depth must be <= {}, got {}",
            MAX_DEPTH_LIMIT, max_depth
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if matches!(&config.issues_dir, Some(dir) if dir.is_empty()) {
        return Err(ConfigError::Validation(
            "issues-dir cannot be empty when set".to_string(),
        ));
    }

    if config.attachments_dir.is_empty() {
        return Err(ConfigError::Validation(
            "attachments-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}
