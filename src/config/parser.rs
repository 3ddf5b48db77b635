use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable that overrides `tracker.password`
pub const PASSWORD_ENV: &str = "ISSUE_CRAWLER_PASSWORD";

/// Loads and parses a configuration file from the given path
///
/// The tracker password is taken from `ISSUE_CRAWLER_PASSWORD` when that
/// variable is set, so credentials can stay out of the file.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use issue_crawler::config::load_config;
///
/// let config = load_config(Path::new("crawler.toml")).unwrap();
/// println!("Max depth: {}", config.crawler.max_depth);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let env_password = std::env::var(PASSWORD_ENV).ok();
    parse_config(&content, env_password)
}

/// Parses configuration text, applying an optional password override
pub fn parse_config(content: &str, password_override: Option<String>) -> Result<Config, ConfigError> {
    let mut config: Config = toml::from_str(content)?;

    if let Some(password) = password_override.filter(|p| !p.is_empty()) {
        config.tracker.password = Some(password);
    }

    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs with different settings can be told apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
