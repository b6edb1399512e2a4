use crate::config::types::{Config, ACCESS_TOKEN_ENV};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
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
/// use follow_graph::config::load_config;
///
/// let config = load_config(Path::new("follow-graph.toml")).unwrap();
/// println!("Max depth: {}", config.crawler.max_depth);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded with every crawl run so runs made under different settings can be
/// told apart.
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

/// Resolves the access token: the configured value wins, then the
/// `GITHUB_ACCESS_TOKEN` environment variable.
pub fn resolve_access_token(config: &Config) -> Option<String> {
    config.github.access_token.clone().or_else(|| {
        std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|token| !token.trim().is_empty())
    })
}
