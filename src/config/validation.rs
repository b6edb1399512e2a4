use crate::config::types::{Config, CrawlerConfig, GithubConfig, OutputConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_github_config(&config.github)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates remote API configuration
fn validate_github_config(config: &GithubConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.api_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid api_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "api_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.per_page < 1 || config.per_page > 100 {
        return Err(ConfigError::Validation(format!(
            "per_page must be between 1 and 100, got {}",
            config.per_page
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if let Some(token) = &config.access_token {
        if token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "access_token cannot be blank; omit it instead".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_depth < 1 {
        return Err(ConfigError::Validation(format!(
            "max_depth must be >= 1, got {}",
            config.max_depth
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
