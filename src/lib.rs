//! Follow-graph: an incremental GitHub follower graph
//!
//! This crate crawls the follower/following relations of GitHub accounts into a
//! local SQLite graph, refreshing incrementally with etags while respecting the
//! API rate limit, and answers hop-distance queries over the stored edges.

pub mod config;
pub mod crawler;
pub mod output;
pub mod query;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for follow-graph operations
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Payload decode error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Seed account could not be resolved: {login}")]
    SeedNotFound { login: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Store lock poisoned")]
    LockPoisoned,

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

/// Result type alias for follow-graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{FetchResult, Fetcher, GraphCrawler, UserSyncer};
pub use query::DistanceQueryEngine;
pub use state::RateLimitState;
pub use storage::{GraphStore, SqliteStorage, UserRecord};
