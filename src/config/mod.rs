//! Configuration module for follow-graph
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use follow_graph::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("follow-graph.toml")).unwrap();
//! println!("Crawler will expand {} hops", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, GithubConfig, OutputConfig, ACCESS_TOKEN_ENV, DEFAULT_API_URL,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, parse_config, resolve_access_token,
};
