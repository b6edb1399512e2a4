use serde::Deserialize;

/// Default GitHub REST API root
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Environment variable consulted when no access token is configured
pub const ACCESS_TOKEN_ENV: &str = "GITHUB_ACCESS_TOKEN";

/// Main configuration structure for follow-graph
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
}

/// Remote API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    /// Root of the REST API
    #[serde(rename = "api-url", default = "default_api_url")]
    pub api_url: String,

    /// Personal access token; absent means the unauthenticated quota
    #[serde(rename = "access-token", default)]
    pub access_token: Option<String>,

    /// Page size requested from the follower/following endpoints
    #[serde(rename = "per-page", default = "default_per_page")]
    pub per_page: u32,

    /// User-Agent header value (GitHub rejects requests without one)
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            access_token: None,
            per_page: default_per_page(),
            user_agent: default_user_agent(),
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of hops to expand from the seed account
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Ignore stored etags and rebuild edge sets from scratch
    #[serde(rename = "force-refresh", default)]
    pub force_refresh: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            force_refresh: false,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_per_page() -> u32 {
    100
}

fn default_user_agent() -> String {
    "follow-graph".to_string()
}

fn default_max_depth() -> u32 {
    3
}
