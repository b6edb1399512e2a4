//! HTTP fetcher implementation
//!
//! This module handles all requests to the remote API, including:
//! - Building HTTP clients with the configured user agent
//! - Conditional GETs with `If-None-Match`
//! - Tracking the rate-limit headers and persisting them after every call
//! - Blocking (cancellably) while the quota is exhausted
//! - Surfacing pagination links without following them
//! - Error classification

use crate::config::GithubConfig;
use crate::crawler::clock::{Clock, SystemClock};
use crate::crawler::payload::{parse_next_link, RateLimitPayload};
use crate::state::RateLimitState;
use crate::storage::{lock_store, RateLimitCache, SharedStore};
use crate::GraphError;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, ETAG, IF_NONE_MATCH, LINK};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Media type requested from the API
const GITHUB_JSON: &str = "application/vnd.github+json";

/// How many times a request rejected for quota reasons is retried after backoff
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Target of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Path and query relative to the API root, e.g. `/users/octocat`
    Path(String),

    /// Absolute URL, as handed back in a pagination link
    Url(Url),
}

impl Endpoint {
    pub fn profile(login: &str) -> Self {
        Self::Path(format!("/users/{}", login))
    }

    pub fn followers(login: &str, per_page: u32) -> Self {
        Self::Path(format!("/users/{}/followers?per_page={}", login, per_page))
    }

    pub fn following(login: &str, per_page: u32) -> Self {
        Self::Path(format!("/users/{}/following?per_page={}", login, per_page))
    }

    pub fn rate_limit() -> Self {
        Self::Path("/rate_limit".to_string())
    }

    /// Resolves the endpoint against the API root
    pub fn resolve(&self, base: &Url) -> Result<Url, url::ParseError> {
        match self {
            Self::Path(path) => {
                let root = base.as_str().trim_end_matches('/');
                Url::parse(&format!("{}{}", root, path))
            }
            Self::Url(url) => Ok(url.clone()),
        }
    }
}

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// Fresh data
    Ok {
        /// Response body
        body: String,
        /// Version token, weak prefix stripped
        etag: Option<String>,
        /// Continuation for paginated listings
        next_page: Option<Url>,
    },

    /// The etag sent still matches; nothing changed upstream
    NotModified,

    /// The account does not exist
    NotFound,

    /// Transport failure or unexpected status; transient
    Error {
        /// HTTP status, if a response arrived at all
        status_code: Option<u16>,
        /// Error description
        error: String,
    },
}

impl FetchResult {
    fn transient(status_code: Option<u16>, error: impl Into<String>) -> Self {
        Self::Error {
            status_code,
            error: error.into(),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// GitHub rejects requests without a `User-Agent`, so one is always set.
pub fn build_http_client(config: &GithubConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Rate-limit-aware client for the GitHub REST API
///
/// The fetcher owns the process-wide [`RateLimitState`]. It is loaded from the
/// cache when the fetcher is built and written back after every response.
pub struct Fetcher<S> {
    client: Client,
    base_url: Url,
    token: Option<String>,
    per_page: u32,
    rate_limit: Option<RateLimitState>,
    cache: SharedStore<S>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl<S: RateLimitCache> Fetcher<S> {
    /// Creates a fetcher, restoring any persisted rate-limit state
    ///
    /// # Arguments
    ///
    /// * `config` - Remote API configuration
    /// * `token` - Access token; `None` runs at the unauthenticated quota
    /// * `cache` - Store holding the persisted rate-limit state
    pub fn new(
        config: &GithubConfig,
        token: Option<String>,
        cache: SharedStore<S>,
    ) -> Result<Self, GraphError> {
        let client = build_http_client(config)?;
        let base_url = Url::parse(&config.api_url)?;

        if token.is_none() {
            tracing::warn!(
                "No GitHub access token configured; running at the unauthenticated rate limit"
            );
        }

        let rate_limit = lock_store(&cache)?.load_rate_limit()?;
        if let Some(state) = rate_limit {
            tracing::debug!(
                "Restored rate limit state: {}/{} remaining, reset at {}",
                state.remaining,
                state.limit,
                state.reset_at
            );
        }

        Ok(Self {
            client,
            base_url,
            token,
            per_page: config.per_page,
            rate_limit,
            cache,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        })
    }

    /// Replaces the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Installs the token that interrupts rate-limit waits
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn rate_limit(&self) -> Option<RateLimitState> {
        self.rate_limit
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Seeds the rate-limit state from `GET /rate_limit` when none is known
    ///
    /// Failure is not fatal: the state is then learned from the first
    /// response's headers.
    pub async fn bootstrap_rate_limit(&mut self) -> Result<(), GraphError> {
        if self.rate_limit.is_some() {
            return Ok(());
        }

        match self.fetch(&Endpoint::rate_limit(), None).await? {
            FetchResult::Ok { body, .. } => match RateLimitPayload::decode(&body) {
                Ok(payload) => {
                    let core = payload.resources.core;
                    self.record_rate_limit(RateLimitState::new(
                        core.limit,
                        core.remaining,
                        core.reset,
                    ))?;
                }
                Err(e) => tracing::warn!("Unreadable rate limit payload: {}", e),
            },
            other => tracing::warn!("Could not bootstrap rate limit state: {:?}", other),
        }

        Ok(())
    }

    /// Fetches an endpoint, conditionally if an etag is given
    ///
    /// # Request Flow
    ///
    /// 1. If the quota is exhausted, wait for the reset (cancellable)
    /// 2. Send the GET with auth and `If-None-Match` headers
    /// 3. Record the rate-limit headers and persist them
    /// 4. Classify the response
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | HTTP 2xx | `Ok` with body, etag, next page |
    /// | HTTP 304 | `NotModified` |
    /// | HTTP 404 | `NotFound` |
    /// | HTTP 403/429 with quota exhausted | wait for reset and retry |
    /// | Other status, transport error | `Error` |
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResult)` - The classified response
    /// * `Err(GraphError::Cancelled)` - Cancelled while waiting for the quota
    /// * `Err(GraphError)` - Rate-limit state could not be persisted
    pub async fn fetch(
        &mut self,
        endpoint: &Endpoint,
        etag: Option<&str>,
    ) -> Result<FetchResult, GraphError> {
        let url = endpoint.resolve(&self.base_url)?;
        let mut attempts = 0;

        loop {
            self.wait_for_quota().await?;

            tracing::debug!("GET {} (etag: {:?})", url, etag);
            let mut request = self.client.get(url.clone()).header(ACCEPT, GITHUB_JSON);
            if let Some(token) = &self.token {
                request = request.header(AUTHORIZATION, format!("token {}", token));
            }
            if let Some(etag) = etag {
                request = request.header(IF_NONE_MATCH, etag);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Request to {} failed: {}", url, e);
                    let error = if e.is_timeout() {
                        "Request timeout".to_string()
                    } else if e.is_connect() {
                        "Connection refused".to_string()
                    } else {
                        e.to_string()
                    };
                    return Ok(FetchResult::transient(None, error));
                }
            };

            if let Some(state) = RateLimitState::from_headers(response.headers()) {
                self.record_rate_limit(state)?;
            }

            let status = response.status();
            let quota_rejected = matches!(
                status,
                StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
            ) && self.rate_limit.map_or(false, |s| s.is_exhausted());

            if quota_rejected && attempts < MAX_RATE_LIMIT_RETRIES {
                attempts += 1;
                tracing::warn!(
                    "Request to {} rejected by rate limit (HTTP {}), retrying after reset",
                    url,
                    status.as_u16()
                );
                continue;
            }

            if status == StatusCode::NOT_MODIFIED {
                return Ok(FetchResult::NotModified);
            }

            if status == StatusCode::NOT_FOUND {
                tracing::debug!("{} not found", url);
                return Ok(FetchResult::NotFound);
            }

            if !status.is_success() {
                tracing::warn!("Unexpected HTTP {} from {}", status.as_u16(), url);
                return Ok(FetchResult::transient(
                    Some(status.as_u16()),
                    format!("HTTP {}", status.as_u16()),
                ));
            }

            let new_etag = response
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(normalize_etag);
            let next_page = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(|link| parse_next_link(link, &url));

            return match response.text().await {
                Ok(body) => Ok(FetchResult::Ok {
                    body,
                    etag: new_etag,
                    next_page,
                }),
                Err(e) => {
                    tracing::warn!("Failed to read body from {}: {}", url, e);
                    Ok(FetchResult::transient(Some(status.as_u16()), e.to_string()))
                }
            };
        }
    }

    /// Blocks while the quota is exhausted
    ///
    /// Returns `Err(GraphError::Cancelled)` as soon as the cancellation token
    /// fires; the persisted state is left as it was.
    async fn wait_for_quota(&self) -> Result<(), GraphError> {
        let Some(state) = self.rate_limit else {
            return Ok(());
        };
        let Some(wait) = state.wait_duration(self.clock.now()) else {
            return Ok(());
        };

        tracing::warn!(
            "Rate limit exceeded. Waiting {} seconds for reset. Use Ctrl-C to cancel.",
            wait.as_secs()
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::info!("Rate limit wait cancelled");
                Err(GraphError::Cancelled)
            }
            _ = self.clock.sleep(wait) => Ok(()),
        }
    }

    fn record_rate_limit(&mut self, state: RateLimitState) -> Result<(), GraphError> {
        self.rate_limit = Some(state);
        lock_store(&self.cache)?.save_rate_limit(&state)?;
        Ok(())
    }
}

/// Strips the weak-validator prefix from an etag
pub fn normalize_etag(etag: &str) -> String {
    etag.trim().trim_start_matches("W/").to_string()
}
