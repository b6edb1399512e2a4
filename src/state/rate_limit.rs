use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use std::time::Duration;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Slack added on top of the advertised reset time before retrying
const RESET_SLACK_SECS: i64 = 1;

/// Quota state reported by the remote API
///
/// One instance is owned by the fetcher for the lifetime of the process. It is
/// loaded from the store at startup and written back after every response, so
/// separate runs share a single view of the quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    /// Requests allowed per window
    pub limit: u32,

    /// Requests left in the current window
    pub remaining: u32,

    /// When the window resets, in seconds since the Unix epoch
    pub reset_at: i64,
}

impl RateLimitState {
    pub fn new(limit: u32, remaining: u32, reset_at: i64) -> Self {
        Self {
            limit,
            remaining,
            reset_at,
        }
    }

    /// Reads the `X-RateLimit-*` headers of a response
    ///
    /// Returns `None` unless all three headers are present and numeric.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        fn parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers.get(name)?.to_str().ok()?.trim().parse().ok()
        }

        Some(Self {
            limit: parse(headers, LIMIT_HEADER)?,
            remaining: parse(headers, REMAINING_HEADER)?,
            reset_at: parse(headers, RESET_HEADER)?,
        })
    }

    /// Whether the quota for the current window is used up
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// The reset time as a timestamp
    pub fn reset_time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.reset_at, 0).single()
    }

    /// How long to hold off before the next request
    ///
    /// `None` when the quota is not exhausted or the reset is already behind us.
    pub fn wait_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.is_exhausted() {
            return None;
        }

        let secs = self.reset_at - now.timestamp() + RESET_SLACK_SECS;
        if secs <= 0 {
            return None;
        }

        Some(Duration::from_secs(secs as u64))
    }
}
