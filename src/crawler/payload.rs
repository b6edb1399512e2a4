//! Typed views of the API responses the crawler consumes

use serde::Deserialize;
use url::Url;

/// Body of `GET /users/{login}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfilePayload {
    pub id: i64,
    pub login: String,
    pub followers: u32,
    pub following: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl ProfilePayload {
    pub fn decode(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// One account in a follower/following listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountRef {
    pub id: i64,
    pub login: String,
}

/// One page of a follower/following listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgePagePayload {
    pub accounts: Vec<AccountRef>,
    /// Continuation, absent on the last page
    pub next_page: Option<Url>,
}

impl EdgePagePayload {
    pub fn decode(body: &str, next_page: Option<Url>) -> Result<Self, serde_json::Error> {
        Ok(Self {
            accounts: serde_json::from_str(body)?,
            next_page,
        })
    }
}

/// Body of `GET /rate_limit`; only the core bucket matters here
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitPayload {
    pub resources: RateLimitResources,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitResources {
    pub core: RateLimitBucket,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitBucket {
    pub limit: u32,
    pub remaining: u32,
    pub reset: i64,
}

impl RateLimitPayload {
    pub fn decode(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Extracts the `rel="next"` target of an RFC 8288 `Link` header
///
/// Relative targets are resolved against `base`.
pub fn parse_next_link(header: &str, base: &Url) -> Option<Url> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let target = target.strip_prefix('<')?.strip_suffix('>')?;

        let is_next = parts.any(|param| {
            let param = param.trim();
            param
                .strip_prefix("rel=")
                .map(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
                .unwrap_or(false)
        });

        if is_next {
            base.join(target).ok()
        } else {
            None
        }
    })
}
