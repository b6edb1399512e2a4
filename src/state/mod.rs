//! Process-wide fetch state
//!
//! - `RateLimitState`: the remote API quota, persisted between runs

mod rate_limit;

pub use rate_limit::{RateLimitState, LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER};
