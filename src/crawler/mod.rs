//! Crawler module for syncing the follow graph from the GitHub API
//!
//! This module contains the live-fetching side of the crate, including:
//! - Rate-limit-aware conditional HTTP fetching
//! - Typed API payloads and pagination links
//! - Per-user profile and edge-list synchronization
//! - Bounded, cycle-safe crawl coordination

pub mod clock;
mod coordinator;
mod fetcher;
pub mod payload;
mod syncer;

pub use clock::{Clock, SimulatedClock, SystemClock};
pub use coordinator::{CrawlReport, GraphCrawler};
pub use fetcher::{build_http_client, normalize_etag, Endpoint, FetchResult, Fetcher};
pub use syncer::{Direction, SyncOutcome, UserSyncer};

use crate::config::Config;
use crate::storage::{GraphStore, SharedStore};
use crate::GraphError;
use tokio_util::sync::CancellationToken;

/// Builds the fetcher, syncer and crawler stack over a shared store
///
/// The persisted rate-limit state is restored and, if there is none yet,
/// bootstrapped from the API.
///
/// # Arguments
///
/// * `config` - The loaded configuration
/// * `config_hash` - Hash recorded with every run
/// * `store` - The graph store
/// * `cancel` - Token that interrupts rate-limit waits and the crawl loop
pub async fn build_crawler<S: GraphStore>(
    config: &Config,
    config_hash: &str,
    store: SharedStore<S>,
    cancel: CancellationToken,
) -> Result<GraphCrawler<S>, GraphError> {
    let token = crate::config::resolve_access_token(config);
    let mut fetcher = Fetcher::new(&config.github, token, store.clone())?.with_cancellation(cancel);
    fetcher.bootstrap_rate_limit().await?;

    let syncer = UserSyncer::new(fetcher, store);
    Ok(GraphCrawler::new(syncer).with_config_hash(config_hash))
}
