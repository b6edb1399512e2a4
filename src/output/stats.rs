//! Statistics generation from the graph database
//!
//! This module provides functionality for extracting and displaying
//! graph statistics from the storage layer.

use crate::state::RateLimitState;
use crate::storage::{GraphStore, RunRecord};
use crate::GraphError;

/// Graph statistics summary
#[derive(Debug, Clone)]
pub struct GraphStatistics {
    /// Total number of user records, synced or not
    pub total_users: u64,

    /// Users whose profile has been fetched at least once
    pub synced_users: u64,

    /// Total number of follow edges
    pub total_edges: u64,

    /// Most recent crawl run
    pub latest_run: Option<RunRecord>,

    /// Last persisted API quota
    pub rate_limit: Option<RateLimitState>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(GraphStatistics)` - Successfully loaded statistics
/// * `Err(GraphError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn GraphStore) -> Result<GraphStatistics, GraphError> {
    Ok(GraphStatistics {
        total_users: storage.count_users()?,
        synced_users: storage.count_synced_users()?,
        total_edges: storage.count_edges()?,
        latest_run: storage.get_latest_run()?,
        rate_limit: storage.load_rate_limit()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &GraphStatistics) {
    println!("=== Graph Statistics ===\n");

    println!("Overview:");
    println!("  Users: {}", stats.total_users);
    let percentage = if stats.total_users > 0 {
        (stats.synced_users as f64 / stats.total_users as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "  Synced profiles: {} ({:.1}%)",
        stats.synced_users, percentage
    );
    println!("  Follow edges: {}", stats.total_edges);
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  Id: {}", run.id);
            println!("  Seed: {} (depth {})", run.seed_login, run.max_depth);
            println!("  Forced refresh: {}", run.force_refresh);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
        }
        None => println!("No crawl runs recorded"),
    }
    println!();

    match &stats.rate_limit {
        Some(limit) => {
            println!("Rate Limit:");
            println!("  Remaining: {} / {}", limit.remaining, limit.limit);
            match limit.reset_time() {
                Some(reset) => println!("  Resets at: {}", reset.to_rfc3339()),
                None => println!("  Resets at: {}", limit.reset_at),
            }
        }
        None => println!("Rate limit state unknown"),
    }
}
