//! Crawler coordinator - bounded graph expansion from a seed account
//!
//! This module contains the crawl loop, including:
//! - Recording the crawl as a run
//! - Resolving the seed account
//! - Expanding neighbors depth-first from an explicit worklist
//! - Cycle avoidance along each branch's ancestor path
//! - Handling interrupts

use crate::crawler::syncer::{SyncOutcome, UserSyncer};
use crate::storage::{lock_store, GraphStore, RunStatus};
use crate::GraphError;

/// Summary of one crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub run_id: i64,
    /// Nodes whose edges were synced, counting repeat visits
    pub visited: usize,
    pub profiles_refreshed: usize,
    pub edges_added: usize,
    /// Sync calls answered with 304
    pub not_modified: usize,
    /// Sync calls that failed or found nothing upstream
    pub failures: usize,
}

impl CrawlReport {
    fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Updated { edges_added } => self.edges_added += edges_added,
            SyncOutcome::NotModified => self.not_modified += 1,
            SyncOutcome::Skipped => {}
            SyncOutcome::NotFound | SyncOutcome::Failed => self.failures += 1,
        }
    }
}

/// One pending expansion
///
/// Each item carries its own copy of the path from the seed, so sibling
/// branches never share cycle-avoidance state.
#[derive(Debug, Clone)]
struct Visit {
    user_id: i64,
    /// Remaining hops; `<= 1` syncs edges without expanding neighbors
    depth: u32,
    /// Ids from the seed down to and including this node
    ancestors: Vec<i64>,
    refresh_profile: bool,
}

/// Expands the follow graph from a seed to a bounded depth
pub struct GraphCrawler<S> {
    syncer: UserSyncer<S>,
    config_hash: String,
}

impl<S: GraphStore> GraphCrawler<S> {
    pub fn new(syncer: UserSyncer<S>) -> Self {
        Self {
            syncer,
            config_hash: String::new(),
        }
    }

    /// Tags recorded runs with the hash of the configuration that started them
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    pub fn syncer(&self) -> &UserSyncer<S> {
        &self.syncer
    }

    pub fn syncer_mut(&mut self) -> &mut UserSyncer<S> {
        &mut self.syncer
    }

    /// Crawls outward from `seed`
    ///
    /// # Arguments
    ///
    /// * `seed` - Login of the account to start from
    /// * `max_depth` - Hops to expand; `1` syncs only the seed's own edges
    /// * `force_refresh` - Ignore stored etags and rebuild edge sets
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - Crawl finished; per-node failures are counted,
    ///   not raised
    /// * `Err(GraphError::SeedNotFound)` - The seed could not be resolved
    /// * `Err(GraphError::Cancelled)` - Interrupted; the run is marked as such
    /// * `Err(GraphError)` - Fatal local failure
    pub async fn crawl(
        &mut self,
        seed: &str,
        max_depth: u32,
        force_refresh: bool,
    ) -> Result<CrawlReport, GraphError> {
        let store = self.syncer.store().clone();
        let run_id = lock_store(&store)?.create_run(
            seed,
            max_depth,
            force_refresh,
            &self.config_hash,
        )?;
        tracing::info!(
            "Starting crawl run {} from {} (depth {}, force: {})",
            run_id,
            seed,
            max_depth,
            force_refresh
        );

        let result = self.expand(run_id, seed, max_depth, force_refresh).await;

        let status = match &result {
            Ok(_) => RunStatus::Completed,
            Err(GraphError::Cancelled) => RunStatus::Interrupted,
            Err(_) => RunStatus::Failed,
        };
        let finished = lock_store(&store)
            .and_then(|mut s| s.finish_run(run_id, status).map_err(GraphError::from));
        if let Err(e) = finished {
            tracing::error!("Failed to record end of run {}: {}", run_id, e);
        }

        match &result {
            Ok(report) => tracing::info!(
                "Crawl run {} complete: {} visits, {} profiles refreshed, {} new edges, {} unchanged, {} failures",
                run_id,
                report.visited,
                report.profiles_refreshed,
                report.edges_added,
                report.not_modified,
                report.failures
            ),
            Err(GraphError::Cancelled) => tracing::warn!("Crawl run {} interrupted", run_id),
            Err(e) => tracing::error!("Crawl run {} failed: {}", run_id, e),
        }

        result
    }

    async fn expand(
        &mut self,
        run_id: i64,
        seed: &str,
        max_depth: u32,
        force_refresh: bool,
    ) -> Result<CrawlReport, GraphError> {
        let store = self.syncer.store().clone();
        let mut report = CrawlReport {
            run_id,
            ..CrawlReport::default()
        };

        let seed_user = self
            .syncer
            .resolve(seed, force_refresh)
            .await?
            .ok_or_else(|| GraphError::SeedNotFound {
                login: seed.to_string(),
            })?;

        let mut stack = vec![Visit {
            user_id: seed_user.id,
            depth: max_depth,
            ancestors: vec![seed_user.id],
            refresh_profile: false,
        }];

        while let Some(visit) = stack.pop() {
            if self.syncer.fetcher().is_cancelled() {
                return Err(GraphError::Cancelled);
            }

            let mut user = lock_store(&store)?.get_user(visit.user_id)?;

            if visit.refresh_profile {
                let outcome = self.syncer.sync_profile(&mut user, force_refresh).await?;
                report.record(outcome);
                match outcome {
                    SyncOutcome::NotFound | SyncOutcome::Failed => {
                        tracing::debug!("Skipping {} after failed profile sync", user.login);
                        continue;
                    }
                    SyncOutcome::Updated { .. } => report.profiles_refreshed += 1,
                    _ => {}
                }
            }

            let outcome = self.syncer.sync_followers(&mut user, force_refresh).await?;
            report.record(outcome);
            let outcome = self.syncer.sync_following(&mut user, force_refresh).await?;
            report.record(outcome);

            report.visited += 1;
            if report.visited % 10 == 0 {
                tracing::info!(
                    "Progress: {} visits, {} pending, {} new edges",
                    report.visited,
                    stack.len(),
                    report.edges_added
                );
            }

            if visit.depth <= 1 {
                continue;
            }

            let neighbors = neighbors_of(&*lock_store(&store)?, user.id)?;
            for neighbor in neighbors.into_iter().rev() {
                if visit.ancestors.contains(&neighbor) {
                    continue;
                }
                let mut ancestors = visit.ancestors.clone();
                ancestors.push(neighbor);
                stack.push(Visit {
                    user_id: neighbor,
                    depth: visit.depth - 1,
                    ancestors,
                    refresh_profile: true,
                });
            }
        }

        Ok(report)
    }
}

/// Followers first, then followed accounts, each listed once
fn neighbors_of<S: GraphStore + ?Sized>(store: &S, user_id: i64) -> Result<Vec<i64>, GraphError> {
    let mut neighbors: Vec<i64> = Vec::new();
    let followers = store.followers_of(user_id)?;
    let following = store.following_of(user_id)?;

    for other in followers.iter().chain(following.iter()) {
        if !neighbors.contains(&other.id) {
            neighbors.push(other.id);
        }
    }
    Ok(neighbors)
}
