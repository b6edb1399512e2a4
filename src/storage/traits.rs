//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::RateLimitState;
use crate::storage::{RunRecord, RunStatus, UserRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persisted rate-limit state
///
/// Split from [`GraphStore`] so the fetcher depends on nothing but the cache.
pub trait RateLimitCache {
    /// Loads the last persisted quota state, if any
    fn load_rate_limit(&self) -> StorageResult<Option<RateLimitState>>;

    /// Persists the quota state
    fn save_rate_limit(&mut self, state: &RateLimitState) -> StorageResult<()>;
}

/// Trait for graph storage backends
///
/// This trait defines all database operations needed by the syncer, the
/// crawler and the distance queries.
pub trait GraphStore: RateLimitCache {
    // ===== Users =====

    /// Returns the user with this GitHub id, creating a minimal record if
    /// there is none yet
    ///
    /// An existing record is returned untouched even if its login differs
    /// (upstream renames are not reconciled).
    fn get_or_create_user(&mut self, github_id: i64, login: &str) -> StorageResult<UserRecord>;

    /// Gets a user by local id
    fn get_user(&self, user_id: i64) -> StorageResult<UserRecord>;

    /// Gets a user by login (case-insensitive)
    fn get_user_by_login(&self, login: &str) -> StorageResult<Option<UserRecord>>;

    /// Gets several users by local id, preserving the given order
    fn get_users(&self, user_ids: &[i64]) -> StorageResult<Vec<UserRecord>>;

    /// Writes every mutable field of the record
    fn save_user(&mut self, user: &UserRecord) -> StorageResult<()>;

    /// Sets only `last_checked`
    fn touch_user_checked(&mut self, user_id: i64, checked_at: DateTime<Utc>) -> StorageResult<()>;

    // ===== Edges =====

    /// Records that `follower_id` follows `followee_id`
    ///
    /// Returns `false` when the edge already existed.
    fn add_edge(&mut self, follower_id: i64, followee_id: i64) -> StorageResult<bool>;

    /// Removes every edge leaving the user (the accounts they follow)
    fn clear_outgoing(&mut self, user_id: i64) -> StorageResult<usize>;

    /// Removes every edge entering the user (their followers)
    fn clear_incoming(&mut self, user_id: i64) -> StorageResult<usize>;

    /// Accounts following the user
    fn followers_of(&self, user_id: i64) -> StorageResult<Vec<UserRecord>>;

    /// Accounts the user follows
    fn following_of(&self, user_id: i64) -> StorageResult<Vec<UserRecord>>;

    /// Ids one hop away in either direction
    fn neighbor_ids(&self, user_id: i64) -> StorageResult<Vec<i64>>;

    // ===== Distance =====

    /// Users reachable from `root_id` in exactly `distance` hops, either
    /// direction, with distinct semantics at every hop
    fn users_at_exact_distance(
        &self,
        root_id: i64,
        distance: u32,
    ) -> StorageResult<Vec<UserRecord>>;

    // ===== Run Management =====

    /// Creates a new crawl run and returns its id
    fn create_run(
        &mut self,
        seed_login: &str,
        max_depth: u32,
        force_refresh: bool,
        config_hash: &str,
    ) -> StorageResult<i64>;

    /// Sets the final status and finish timestamp of a run
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Statistics =====

    fn count_users(&self) -> StorageResult<u64>;

    /// Users whose profile has been fetched at least once
    fn count_synced_users(&self) -> StorageResult<u64>;

    fn count_edges(&self) -> StorageResult<u64>;
}
