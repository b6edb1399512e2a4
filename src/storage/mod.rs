//! Storage module for persisting the follow graph
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - User records and follow edges
//! - Hop-distance queries over stored edges
//! - The key/value cache holding rate-limit state
//! - Crawl run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{GraphStore, RateLimitCache, StorageError, StorageResult};

use crate::GraphError;
use chrono::{DateTime, Utc};

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// A store shared between the fetcher, the syncer and the crawler
pub type SharedStore<S> = Arc<Mutex<S>>;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, GraphError> {
    SqliteStorage::new(path)
}

/// Wraps a store for sharing
pub fn share<S>(store: S) -> SharedStore<S> {
    Arc::new(Mutex::new(store))
}

/// Locks a shared store
///
/// A poisoned lock means a writer panicked mid-update; that is surfaced as a
/// fatal error rather than retried.
pub fn lock_store<S: ?Sized>(store: &Mutex<S>) -> Result<MutexGuard<'_, S>, GraphError> {
    store.lock().map_err(|_| GraphError::LockPoisoned)
}

/// A GitHub account in the graph
///
/// Records created from someone else's follower or following list carry only
/// the identity fields until their own profile is synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub github_id: i64,
    pub login: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    /// Version token of the last successful profile fetch
    pub etag: Option<String>,
    /// Last time fresh profile data was obtained
    pub last_retrieved: Option<DateTime<Utc>>,
    /// Last time the profile was checked, including unchanged responses
    pub last_checked: Option<DateTime<Utc>>,
    pub num_followers: Option<u32>,
    pub followers_etag: Option<String>,
    /// Next page of the follower list still to be consumed
    pub followers_cursor: Option<String>,
    pub num_following: Option<u32>,
    pub following_etag: Option<String>,
    /// Next page of the following list still to be consumed
    pub following_cursor: Option<String>,
}

impl UserRecord {
    /// Whether the profile has been fetched at least once
    pub fn is_synced(&self) -> bool {
        self.last_retrieved.is_some()
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub seed_login: String,
    pub max_depth: u32,
    pub force_refresh: bool,
    pub config_hash: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
