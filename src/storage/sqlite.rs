//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the GraphStore trait.

use crate::state::RateLimitState;
use crate::storage::schema::{initialize_schema, USERS_AT_DISTANCE_SQL};
use crate::storage::traits::{GraphStore, RateLimitCache, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, UserRecord};
use crate::GraphError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const USER_COLUMNS: &str = "id, github_id, login, name, company, location, etag,
    last_retrieved, last_checked, num_followers, followers_etag, followers_cursor,
    num_following, following_etag, following_cursor";

const RUN_COLUMNS: &str =
    "id, seed_login, max_depth, force_refresh, config_hash, started_at, finished_at, status";

const RATE_LIMIT_KEY: &str = "rate_limit.limit";
const RATE_REMAINING_KEY: &str = "rate_limit.remaining";
const RATE_RESET_KEY: &str = "rate_limit.reset";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(GraphError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, GraphError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, GraphError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Reads a value from the key/value cache
    pub fn cache_get(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_cache WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Writes a value to the key/value cache
    pub fn cache_set(&mut self, key: &str, value: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO kv_cache (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn query_users(&self, sql: &str, user_id: i64) -> StorageResult<Vec<UserRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let users = stmt
            .query_map(params![user_id], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|s| s.parse::<DateTime<Utc>>().ok())
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        github_id: row.get(1)?,
        login: row.get(2)?,
        name: row.get(3)?,
        company: row.get(4)?,
        location: row.get(5)?,
        etag: row.get(6)?,
        last_retrieved: parse_timestamp(row.get(7)?),
        last_checked: parse_timestamp(row.get(8)?),
        num_followers: row.get(9)?,
        followers_etag: row.get(10)?,
        followers_cursor: row.get(11)?,
        num_following: row.get(12)?,
        following_etag: row.get(13)?,
        following_cursor: row.get(14)?,
    })
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        seed_login: row.get(1)?,
        max_depth: row.get(2)?,
        force_refresh: row.get::<_, i64>(3)? != 0,
        config_hash: row.get(4)?,
        started_at: row.get(5)?,
        finished_at: row.get(6)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(7)?)
            .unwrap_or(RunStatus::Failed),
    })
}

impl RateLimitCache for SqliteStorage {
    fn load_rate_limit(&self) -> StorageResult<Option<RateLimitState>> {
        let limit = self.cache_get(RATE_LIMIT_KEY)?.and_then(|v| v.parse().ok());
        let remaining = self
            .cache_get(RATE_REMAINING_KEY)?
            .and_then(|v| v.parse().ok());
        let reset = self.cache_get(RATE_RESET_KEY)?.and_then(|v| v.parse().ok());

        match (limit, remaining, reset) {
            (Some(limit), Some(remaining), Some(reset)) => {
                Ok(Some(RateLimitState::new(limit, remaining, reset)))
            }
            _ => Ok(None),
        }
    }

    fn save_rate_limit(&mut self, state: &RateLimitState) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        for (key, value) in [
            (RATE_LIMIT_KEY, state.limit.to_string()),
            (RATE_REMAINING_KEY, state.remaining.to_string()),
            (RATE_RESET_KEY, state.reset_at.to_string()),
        ] {
            tx.execute(
                "INSERT INTO kv_cache (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl GraphStore for SqliteStorage {
    // ===== Users =====

    fn get_or_create_user(&mut self, github_id: i64, login: &str) -> StorageResult<UserRecord> {
        let existing = self
            .conn
            .query_row(
                &format!("SELECT {} FROM users WHERE github_id = ?1", USER_COLUMNS),
                params![github_id],
                row_to_user,
            )
            .optional()?;

        if let Some(user) = existing {
            return Ok(user);
        }

        if let Some(other) = self.get_user_by_login(login)? {
            return Err(StorageError::ConstraintViolation(format!(
                "login '{}' already belongs to github id {}",
                login, other.github_id
            )));
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (github_id, login, created_at) VALUES (?1, ?2, ?3)",
            params![github_id, login, now],
        )?;

        self.get_user(self.conn.last_insert_rowid())
    }

    fn get_user(&self, user_id: i64) -> StorageResult<UserRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![user_id],
                row_to_user,
            )
            .optional()?
            .ok_or_else(|| StorageError::UserNotFound(format!("User ID {}", user_id)))
    }

    fn get_user_by_login(&self, login: &str) -> StorageResult<Option<UserRecord>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {} FROM users WHERE login = ?1", USER_COLUMNS),
                params![login],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn get_users(&self, user_ids: &[i64]) -> StorageResult<Vec<UserRecord>> {
        user_ids.iter().map(|id| self.get_user(*id)).collect()
    }

    fn save_user(&mut self, user: &UserRecord) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE users SET github_id = ?1, login = ?2, name = ?3, company = ?4, location = ?5,
             etag = ?6, last_retrieved = ?7, last_checked = ?8,
             num_followers = ?9, followers_etag = ?10, followers_cursor = ?11,
             num_following = ?12, following_etag = ?13, following_cursor = ?14
             WHERE id = ?15",
            params![
                user.github_id,
                user.login,
                user.name,
                user.company,
                user.location,
                user.etag,
                user.last_retrieved.map(|t| t.to_rfc3339()),
                user.last_checked.map(|t| t.to_rfc3339()),
                user.num_followers,
                user.followers_etag,
                user.followers_cursor,
                user.num_following,
                user.following_etag,
                user.following_cursor,
                user.id,
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::UserNotFound(format!("User ID {}", user.id)));
        }
        Ok(())
    }

    fn touch_user_checked(&mut self, user_id: i64, checked_at: DateTime<Utc>) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE users SET last_checked = ?1 WHERE id = ?2",
            params![checked_at.to_rfc3339(), user_id],
        )?;
        Ok(())
    }

    // ===== Edges =====

    fn add_edge(&mut self, follower_id: i64, followee_id: i64) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO follows (follower_id, followee_id, created_at) VALUES (?1, ?2, ?3)",
            params![follower_id, followee_id, now],
        )?;
        Ok(inserted > 0)
    }

    fn clear_outgoing(&mut self, user_id: i64) -> StorageResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM follows WHERE follower_id = ?1", params![user_id])?;
        Ok(removed)
    }

    fn clear_incoming(&mut self, user_id: i64) -> StorageResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM follows WHERE followee_id = ?1", params![user_id])?;
        Ok(removed)
    }

    fn followers_of(&self, user_id: i64) -> StorageResult<Vec<UserRecord>> {
        self.query_users(
            &format!(
                "SELECT {} FROM users WHERE id IN
                 (SELECT follower_id FROM follows WHERE followee_id = ?1)
                 ORDER BY id",
                USER_COLUMNS
            ),
            user_id,
        )
    }

    fn following_of(&self, user_id: i64) -> StorageResult<Vec<UserRecord>> {
        self.query_users(
            &format!(
                "SELECT {} FROM users WHERE id IN
                 (SELECT followee_id FROM follows WHERE follower_id = ?1)
                 ORDER BY id",
                USER_COLUMNS
            ),
            user_id,
        )
    }

    fn neighbor_ids(&self, user_id: i64) -> StorageResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT followee_id FROM follows WHERE follower_id = ?1
             UNION
             SELECT follower_id FROM follows WHERE followee_id = ?1",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    // ===== Distance =====

    fn users_at_exact_distance(
        &self,
        root_id: i64,
        distance: u32,
    ) -> StorageResult<Vec<UserRecord>> {
        let mut stmt = self.conn.prepare(USERS_AT_DISTANCE_SQL)?;
        let ids = stmt
            .query_map(params![root_id, distance], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        self.get_users(&ids)
    }

    // ===== Run Management =====

    fn create_run(
        &mut self,
        seed_login: &str,
        max_depth: u32,
        force_refresh: bool,
        config_hash: &str,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (seed_login, max_depth, force_refresh, config_hash, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                seed_login,
                max_depth,
                force_refresh as i64,
                config_hash,
                now,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                row_to_run,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Statistics =====

    fn count_users(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM users")
    }

    fn count_synced_users(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM users WHERE last_retrieved IS NOT NULL")
    }

    fn count_edges(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM follows")
    }
}
