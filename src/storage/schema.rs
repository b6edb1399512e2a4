//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the follow-graph database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    seed_login TEXT NOT NULL,
    max_depth INTEGER NOT NULL,
    force_refresh INTEGER NOT NULL DEFAULT 0,
    config_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL
);

-- GitHub accounts; logins are case-insensitive upstream
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    github_id INTEGER NOT NULL UNIQUE,
    login TEXT NOT NULL UNIQUE COLLATE NOCASE,
    name TEXT,
    company TEXT,
    location TEXT,
    etag TEXT,
    last_retrieved TEXT,
    last_checked TEXT,
    num_followers INTEGER,
    followers_etag TEXT,
    followers_cursor TEXT,
    num_following INTEGER,
    following_etag TEXT,
    following_cursor TEXT,
    created_at TEXT NOT NULL
);

-- follower_id follows followee_id
CREATE TABLE IF NOT EXISTS follows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    follower_id INTEGER NOT NULL REFERENCES users(id),
    followee_id INTEGER NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL,
    UNIQUE(follower_id, followee_id)
);

CREATE INDEX IF NOT EXISTS idx_follows_follower ON follows(follower_id);
CREATE INDEX IF NOT EXISTS idx_follows_followee ON follows(followee_id);

-- Small persisted cache (rate-limit state)
CREATE TABLE IF NOT EXISTS kv_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Users exactly ?2 hops from ?1 along follows edges in either direction.
///
/// `UNION` drops duplicate (id, hop) rows, which keeps every frontier a set and
/// bounds the recursion on cyclic graphs.
pub const USERS_AT_DISTANCE_SQL: &str = "\
WITH RECURSIVE frontier(id, hop) AS (
    SELECT ?1, 0

    UNION

    SELECT CASE WHEN f.follower_id = fr.id THEN f.followee_id ELSE f.follower_id END,
           fr.hop + 1
    FROM frontier fr
    JOIN follows f ON f.follower_id = fr.id OR f.followee_id = fr.id
    WHERE fr.hop < ?2
)
SELECT DISTINCT id FROM frontier WHERE hop = ?2 ORDER BY id";

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
