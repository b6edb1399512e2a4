//! Integration tests for follow-graph
//!
//! These tests use wiremock to stand in for the GitHub API and exercise
//! fetching, syncing and crawling end-to-end against SQLite stores.

mod sync_tests;
