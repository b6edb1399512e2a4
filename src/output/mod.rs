//! Output module for printing query results and graph statistics
//!
//! This module handles:
//! - Formatting user listings returned by distance queries
//! - Recording and displaying graph statistics

pub mod stats;

pub use stats::{load_statistics, print_statistics, GraphStatistics};

use crate::storage::UserRecord;

/// Formats users as an aligned table, one row per user
pub fn format_users(users: &[UserRecord]) -> String {
    let width = users
        .iter()
        .map(|u| u.login.len())
        .max()
        .unwrap_or(0)
        .max("LOGIN".len());

    let mut out = format!(
        "{:<width$}  {:>10}  {:>9}  {:>9}  NAME\n",
        "LOGIN",
        "GITHUB ID",
        "FOLLOWERS",
        "FOLLOWING",
        width = width
    );

    for user in users {
        out.push_str(&format!(
            "{:<width$}  {:>10}  {:>9}  {:>9}  {}\n",
            user.login,
            user.github_id,
            count(user.num_followers),
            count(user.num_following),
            user.name.as_deref().unwrap_or(""),
            width = width
        ));
    }

    out
}

/// Prints a user table followed by a total
pub fn print_users(users: &[UserRecord]) {
    print!("{}", format_users(users));
    println!("\n{} users", users.len());
}

fn count(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
