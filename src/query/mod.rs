//! Query module for hop-distance reachability over the stored graph
//!
//! This module handles:
//! - Exact-distance frontiers around a root account
//! - Within-distance neighborhoods, root excluded
//! - Ordering of result sets

mod distance;
mod order;

pub use distance::DistanceQueryEngine;
pub use order::{sort_users, UserOrder};
