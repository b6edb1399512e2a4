//! Hop-distance queries over stored follow edges
//!
//! A hop is one edge in either direction. Frontiers are sets at every step,
//! so a node reachable along paths of different lengths appears at each of
//! those distances, and cycles never blow up the result.

use crate::storage::{GraphStore, StorageError, UserRecord};
use crate::GraphError;
use std::collections::BTreeSet;

/// Reachability queries over the edges already in a store
///
/// Nothing here touches the network.
pub struct DistanceQueryEngine<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: GraphStore + ?Sized> DistanceQueryEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Looks up the root account of a query
    pub fn root(&self, login: &str) -> Result<UserRecord, GraphError> {
        self.store
            .get_user_by_login(login)?
            .ok_or_else(|| StorageError::UserNotFound(login.to_string()).into())
    }

    /// Users reachable from `login` in exactly `distance` hops
    ///
    /// Distance 0 is the root itself. Evaluated by the store's recursive
    /// query.
    pub fn users_at_distance(
        &self,
        login: &str,
        distance: u32,
    ) -> Result<Vec<UserRecord>, GraphError> {
        let root = self.root(login)?;
        Ok(self.store.users_at_exact_distance(root.id, distance)?)
    }

    /// Users reachable from `login` in 1 to `max_distance` hops
    ///
    /// The root is never part of the result, even when a cycle leads back to
    /// it.
    pub fn users_within_distance(
        &self,
        login: &str,
        max_distance: u32,
    ) -> Result<Vec<UserRecord>, GraphError> {
        let root = self.root(login)?;
        let ids: Vec<i64> = self
            .ids_within_distance(root.id, max_distance)?
            .into_iter()
            .collect();
        Ok(self.store.get_users(&ids)?)
    }

    /// Frontier at exactly `distance` hops, expanded step by step
    pub fn ids_at_distance(&self, root_id: i64, distance: u32) -> Result<BTreeSet<i64>, GraphError> {
        let mut frontier = BTreeSet::from([root_id]);
        for _ in 0..distance {
            frontier = self.expand(&frontier)?;
            if frontier.is_empty() {
                break;
            }
        }
        Ok(frontier)
    }

    /// Union of the frontiers at 1 to `max_distance` hops, minus the root
    pub fn ids_within_distance(
        &self,
        root_id: i64,
        max_distance: u32,
    ) -> Result<BTreeSet<i64>, GraphError> {
        let mut reached = BTreeSet::new();
        let mut frontier = BTreeSet::from([root_id]);

        for _ in 0..max_distance {
            frontier = self.expand(&frontier)?;
            if frontier.is_empty() {
                break;
            }
            reached.extend(frontier.iter().copied());
        }

        reached.remove(&root_id);
        Ok(reached)
    }

    fn expand(&self, frontier: &BTreeSet<i64>) -> Result<BTreeSet<i64>, GraphError> {
        let mut next = BTreeSet::new();
        for id in frontier {
            next.extend(self.store.neighbor_ids(*id)?);
        }
        Ok(next)
    }
}
