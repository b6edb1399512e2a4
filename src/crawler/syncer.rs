//! Per-user synchronization
//!
//! The syncer refreshes one user's profile and follower/following lists,
//! sending stored etags so unchanged data costs a single 304. Edge listings
//! are paginated; the page still to be consumed is kept in the user's cursor
//! so an interrupted listing resumes where it stopped.

use crate::crawler::fetcher::{Endpoint, FetchResult, Fetcher};
use crate::crawler::payload::{EdgePagePayload, ProfilePayload};
use crate::storage::{lock_store, GraphStore, SharedStore, StorageError, UserRecord};
use crate::GraphError;
use std::fmt;
use url::Url;

/// Which edge list of a user is being synced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Accounts following the user (incoming edges)
    Followers,
    /// Accounts the user follows (outgoing edges)
    Following,
}

impl Direction {
    fn endpoint(self, login: &str, per_page: u32) -> Endpoint {
        match self {
            Self::Followers => Endpoint::followers(login, per_page),
            Self::Following => Endpoint::following(login, per_page),
        }
    }

    fn count(self, user: &UserRecord) -> Option<u32> {
        match self {
            Self::Followers => user.num_followers,
            Self::Following => user.num_following,
        }
    }

    fn etag(self, user: &UserRecord) -> Option<&str> {
        match self {
            Self::Followers => user.followers_etag.as_deref(),
            Self::Following => user.following_etag.as_deref(),
        }
    }

    fn cursor(self, user: &UserRecord) -> Option<&str> {
        match self {
            Self::Followers => user.followers_cursor.as_deref(),
            Self::Following => user.following_cursor.as_deref(),
        }
    }

    fn set_etag(self, user: &mut UserRecord, etag: Option<String>) {
        match self {
            Self::Followers => user.followers_etag = etag,
            Self::Following => user.following_etag = etag,
        }
    }

    fn set_cursor(self, user: &mut UserRecord, cursor: Option<String>) {
        match self {
            Self::Followers => user.followers_cursor = cursor,
            Self::Following => user.following_cursor = cursor,
        }
    }

    /// Orients an edge between the user and a listed account as
    /// `(follower, followee)`
    fn edge(self, user_id: i64, other_id: i64) -> (i64, i64) {
        match self {
            Self::Followers => (other_id, user_id),
            Self::Following => (user_id, other_id),
        }
    }

    fn clear<S: GraphStore + ?Sized>(self, store: &mut S, user_id: i64) -> Result<usize, StorageError> {
        match self {
            Self::Followers => store.clear_incoming(user_id),
            Self::Following => store.clear_outgoing(user_id),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Followers => write!(f, "followers"),
            Self::Following => write!(f, "following"),
        }
    }
}

/// What a sync call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Fresh data was stored
    Updated { edges_added: usize },
    /// The stored etag still matched; only `last_checked` moved
    NotModified,
    /// Nothing to fetch (known-empty edge list)
    Skipped,
    /// The account no longer exists upstream
    NotFound,
    /// Transient failure; nothing (or only completed pages) was stored
    Failed,
}

impl SyncOutcome {
    pub fn edges_added(&self) -> usize {
        match self {
            Self::Updated { edges_added } => *edges_added,
            _ => 0,
        }
    }
}

/// Synchronizes single users against the remote API
pub struct UserSyncer<S> {
    fetcher: Fetcher<S>,
    store: SharedStore<S>,
}

impl<S: GraphStore> UserSyncer<S> {
    pub fn new(fetcher: Fetcher<S>, store: SharedStore<S>) -> Self {
        Self { fetcher, store }
    }

    pub fn fetcher(&self) -> &Fetcher<S> {
        &self.fetcher
    }

    pub fn fetcher_mut(&mut self) -> &mut Fetcher<S> {
        &mut self.fetcher
    }

    pub fn store(&self) -> &SharedStore<S> {
        &self.store
    }

    /// Finds a user by login, fetching the profile if it is not stored yet
    ///
    /// A known user has its profile refreshed; failure to refresh is logged
    /// and the stored record returned as is.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(user))` - The user, refreshed when possible
    /// * `Ok(None)` - Unknown locally and could not be fetched
    /// * `Err(GraphError)` - Fatal local failure or cancellation
    pub async fn resolve(
        &mut self,
        login: &str,
        force_refresh: bool,
    ) -> Result<Option<UserRecord>, GraphError> {
        let known = lock_store(&self.store)?.get_user_by_login(login)?;

        if let Some(mut user) = known {
            match self.sync_profile(&mut user, force_refresh).await? {
                SyncOutcome::NotFound | SyncOutcome::Failed => {
                    tracing::warn!("Could not refresh profile of {}, using stored record", login);
                }
                _ => {}
            }
            return Ok(Some(user));
        }

        let (body, etag) = match self.fetcher.fetch(&Endpoint::profile(login), None).await? {
            FetchResult::Ok { body, etag, .. } => (body, etag),
            FetchResult::NotFound => {
                tracing::warn!("User {} does not exist", login);
                return Ok(None);
            }
            other => {
                tracing::warn!("Could not fetch profile of {}: {:?}", login, other);
                return Ok(None);
            }
        };

        let profile = match ProfilePayload::decode(&body) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!("Unreadable profile payload for {}: {}", login, e);
                return Ok(None);
            }
        };

        let now = self.fetcher.now();
        let mut store = lock_store(&self.store)?;
        let mut user = match store.get_or_create_user(profile.id, &profile.login) {
            Ok(user) => user,
            Err(StorageError::ConstraintViolation(msg)) => {
                tracing::warn!("Cannot record {}: {}", login, msg);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        apply_profile(&*store, &mut user, profile, etag, now)?;
        store.save_user(&user)?;

        tracing::info!("Resolved {} (github id {})", user.login, user.github_id);
        Ok(Some(user))
    }

    /// Refreshes a user's profile
    ///
    /// On fresh data every profile field is overwritten and both timestamps
    /// advance. On 304 only `last_checked` moves. Otherwise nothing is
    /// written.
    pub async fn sync_profile(
        &mut self,
        user: &mut UserRecord,
        force_refresh: bool,
    ) -> Result<SyncOutcome, GraphError> {
        let etag = if force_refresh { None } else { user.etag.clone() };
        let result = self
            .fetcher
            .fetch(&Endpoint::profile(&user.login), etag.as_deref())
            .await?;

        match result {
            FetchResult::Ok { body, etag, .. } => {
                let profile = match ProfilePayload::decode(&body) {
                    Ok(profile) => profile,
                    Err(e) => {
                        tracing::warn!("Unreadable profile payload for {}: {}", user.login, e);
                        return Ok(SyncOutcome::Failed);
                    }
                };

                let now = self.fetcher.now();
                let mut store = lock_store(&self.store)?;
                apply_profile(&*store, user, profile, etag, now)?;
                store.save_user(user)?;
                tracing::debug!("Profile of {} updated", user.login);
                Ok(SyncOutcome::Updated { edges_added: 0 })
            }
            FetchResult::NotModified => {
                let now = self.fetcher.now();
                lock_store(&self.store)?.touch_user_checked(user.id, now)?;
                user.last_checked = Some(now);
                tracing::debug!("Profile of {} unchanged", user.login);
                Ok(SyncOutcome::NotModified)
            }
            FetchResult::NotFound => {
                tracing::warn!("Profile of {} not found", user.login);
                Ok(SyncOutcome::NotFound)
            }
            FetchResult::Error { .. } => Ok(SyncOutcome::Failed),
        }
    }

    /// Syncs the accounts following the user
    pub async fn sync_followers(
        &mut self,
        user: &mut UserRecord,
        force_refresh: bool,
    ) -> Result<SyncOutcome, GraphError> {
        self.sync_edges(user, Direction::Followers, force_refresh)
            .await
    }

    /// Syncs the accounts the user follows
    pub async fn sync_following(
        &mut self,
        user: &mut UserRecord,
        force_refresh: bool,
    ) -> Result<SyncOutcome, GraphError> {
        self.sync_edges(user, Direction::Following, force_refresh)
            .await
    }

    /// Consumes an edge listing page by page
    ///
    /// # Process
    ///
    /// 1. A known-empty list is skipped unless forced
    /// 2. A stored cursor (unforced) resumes the listing unconditionally
    /// 3. Otherwise page one is requested with the stored etag
    /// 4. On a forced refresh the first fresh page clears the existing edges
    ///    in this direction
    /// 5. Every page adds its edges and moves the cursor, so a failure
    ///    mid-listing leaves the cursor pointing at the missing page
    /// 6. The etag of page one is stored only once the last page of a new
    ///    listing is in; an unfinished listing has no etag
    async fn sync_edges(
        &mut self,
        user: &mut UserRecord,
        direction: Direction,
        force_refresh: bool,
    ) -> Result<SyncOutcome, GraphError> {
        if !force_refresh && direction.count(user) == Some(0) {
            tracing::debug!("{} of {} known empty, skipping", direction, user.login);
            return Ok(SyncOutcome::Skipped);
        }

        let resume_from = if force_refresh {
            None
        } else {
            direction.cursor(user).and_then(|c| Url::parse(c).ok())
        };
        let resuming = resume_from.is_some();

        let (mut endpoint, mut etag) = match resume_from {
            Some(url) => {
                tracing::info!("Resuming {} of {} from {}", direction, user.login, url);
                (Endpoint::Url(url), None)
            }
            None => {
                let etag = if force_refresh {
                    None
                } else {
                    direction.etag(user).map(str::to_string)
                };
                (
                    direction.endpoint(&user.login, self.fetcher.per_page()),
                    etag,
                )
            }
        };

        let mut first_page = true;
        let mut listing_etag = None;
        let mut edges_added = 0;

        loop {
            let result = self.fetcher.fetch(&endpoint, etag.take().as_deref()).await?;

            let (body, new_etag, next_page) = match result {
                FetchResult::Ok {
                    body,
                    etag,
                    next_page,
                } => (body, etag, next_page),
                FetchResult::NotModified if first_page => {
                    let now = self.fetcher.now();
                    lock_store(&self.store)?.touch_user_checked(user.id, now)?;
                    user.last_checked = Some(now);
                    tracing::debug!("{} of {} unchanged", direction, user.login);
                    return Ok(SyncOutcome::NotModified);
                }
                FetchResult::NotModified => {
                    tracing::warn!("Unexpected 304 mid-listing of {} for {}", direction, user.login);
                    return Ok(SyncOutcome::Failed);
                }
                FetchResult::NotFound => {
                    tracing::warn!("{} of {} not found", direction, user.login);
                    return Ok(SyncOutcome::NotFound);
                }
                FetchResult::Error { .. } => {
                    tracing::warn!(
                        "{} of {} interrupted after {} new edges",
                        direction,
                        user.login,
                        edges_added
                    );
                    return Ok(SyncOutcome::Failed);
                }
            };

            let page = match EdgePagePayload::decode(&body, next_page) {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!("Unreadable {} page for {}: {}", direction, user.login, e);
                    return Ok(SyncOutcome::Failed);
                }
            };

            let fresh_listing = first_page && !resuming;
            if fresh_listing {
                listing_etag = new_etag;
            }
            edges_added += self.store_page(user, direction, &page, fresh_listing && force_refresh)?;

            match page.next_page {
                Some(next) => {
                    endpoint = Endpoint::Url(next);
                    first_page = false;
                }
                None => break,
            }
        }

        if !resuming {
            direction.set_etag(user, listing_etag);
            lock_store(&self.store)?.save_user(user)?;
        }

        tracing::debug!(
            "{} of {} synced, {} new edges",
            direction,
            user.login,
            edges_added
        );
        Ok(SyncOutcome::Updated { edges_added })
    }

    /// Writes one listing page and advances the cursor
    ///
    /// The direction has no etag while a next page remains.
    fn store_page(
        &self,
        user: &mut UserRecord,
        direction: Direction,
        page: &EdgePagePayload,
        clear_existing: bool,
    ) -> Result<usize, GraphError> {
        let mut store = lock_store(&self.store)?;

        if clear_existing {
            let removed = direction.clear(&mut *store, user.id)?;
            tracing::debug!("Cleared {} {} edges of {}", removed, direction, user.login);
        }
        if page.next_page.is_some() {
            direction.set_etag(user, None);
        }

        let mut added = 0;
        for account in &page.accounts {
            let other = match store.get_or_create_user(account.id, &account.login) {
                Ok(other) => other,
                Err(StorageError::ConstraintViolation(msg)) => {
                    tracing::warn!("Skipping {}: {}", account.login, msg);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let (follower, followee) = direction.edge(user.id, other.id);
            if store.add_edge(follower, followee)? {
                added += 1;
            }
        }

        direction.set_cursor(user, page.next_page.as_ref().map(|url| url.to_string()));
        store.save_user(user)?;
        Ok(added)
    }
}

/// Copies a fetched profile onto the stored record
///
/// The GitHub id never changes. A login change is taken over unless another
/// stored account already holds that login. A changed edge count invalidates
/// that direction's resume cursor.
fn apply_profile<S: GraphStore + ?Sized>(
    store: &S,
    user: &mut UserRecord,
    profile: ProfilePayload,
    etag: Option<String>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), GraphError> {
    if profile.id != user.github_id {
        tracing::warn!(
            "Profile of {} reports github id {}, stored {}; keeping stored id",
            user.login,
            profile.id,
            user.github_id
        );
    }

    if profile.login != user.login {
        match store.get_user_by_login(&profile.login)? {
            Some(other) if other.id != user.id => {
                tracing::warn!(
                    "{} renamed to {}, which is held by another record; keeping old login",
                    user.login,
                    profile.login
                );
            }
            _ => user.login = profile.login,
        }
    }

    if user.num_followers != Some(profile.followers) {
        user.followers_cursor = None;
    }
    if user.num_following != Some(profile.following) {
        user.following_cursor = None;
    }

    user.name = profile.name;
    user.company = profile.company;
    user.location = profile.location;
    user.num_followers = Some(profile.followers);
    user.num_following = Some(profile.following);
    user.etag = etag;
    user.last_retrieved = Some(now);
    user.last_checked = Some(now);
    Ok(())
}
