//! UserSyncer behavior: etags, pagination, forced refresh and resumption

use crate::common::{accounts_body, fetcher, memory_store, mount_profile, profile_body, syncer};
use chrono::{TimeZone, Utc};
use follow_graph::crawler::{Clock, SimulatedClock, SyncOutcome, UserSyncer};
use follow_graph::storage::{lock_store, GraphStore, SharedStore, SqliteStorage};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn follower_logins(store: &SharedStore<SqliteStorage>, user_id: i64) -> BTreeSet<String> {
    lock_store(store)
        .unwrap()
        .followers_of(user_id)
        .unwrap()
        .into_iter()
        .map(|u| u.login)
        .collect()
}

fn logins(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_resolve_creates_synced_user() {
    let server = MockServer::start().await;
    mount_profile(&server, 1, "alice", 2, 3).await;

    let store = memory_store();
    let mut syncer = syncer(&server, &store);
    let user = syncer.resolve("alice", false).await.unwrap().unwrap();

    assert_eq!(user.github_id, 1);
    assert_eq!(user.num_followers, Some(2));
    assert_eq!(user.num_following, Some(3));
    assert_eq!(user.etag.as_deref(), Some("\"profile-alice\""));
    assert!(user.is_synced());

    let stored = lock_store(&store)
        .unwrap()
        .get_user_by_login("ALICE")
        .unwrap()
        .unwrap();
    assert_eq!(stored, user);
}

#[tokio::test]
async fn test_resolve_unknown_user() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = memory_store();
    let mut syncer = syncer(&server, &store);

    assert!(syncer.resolve("ghost", false).await.unwrap().is_none());
    assert_eq!(lock_store(&store).unwrap().count_users().unwrap(), 0);
}

#[tokio::test]
async fn test_profile_not_modified_only_touches_last_checked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/alice"))
        .and(header("if-none-match", "\"p1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/alice"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"p1\"")
                .set_body_json(profile_body(1, "alice", 0, 0)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = memory_store();
    let mut syncer = syncer(&server, &store);
    let mut user = syncer.resolve("alice", false).await.unwrap().unwrap();
    let retrieved = user.last_retrieved;

    let outcome = syncer.sync_profile(&mut user, false).await.unwrap();

    assert_eq!(outcome, SyncOutcome::NotModified);
    let stored = lock_store(&store).unwrap().get_user(user.id).unwrap();
    assert_eq!(stored.last_retrieved, retrieved);
    assert!(stored.last_checked >= retrieved);
    assert_eq!(stored.etag.as_deref(), Some("\"p1\""));
}

#[tokio::test]
async fn test_not_modified_stamps_clock_time() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/alice/followers"))
        .and(header("if-none-match", "\"f1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/alice/followers"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"f1\"")
                .set_body_json(accounts_body(&[(2, "bob")])),
        )
        .mount(&server)
        .await;
    mount_profile(&server, 1, "alice", 1, 0).await;

    let clock = Arc::new(SimulatedClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
    let store = memory_store();
    let mut syncer = UserSyncer::new(
        fetcher(&server, &store).with_clock(clock.clone()),
        store.clone(),
    );
    let mut user = syncer.resolve("alice", false).await.unwrap().unwrap();
    syncer.sync_followers(&mut user, false).await.unwrap();

    clock.advance(Duration::from_secs(3600));
    let outcome = syncer.sync_followers(&mut user, false).await.unwrap();

    assert_eq!(outcome, SyncOutcome::NotModified);
    assert_eq!(user.last_checked, Some(clock.now()));
    let stored = lock_store(&store).unwrap().get_user(user.id).unwrap();
    assert_eq!(stored.last_checked, user.last_checked);
    assert_eq!(stored.last_retrieved, Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
}

#[tokio::test]
async fn test_profile_failure_writes_nothing() {
    let server = MockServer::start().await;
    mount_profile(&server, 1, "alice", 1, 1).await;

    let store = memory_store();
    let mut syncer = syncer(&server, &store);
    let mut user = syncer.resolve("alice", false).await.unwrap().unwrap();
    let before = lock_store(&store).unwrap().get_user(user.id).unwrap();

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/users/alice"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let outcome = syncer.sync_profile(&mut user, true).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Failed);
    assert_eq!(lock_store(&store).unwrap().get_user(user.id).unwrap(), before);
}

#[tokio::test]
async fn test_sync_followers_twice_is_not_modified() {
    let server = MockServer::start().await;
    mount_profile(&server, 1, "alice", 2, 0).await;
    Mock::given(method("GET"))
        .and(path("/users/alice/followers"))
        .and(header("if-none-match", "\"f1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/alice/followers"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"f1\"")
                .set_body_json(accounts_body(&[(2, "bob"), (3, "carol")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = memory_store();
    let mut syncer = syncer(&server, &store);
    let mut user = syncer.resolve("alice", false).await.unwrap().unwrap();

    let first = syncer.sync_followers(&mut user, false).await.unwrap();
    let edges_after_first = lock_store(&store).unwrap().count_edges().unwrap();
    let second = syncer.sync_followers(&mut user, false).await.unwrap();

    assert_eq!(first, SyncOutcome::Updated { edges_added: 2 });
    assert_eq!(second, SyncOutcome::NotModified);
    assert_eq!(
        lock_store(&store).unwrap().count_edges().unwrap(),
        edges_after_first
    );
    assert_eq!(follower_logins(&store, user.id), logins(&["bob", "carol"]));
}

#[tokio::test]
async fn test_known_empty_listing_is_skipped() {
    let server = MockServer::start().await;
    mount_profile(&server, 1, "alice", 0, 0).await;
    Mock::given(method("GET"))
        .and(path("/users/alice/following"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(0)
        .mount(&server)
        .await;

    let store = memory_store();
    let mut syncer = syncer(&server, &store);
    let mut user = syncer.resolve("alice", false).await.unwrap().unwrap();

    let outcome = syncer.sync_following(&mut user, false).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Skipped);
}

#[tokio::test]
async fn test_pagination_collects_every_page() {
    let server = MockServer::start().await;
    mount_profile(&server, 1, "alice", 5, 0).await;
    let page = |n: u32| format!("{}/user/1/followers?per_page=2&page={}", server.uri(), n);

    Mock::given(method("GET"))
        .and(path("/users/alice/followers"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"page-one\"")
                .insert_header("Link", format!("<{}>; rel=\"next\"", page(2)).as_str())
                .set_body_json(accounts_body(&[(5, "eve"), (2, "bob")])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/1/followers"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", format!("<{}>; rel=\"next\"", page(3)).as_str())
                .set_body_json(accounts_body(&[(4, "dave"), (3, "carol")])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/1/followers"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(accounts_body(&[(6, "frank")])))
        .mount(&server)
        .await;

    let store = memory_store();
    let mut syncer = syncer(&server, &store);
    let mut user = syncer.resolve("alice", false).await.unwrap().unwrap();

    let outcome = syncer.sync_followers(&mut user, false).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Updated { edges_added: 5 });
    assert_eq!(
        follower_logins(&store, user.id),
        logins(&["bob", "carol", "dave", "eve", "frank"])
    );

    let stored = lock_store(&store).unwrap().get_user(user.id).unwrap();
    assert_eq!(stored.followers_etag.as_deref(), Some("\"page-one\""));
    assert!(stored.followers_cursor.is_none());
}

#[tokio::test]
async fn test_forced_refresh_drops_stale_edges() {
    let server = MockServer::start().await;
    mount_profile(&server, 1, "alice", 3, 0).await;
    Mock::given(method("GET"))
        .and(path("/users/alice/followers"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"before\"")
                .set_body_json(accounts_body(&[(2, "bob"), (3, "carol"), (4, "dave")])),
        )
        .mount(&server)
        .await;

    let store = memory_store();
    let mut syncer = syncer(&server, &store);
    let mut user = syncer.resolve("alice", false).await.unwrap().unwrap();
    syncer.sync_followers(&mut user, false).await.unwrap();
    assert_eq!(follower_logins(&store, user.id).len(), 3);

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/users/alice/followers"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"after\"")
                .set_body_json(accounts_body(&[(3, "carol")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let outcome = syncer.sync_followers(&mut user, true).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Updated { edges_added: 1 });
    assert_eq!(follower_logins(&store, user.id), logins(&["carol"]));
    // Accounts that dropped out keep their user records
    assert_eq!(lock_store(&store).unwrap().count_users().unwrap(), 4);
}

#[tokio::test]
async fn test_forced_refresh_ignores_stored_etag() {
    let server = MockServer::start().await;
    mount_profile(&server, 1, "alice", 1, 0).await;
    Mock::given(method("GET"))
        .and(path("/users/alice/followers"))
        .and(header("if-none-match", "\"f1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/alice/followers"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"f1\"")
                .set_body_json(accounts_body(&[(2, "bob")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = memory_store();
    let mut syncer = syncer(&server, &store);
    let mut user = syncer.resolve("alice", false).await.unwrap().unwrap();
    user.followers_etag = Some("\"f1\"".to_string());

    let outcome = syncer.sync_followers(&mut user, true).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Updated { edges_added: 1 });
}

#[tokio::test]
async fn test_interrupted_listing_resumes_from_cursor() {
    let server = MockServer::start().await;
    mount_profile(&server, 1, "alice", 4, 0).await;
    let page_two = format!("{}/user/1/followers?page=2", server.uri());

    Mock::given(method("GET"))
        .and(path("/users/alice/followers"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"listing\"")
                .insert_header("Link", format!("<{}>; rel=\"next\"", page_two).as_str())
                .set_body_json(accounts_body(&[(2, "bob"), (3, "carol")])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/1/followers"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/1/followers"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(accounts_body(&[(4, "dave"), (5, "eve")])))
        .expect(1)
        .mount(&server)
        .await;

    let store = memory_store();
    let mut syncer = syncer(&server, &store);
    let mut user = syncer.resolve("alice", false).await.unwrap().unwrap();

    let interrupted = syncer.sync_followers(&mut user, false).await.unwrap();
    assert_eq!(interrupted, SyncOutcome::Failed);

    let stored = lock_store(&store).unwrap().get_user(user.id).unwrap();
    assert_eq!(stored.followers_cursor.as_deref(), Some(page_two.as_str()));
    assert!(stored.followers_etag.is_none());
    assert_eq!(follower_logins(&store, user.id), logins(&["bob", "carol"]));

    let resumed = syncer.sync_followers(&mut user, false).await.unwrap();

    assert_eq!(resumed, SyncOutcome::Updated { edges_added: 2 });
    assert_eq!(
        follower_logins(&store, user.id),
        logins(&["bob", "carol", "dave", "eve"])
    );
    let stored = lock_store(&store).unwrap().get_user(user.id).unwrap();
    assert!(stored.followers_cursor.is_none());
    // page one of this listing was fetched in an earlier call
    assert!(stored.followers_etag.is_none());
}

#[tokio::test]
async fn test_unfinished_listing_is_refetched_after_cursor_reset() {
    let server = MockServer::start().await;
    let page_two = format!("{}/user/1/followers?page=2", server.uri());

    Mock::given(method("GET"))
        .and(path("/users/alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body(1, "alice", 3, 0)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body(1, "alice", 2, 0)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/alice/followers"))
        .and(header("if-none-match", "\"e1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/alice/followers"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"e1\"")
                .insert_header("Link", format!("<{}>; rel=\"next\"", page_two).as_str())
                .set_body_json(accounts_body(&[(2, "bob")])),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/1/followers"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/1/followers"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(accounts_body(&[(3, "carol"), (4, "dave")])),
        )
        .mount(&server)
        .await;

    let store = memory_store();
    let mut syncer = syncer(&server, &store);
    let mut user = syncer.resolve("alice", false).await.unwrap().unwrap();

    let first = syncer.sync_followers(&mut user, false).await.unwrap();
    assert_eq!(first, SyncOutcome::Failed);
    let stored = lock_store(&store).unwrap().get_user(user.id).unwrap();
    assert!(stored.followers_etag.is_none());
    assert_eq!(stored.followers_cursor.as_deref(), Some(page_two.as_str()));

    // the follower count moved, which drops the cursor
    syncer.sync_profile(&mut user, false).await.unwrap();
    assert!(user.followers_cursor.is_none());

    let second = syncer.sync_followers(&mut user, false).await.unwrap();

    assert_eq!(second, SyncOutcome::Updated { edges_added: 2 });
    assert_eq!(follower_logins(&store, user.id), logins(&["bob", "carol", "dave"]));
    let stored = lock_store(&store).unwrap().get_user(user.id).unwrap();
    assert_eq!(stored.followers_etag.as_deref(), Some("\"e1\""));
    assert!(stored.followers_cursor.is_none());
}

#[tokio::test]
async fn test_following_edges_point_outward() {
    let server = MockServer::start().await;
    mount_profile(&server, 1, "alice", 0, 1).await;
    Mock::given(method("GET"))
        .and(path("/users/alice/following"))
        .respond_with(ResponseTemplate::new(200).set_body_json(accounts_body(&[(2, "bob")])))
        .mount(&server)
        .await;

    let store = memory_store();
    let mut syncer = syncer(&server, &store);
    let mut user = syncer.resolve("alice", false).await.unwrap().unwrap();
    syncer.sync_following(&mut user, false).await.unwrap();

    let guard = lock_store(&store).unwrap();
    let followed: Vec<String> = guard
        .following_of(user.id)
        .unwrap()
        .into_iter()
        .map(|u| u.login)
        .collect();
    assert_eq!(followed, vec!["bob"]);
    assert!(guard.followers_of(user.id).unwrap().is_empty());
}
