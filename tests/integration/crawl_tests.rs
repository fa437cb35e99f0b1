//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for both the Web API and the
//! community comment endpoint and run full crawls end-to-end.

use steam_sentinel::config::{
    Config, CrawlerConfig, FilterConfig, OutputConfig, RetryConfig, SteamConfig, TargetsConfig,
};
use steam_sentinel::crawler::Crawler;
use steam_sentinel::state::ShutdownReason;
use steam_sentinel::storage::{SqliteStorage, Storage};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEED: &str = "76561198000000001";
const AUTHOR: &str = "76561198000000002";
const BYSTANDER: &str = "76561198000000003";
const FRIEND: &str = "76561198000000004";
const OTHER_FRIEND: &str = "76561198000000005";

/// Creates a test configuration pointing every endpoint at the mock server
fn create_test_config(base_url: &str, db_path: &str, max_profiles: u64) -> Config {
    Config {
        crawler: CrawlerConfig {
            max_concurrent_requests: 3,
            requests_per_second: 1000.0,
            burst_capacity: 10,
            max_profiles_to_process: max_profiles,
            max_processing_time_minutes: 0,
            queue_timeout_secs: 1,
            comment_page_size: 50,
        },
        retry: RetryConfig {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
            backoff_factor: 2.0,
        },
        steam: SteamConfig {
            api_key: "TESTKEY".to_string(),
            api_base: base_url.to_string(),
            community_base: base_url.to_string(),
            resolve_cache_ttl_secs: 3600,
            request_timeout_secs: 5,
            connect_timeout_secs: 5,
            max_connections_per_host: 4,
        },
        filter: FilterConfig {
            terms: vec!["forbidden".to_string()],
            patterns: vec![],
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        targets: TargetsConfig::default(),
    }
}

fn comment(author_id: &str, name: &str, text: &str) -> String {
    format!(
        r#"<div class="commentthread_comment responsive_body_text">
            <div class="commentthread_comment_content">
                <div class="commentthread_comment_author">
                    <a class="hoverunderline commentthread_author_link" href="https://steamcommunity.com/profiles/{author_id}"><bdi>{name}</bdi></a>
                    <span class="commentthread_comment_timestamp" data-timestamp="1753563562">Jul 26 @ 1:59pm</span>
                </div>
                <div class="commentthread_comment_text">{text}</div>
            </div>
        </div>"#
    )
}

fn comment_body(html: &str, total: usize) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "success": true,
        "total_count": total,
        "comments_html": html,
    }))
}

fn friends_body(ids: &[&str]) -> ResponseTemplate {
    let friends: Vec<_> = ids
        .iter()
        .map(|id| serde_json::json!({"steamid": id, "relationship": "friend", "friend_since": 0}))
        .collect();
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "friendslist": {"friends": friends}
    }))
}

async fn mount_comments(server: &MockServer, node_id: &str, html: &str, total: usize) {
    Mock::given(method("POST"))
        .and(path(format!("/comment/Profile/render/{}/-1/", node_id)))
        .respond_with(comment_body(html, total))
        .mount(server)
        .await;
}

async fn mount_friends(server: &MockServer, node_id: &str, ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/ISteamUser/GetFriendList/v0001/"))
        .and(query_param("steamid", node_id))
        .respond_with(friends_body(ids))
        .mount(server)
        .await;
}

/// Every profile not mounted explicitly has no comments and no friends
async fn mount_empty_defaults(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/comment/Profile/render/\d+/-1/$"))
        .respond_with(comment_body("", 0))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/ISteamUser/GetFriendList/v0001/"))
        .respond_with(friends_body(&[]))
        .mount(server)
        .await;
}

fn open_db(db_path: &str) -> SqliteStorage {
    SqliteStorage::new(Path::new(db_path)).expect("Failed to open database")
}

fn db_path(temp_dir: &TempDir) -> String {
    temp_dir
        .path()
        .join("sentinel.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::test]
async fn test_full_crawl_flags_and_follows_authors() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = db_path(&temp_dir);

    let html = format!(
        "{}{}",
        comment(AUTHOR, "Villain", "this is FORBIDDEN talk"),
        comment(BYSTANDER, "Bystander", "nice profile")
    );
    mount_comments(&server, SEED, &html, 2).await;
    mount_friends(&server, SEED, &[FRIEND]).await;
    mount_empty_defaults(&server).await;

    let crawler = Crawler::from_config(create_test_config(&server.uri(), &db_path, 0))
        .expect("Failed to build crawler");
    let summary = crawler.crawl(SEED).await.expect("Crawl failed");

    assert!(summary.completed_normally());
    assert_eq!(summary.seed_id, SEED);
    assert_eq!(summary.exit_reason(), "queue cleared");
    // Seed, flagged author and friend; the bystander is never followed
    assert_eq!(summary.processed_count, 3);
    assert_eq!(summary.flagged_count, 1);
    assert_eq!(summary.unprocessed_saved, 0);

    let storage = open_db(&db_path);
    assert_eq!(storage.count_flagged_items().unwrap(), 1);

    let items = storage.get_flagged_items_for_actor(AUTHOR).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].actor_alias, "Villain");
    assert_eq!(items[0].subject_node_id, SEED);
    assert_eq!(items[0].content_text, "this is FORBIDDEN talk");
    assert!(items[0].content_timestamp.is_some());
    assert_eq!(items[0].discovery_path, SEED);

    let actor = storage.get_actor(AUTHOR).unwrap();
    assert_eq!(actor.aliases, "Villain");
    assert!(storage.get_actor(BYSTANDER).is_err());
    assert_eq!(storage.count_unprocessed().unwrap(), 0);
}

#[tokio::test]
async fn test_vanity_seed_is_resolved() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = db_path(&temp_dir);

    Mock::given(method("GET"))
        .and(path("/ISteamUser/ResolveVanityURL/v0001/"))
        .and(query_param("vanityurl", "seedling"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": {"steamid": SEED, "success": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_empty_defaults(&server).await;

    let crawler = Crawler::from_config(create_test_config(&server.uri(), &db_path, 0))
        .expect("Failed to build crawler");

    let summary = crawler
        .crawl("https://steamcommunity.com/id/seedling/")
        .await
        .expect("Crawl failed");
    assert_eq!(summary.seed_id, SEED);
    assert_eq!(summary.processed_count, 1);

    // Second run is served from the resolution cache
    let summary = crawler.crawl("seedling").await.expect("Crawl failed");
    assert_eq!(summary.seed_id, SEED);
}

#[tokio::test]
async fn test_unresolvable_seed_is_fatal() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = db_path(&temp_dir);

    Mock::given(method("GET"))
        .and(path("/ISteamUser/ResolveVanityURL/v0001/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": {"success": 42, "message": "No match"}
        })))
        .mount(&server)
        .await;

    let crawler = Crawler::from_config(create_test_config(&server.uri(), &db_path, 0))
        .expect("Failed to build crawler");

    assert!(crawler.crawl("nobody_here").await.is_err());
    assert_eq!(open_db(&db_path).count_flagged_items().unwrap(), 0);
}

#[tokio::test]
async fn test_profile_limit_saves_frontier() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = db_path(&temp_dir);

    mount_friends(&server, SEED, &[FRIEND, OTHER_FRIEND]).await;
    mount_empty_defaults(&server).await;

    let crawler = Crawler::from_config(create_test_config(&server.uri(), &db_path, 1))
        .expect("Failed to build crawler");
    let summary = crawler.crawl(SEED).await.expect("Crawl failed");

    assert_eq!(summary.shutdown_reason, Some(ShutdownReason::ProfileLimit));
    assert_eq!(summary.exit_reason(), "profile threshold reached");
    assert_eq!(summary.processed_count, 1);
    assert_eq!(summary.unprocessed_saved, 2);

    let storage = open_db(&db_path);
    assert_eq!(storage.count_unprocessed().unwrap(), 2);
    assert_eq!(
        storage.latest_shutdown_reason().unwrap(),
        Some(ShutdownReason::ProfileLimit)
    );

    let mut saved: Vec<_> = storage
        .list_unprocessed(10)
        .unwrap()
        .into_iter()
        .map(|r| (r.node_id, r.depth, r.discovery_path))
        .collect();
    saved.sort();
    assert_eq!(
        saved,
        vec![
            (FRIEND.to_string(), 1, format!("{} -> {}", SEED, FRIEND)),
            (
                OTHER_FRIEND.to_string(),
                1,
                format!("{} -> {}", SEED, OTHER_FRIEND)
            ),
        ]
    );
}

#[tokio::test]
async fn test_transient_server_error_is_retried() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = db_path(&temp_dir);

    Mock::given(method("POST"))
        .and(path(format!("/comment/Profile/render/{}/-1/", SEED)))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_comments(
        &server,
        SEED,
        &comment(AUTHOR, "Villain", "forbidden words"),
        1,
    )
    .await;
    mount_empty_defaults(&server).await;

    let crawler = Crawler::from_config(create_test_config(&server.uri(), &db_path, 0))
        .expect("Failed to build crawler");
    let summary = crawler.crawl(SEED).await.expect("Crawl failed");

    assert!(summary.completed_normally());
    assert_eq!(summary.flagged_count, 1);
    assert_eq!(summary.processed_count, 2);
}

#[tokio::test]
async fn test_recrawl_does_not_duplicate_flags() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = db_path(&temp_dir);

    mount_comments(
        &server,
        SEED,
        &comment(AUTHOR, "Villain", "forbidden words"),
        1,
    )
    .await;
    mount_empty_defaults(&server).await;

    let crawler = Crawler::from_config(create_test_config(&server.uri(), &db_path, 0))
        .expect("Failed to build crawler");

    let first = crawler.crawl(SEED).await.expect("First crawl failed");
    assert_eq!(first.flagged_count, 1);

    let second = crawler.crawl(SEED).await.expect("Second crawl failed");
    assert_eq!(second.flagged_count, 0);
    // The write succeeded (as a no-op), so the author is still followed
    assert_eq!(second.processed_count, 2);

    assert_eq!(open_db(&db_path).count_flagged_items().unwrap(), 1);
}
