//! HTTP endpoint integration tests.
//!
//! Each test starts a daemon on an ephemeral port with its own store
//! directory:
//! - `/tinyq/push`, `/pop`, `/ack`, `/count`, `/keys` - items
//! - `/tinyq/channels/*` - listing, pause and lock
//! - `/tinyq/stats`, `/databases`, `/crud/*` - statistics and key/value
//! - `/health`, `/metrics` - daemon endpoints

#[path = "common.rs"]
mod common;

use common::{TestHost, eventually};
use std::sync::Arc;
use tinyq::daemon::services::state::ChannelStats;
use tinyq::{Item, Payload};

async fn host() -> TestHost {
    TestHost::start().await.expect("Failed to start test host")
}

// =============================================================================
// Items
// =============================================================================

#[tokio::test]
async fn test_push_then_pop() {
    let host = host().await;

    assert_eq!(host.message("/tinyq/push?item=orders.1").await, "ok");
    assert_eq!(host.message("/tinyq/count?channel=orders").await, "1");
    assert_eq!(host.message("/tinyq/pop?channel=orders").await, "orders.1");
    assert_eq!(host.message("/tinyq/pop?channel=orders").await, "empty");
}

#[tokio::test]
async fn test_pop_unknown_channel_is_empty() {
    let host = host().await;
    assert_eq!(host.message("/tinyq/pop?channel=nothing").await, "empty");
}

#[tokio::test]
async fn test_pop_without_channel_is_bad_request() {
    let host = host().await;

    let resp = host.get("/tinyq/pop").await.unwrap();
    assert_eq!(resp.status(), 400);
    let envelope: tinyq::protocol::Envelope = resp.json().await.unwrap();
    assert!(envelope.is_error());
}

#[tokio::test]
async fn test_pop_many_in_key_order() {
    let host = host().await;
    for key in ["3", "1", "2", "4"] {
        host.message(&format!("/tinyq/push?item=jobs.{key}")).await;
    }

    let body = host.message("/tinyq/pop?channel=jobs&count=3").await;
    assert_eq!(body, "jobs.1\njobs.2\njobs.3");

    // Out-of-range counts are clamped, not rejected
    assert_eq!(host.message("/tinyq/pop?channel=jobs&count=-5").await, "jobs.4");
}

#[tokio::test]
async fn test_pop_count_is_capped() {
    let host = host().await;
    for i in 0..15 {
        host.message(&format!("/tinyq/push?item=bulk.{i:02}")).await;
    }

    let body = host.message("/tinyq/pop?channel=bulk&count=100").await;
    assert_eq!(body.lines().count(), 10);
    assert_eq!(host.message("/tinyq/count?channel=bulk").await, "5");
}

#[tokio::test]
async fn test_push_payload_round_trips() {
    let host = host().await;
    let payload: Payload = [("to", "a+b@example.com"), ("n", "1")].into_iter().collect();
    let item = Item::new("mail", "42").with_payload(&payload).unwrap().to_string();

    let resp = host
        .get_with("/tinyq/push", &[("item", item.as_str())])
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let popped: Item = host.message("/tinyq/pop?channel=mail").await.parse().unwrap();
    assert_eq!(popped.payload().unwrap(), payload);
}

#[tokio::test]
async fn test_push_overwrites_same_key() {
    let host = host().await;
    host.message("/tinyq/push?item=orders.1").await;
    host.message("/tinyq/push?item=orders.1").await;
    assert_eq!(host.message("/tinyq/count?channel=orders").await, "1");
}

#[tokio::test]
async fn test_invalid_item_is_error_envelope() {
    let host = host().await;

    let envelope = host.envelope("/tinyq/push?item=.nokey").await;
    assert!(envelope.is_error());
    assert!(envelope.error.unwrap().contains("invalid item"));

    let envelope = host.envelope("/tinyq/push").await;
    assert!(envelope.is_error());
}

#[tokio::test]
async fn test_ack_removes_item() {
    let host = host().await;
    host.message("/tinyq/push?item=orders.1").await;
    host.message("/tinyq/push?item=orders.2").await;

    assert_eq!(host.message("/tinyq/ack?item=orders.1").await, "ok");
    assert_eq!(host.message("/tinyq/keys?channel=orders").await, "orders.2");

    let envelope = host.envelope("/tinyq/ack?item=ghost.1").await;
    assert!(envelope.is_error());
}

#[tokio::test]
async fn test_applications_are_isolated() {
    let host = host().await;
    host.message("/tinyq/push?item=orders.1&app=shop").await;

    assert_eq!(host.message("/tinyq/count?channel=orders&app=blog").await, "0");
    assert_eq!(host.message("/tinyq/count?channel=orders").await, "0");
    assert_eq!(host.message("/tinyq/count?channel=orders&app=shop").await, "1");
}

#[tokio::test]
async fn test_token_is_ignored() {
    let host = host().await;
    assert_eq!(host.message("/tinyq/push?item=a.1&token=secret").await, "ok");
}

#[tokio::test]
async fn test_invalid_application_is_bad_request() {
    let host = host().await;
    let resp = host.get("/tinyq/count?channel=a&app=../etc").await.unwrap();
    assert_eq!(resp.status(), 400);
}

// =============================================================================
// Channels
// =============================================================================

#[tokio::test]
async fn test_pause_blocks_pop() {
    let host = host().await;
    host.message("/tinyq/push?item=orders.1").await;

    assert_eq!(host.message("/tinyq/channels/pause?channel=orders").await, "paused");
    assert_eq!(host.message("/tinyq/channels/status?channel=orders").await, "true");
    assert_eq!(host.message("/tinyq/pop?channel=orders").await, "paused");
    assert_eq!(host.message("/tinyq/count?channel=orders").await, "1");

    assert_eq!(host.message("/tinyq/channels/resume?channel=orders").await, "unpaused");
    assert_eq!(host.message("/tinyq/channels/status?channel=orders").await, "false");
    assert_eq!(host.message("/tinyq/pop?channel=orders").await, "orders.1");
}

#[tokio::test]
async fn test_lock_blocks_clear_and_delete() {
    let host = host().await;
    host.message("/tinyq/push?item=orders.1").await;

    assert_eq!(host.message("/tinyq/channels/lock?channel=orders").await, "ok");
    assert_eq!(host.message("/tinyq/channels/lockstatus?channel=orders").await, "locked");
    assert_eq!(host.message("/tinyq/channels/clear?channel=orders").await, "locked");
    assert_eq!(host.message("/tinyq/channels/delete?channel=orders").await, "locked");
    assert_eq!(host.message("/tinyq/count?channel=orders").await, "1");

    // Locks don't stop pops
    assert_eq!(host.message("/tinyq/pop?channel=orders").await, "orders.1");

    assert_eq!(host.message("/tinyq/channels/unlock?channel=orders").await, "ok");
    assert_eq!(host.message("/tinyq/channels/lockstatus?channel=orders").await, "unlocked");
    assert_eq!(host.message("/tinyq/channels/delete?channel=orders").await, "ok");
}

#[tokio::test]
async fn test_clear_keeps_channel() {
    let host = host().await;
    host.message("/tinyq/push?item=orders.1").await;
    host.message("/tinyq/push?item=orders.2").await;

    assert_eq!(host.message("/tinyq/channels/clear?channel=orders").await, "ok");
    assert_eq!(host.message("/tinyq/channels").await, "orders|0|false|false");
}

#[tokio::test]
async fn test_delete_missing_channel_is_error() {
    let host = host().await;
    let envelope = host.envelope("/tinyq/channels/delete?channel=ghost").await;
    assert!(envelope.is_error());
    assert!(envelope.error.unwrap().contains("channel not found"));
}

#[tokio::test]
async fn test_channel_listing_rows() {
    let host = host().await;
    host.message("/tinyq/push?item=b.1").await;
    host.message("/tinyq/push?item=b.2").await;
    host.message("/tinyq/push?item=a.1").await;
    host.message("/tinyq/channels/pause?channel=b").await;
    host.message("/tinyq/channels/lock?channel=a").await;

    assert_eq!(
        host.message("/tinyq/channels").await,
        "a|1|false|true\nb|2|true|false"
    );
}

// =============================================================================
// Statistics, applications and key/value
// =============================================================================

#[tokio::test]
async fn test_stats_are_raw_json() {
    let host = host().await;
    host.message("/tinyq/push?item=orders.1").await;
    host.message("/tinyq/push?item=orders.2").await;
    host.message("/tinyq/pop?channel=orders").await;

    let found = eventually(|| async {
        let stats: Vec<ChannelStats> = host
            .get("/tinyq/stats")
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        stats.len() == 1
            && stats[0].stats.get("push") == Some(&2)
            && stats[0].stats.get("pop") == Some(&1)
    })
    .await;
    assert!(found, "statistics never reached the store");

    let stats: serde_json::Value = host.get("/tinyq/stats").await.unwrap().json().await.unwrap();
    assert_eq!(stats[0]["channel"], "orders");
    assert_eq!(stats[0]["count"], 1);
    assert_eq!(stats[0]["is_paused"], false);
}

#[tokio::test]
async fn test_databases_lists_applications() {
    let host = host().await;
    host.message("/tinyq/push?item=a.1&app=shop").await;
    host.message("/tinyq/push?item=a.1&app=blog").await;

    let apps: Vec<String> = host
        .get("/tinyq/databases")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(apps.contains(&"shop".to_string()));
    assert!(apps.contains(&"blog".to_string()));
}

#[tokio::test]
async fn test_crud_set_get_delete() {
    let host = host().await;

    assert_eq!(host.message("/tinyq/crud/get/greeting").await, "");
    assert_eq!(host.message("/tinyq/crud/set/greeting?v=hello").await, "ok");
    assert_eq!(host.message("/tinyq/crud/get/greeting").await, "hello");
    assert_eq!(host.message("/tinyq/crud/delete/greeting").await, "ok");
    assert_eq!(host.message("/tinyq/crud/get/greeting").await, "");

    // Key/value entries never show up as channels
    host.message("/tinyq/crud/set/greeting?v=hello").await;
    assert_eq!(host.message("/tinyq/channels").await, "");
}

#[tokio::test]
async fn test_crud_set_accepts_empty_value() {
    let host = host().await;

    assert_eq!(host.message("/tinyq/crud/set/blank?v=").await, "ok");
    assert_eq!(
        host.manager().kv_get("default", "blank").await.unwrap().as_deref(),
        Some("")
    );

    // Omitting `v` altogether is still an error
    let envelope = host.envelope("/tinyq/crud/set/other").await;
    assert!(envelope.is_error());
    assert_eq!(host.manager().kv_get("default", "other").await.unwrap(), None);
}

#[tokio::test]
async fn test_crud_unknown_command() {
    let host = host().await;
    let resp = host.get("/tinyq/crud/explode/key").await.unwrap();
    assert_eq!(resp.status(), 400);
}

// =============================================================================
// Daemon endpoints
// =============================================================================

#[tokio::test]
async fn test_health() {
    let host = host().await;
    host.message("/tinyq/push?item=a.1&app=shop").await;

    let resp = host.get("/health").await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(
        body["open_applications"]
            .as_array()
            .unwrap()
            .iter()
            .any(|a| a == "shop")
    );
}

#[tokio::test]
async fn test_metrics_disabled_by_default() {
    let host = host().await;
    let resp = host.get("/metrics").await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_concurrent_pushes() {
    let host = Arc::new(host().await);

    let mut handles = Vec::new();
    for i in 0..20 {
        let host = Arc::clone(&host);
        handles.push(tokio::spawn(async move {
            host.message(&format!("/tinyq/push?item=load.{i:03}")).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), "ok");
    }

    assert_eq!(host.message("/tinyq/count?channel=load").await, "20");
}

// =============================================================================
// Router without a socket
// =============================================================================

#[tokio::test]
async fn test_router_oneshot() {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let dir = tempfile::tempdir().unwrap();
    let manager = tinyq::daemon::manager::QueueManager::new(dir.path(), 8);
    let app = tinyq::daemon::http::router(Arc::new(tinyq::daemon::http::AppState::new(
        manager.clone(),
        "default",
    )));

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/tinyq/push?item=orders.7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!({"message": "ok"}));
    assert_eq!(manager.count("default", "orders").await.unwrap(), 1);
}
