//! The Redis registry against a live server.
//!
//! Ignored by default. Run with a disposable Redis:
//!
//! ```text
//! VIZOR_TEST_REDIS_URL=redis://127.0.0.1:6379/ cargo test -p vizor-infrastructure -- --ignored
//! ```

use redis::AsyncCommands;
use std::collections::HashMap;
use vizor_core::registry::SessionRegistry;
use vizor_core::session::{LayerKind, Lifecycle, SessionName, ViewerInfo};
use vizor_infrastructure::RedisSessionRegistry;
use vizor_infrastructure::redis_registry::TEARDOWN_SET_KEY;

struct LiveRedis {
    registry: RedisSessionRegistry,
    raw: redis::aio::MultiplexedConnection,
}

async fn live_redis() -> Option<LiveRedis> {
    let url = std::env::var("VIZOR_TEST_REDIS_URL").ok()?;
    let registry = RedisSessionRegistry::connect(&url).await.unwrap();
    let raw = redis::Client::open(url.as_str())
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap();
    Some(LiveRedis { registry, raw })
}

#[tokio::test]
#[ignore = "needs VIZOR_TEST_REDIS_URL"]
async fn test_append_writes_viewer_field_layout() {
    let Some(mut live) = live_redis().await else {
        return;
    };
    let s = SessionName::generate();
    live.registry.create_session(&s).await.unwrap();

    let first = live
        .registry
        .append_layer(&s, "x_ch488_left_container", "channel488_left_lightsheet", LayerKind::Image)
        .await
        .unwrap();
    let second = live
        .registry
        .append_layer(&s, "x_allen_overlay_container", "allen_overlay", LayerKind::Segmentation)
        .await
        .unwrap();
    assert_eq!((first, second), (1, 2));

    let hash: HashMap<String, String> = live.raw.hgetall(s.as_str()).await.unwrap();
    assert_eq!(hash["cv_count"], "2");
    assert_eq!(hash["cv1_container_name"], "x_ch488_left_container");
    assert_eq!(hash["cv1_name"], "channel488_left_lightsheet");
    assert_eq!(hash["layer1_type"], "image");
    assert_eq!(hash["cv2_name"], "allen_overlay");
    assert_eq!(hash["layer2_type"], "segmentation");

    let record = live.registry.get_session(&s).await.unwrap().unwrap();
    assert_eq!(record.layer_count(), 2);
    assert_eq!(record.lifecycle, Some(Lifecycle::Provisioning));

    live.registry.delete_session(&s).await.unwrap();
}

#[tokio::test]
#[ignore = "needs VIZOR_TEST_REDIS_URL"]
async fn test_teardown_set_follows_lifecycle() {
    let Some(mut live) = live_redis().await else {
        return;
    };
    let s = SessionName::generate();
    live.registry.create_session(&s).await.unwrap();

    live
        .registry
        .set_lifecycle(&s, Lifecycle::reaping())
        .await
        .unwrap();
    assert!(live.registry.sessions_in_teardown().await.unwrap().contains(&s));

    live.registry.set_lifecycle(&s, Lifecycle::Live).await.unwrap();
    assert!(!live.registry.sessions_in_teardown().await.unwrap().contains(&s));

    live
        .registry
        .set_lifecycle(&s, Lifecycle::reaping())
        .await
        .unwrap();
    live.registry.delete_session(&s).await.unwrap();

    let in_set: bool = live.raw.sismember(TEARDOWN_SET_KEY, s.as_str()).await.unwrap();
    assert!(!in_set);
    assert!(live.registry.get_session(&s).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "needs VIZOR_TEST_REDIS_URL"]
async fn test_writes_after_delete_do_not_recreate_record() {
    let Some(mut live) = live_redis().await else {
        return;
    };
    let s = SessionName::generate();
    live.registry.create_session(&s).await.unwrap();
    live.registry.delete_session(&s).await.unwrap();

    let err = live
        .registry
        .publish_viewer_token(&s, &ViewerInfo::new("late"))
        .await
        .unwrap_err();
    assert!(err.is_registry());
    assert!(live.registry.set_viewer(&s, "x_ng_container").await.is_err());
    assert!(
        live
            .registry
            .append_layer(&s, "c1", "one", LayerKind::Image)
            .await
            .is_err()
    );
    assert!(
        live
            .registry
            .set_lifecycle(&s, Lifecycle::reaping())
            .await
            .is_err()
    );

    let exists: bool = live.raw.exists(s.as_str()).await.unwrap();
    assert!(!exists);
    assert!(!live.registry.sessions_in_teardown().await.unwrap().contains(&s));
}
