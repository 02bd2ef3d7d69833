//! Tests for the Redis backend.
//!
//! Tests marked `#[ignore]` need a server:
//!
//! ```text
//! REDIS_URL=redis://127.0.0.1:6379/15 cargo test -p trojan-statistic -- --ignored
//! ```

use std::time::Duration;

use trojan_config::{CancellationToken, Context};

use crate::redis::{REDIS_CAPABILITIES, RedisAuth, RedisConfig};
use crate::{AuthError, AuthRegistry, Authenticator, sha224_hex};

/// Connect with a per-test key prefix so runs never see each other's keys.
async fn setup(test: &str) -> RedisAuth {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/15".into());
    let prefix = format!("trojan-stat-test:{test}:{}:", std::process::id());
    let config = RedisConfig::from_url(url).key_prefix(prefix);
    let auth = RedisAuth::connect(&config, CancellationToken::new())
        .await
        .expect("Failed to connect to redis");
    for user in auth.list_users().await.unwrap() {
        auth.del_user(user.hash()).await.unwrap();
    }
    auth
}

#[tokio::test]
async fn test_connect_refused() {
    let config = RedisConfig::from_url("redis://127.0.0.1:1/0").timeout(Duration::from_secs(1));
    let result = RedisAuth::connect(&config, CancellationToken::new()).await;
    assert!(matches!(result, Err(AuthError::Backend(_))));
}

#[tokio::test]
async fn test_registry_wraps_connect_failure() {
    let mut config = trojan_config::ConfigRegistry::new();
    crate::register_config(&mut config);
    let ctx = config
        .with_json(
            &Context::new(),
            br#"{"redis": {"url": "redis://127.0.0.1:1/0", "timeout_secs": 1}}"#,
        )
        .unwrap();

    let Err(err) = AuthRegistry::with_builtin().create(&ctx, "redis").await else {
        panic!("redis authenticator created without a server");
    };
    assert!(matches!(err, AuthError::Create { ref backend, .. } if backend == "redis"));
}

#[tokio::test]
#[ignore]
async fn test_scenario_abc() {
    let auth = setup("abc").await;
    assert!(auth.auth_user("abc").await.unwrap().is_none());

    auth.add_user("abc").await.unwrap();
    let user = auth.auth_user("abc").await.unwrap().unwrap();
    assert_eq!(user.get_traffic().await.unwrap(), (0, 0));

    user.add_traffic(100, 200).await;
    user.add_traffic(50, 0).await;
    assert_eq!(user.get_traffic().await.unwrap(), (150, 200));

    assert_eq!(user.get_and_reset_traffic().await.unwrap(), (150, 200));
    assert_eq!(user.get_traffic().await.unwrap(), (0, 0));
    auth.del_user("abc").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_add_user_keeps_counters() {
    let auth = setup("keep").await;
    auth.add_user("abc").await.unwrap();
    let user = auth.auth_user("abc").await.unwrap().unwrap();
    user.add_traffic(10, 20).await;

    auth.add_user("abc").await.unwrap();
    assert_eq!(user.get_traffic().await.unwrap(), (10, 20));
    auth.del_user("abc").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_traffic_for_deleted_user_is_dropped() {
    let auth = setup("deleted").await;
    auth.add_user("abc").await.unwrap();
    let user = auth.auth_user("abc").await.unwrap().unwrap();

    auth.del_user("abc").await.unwrap();
    auth.del_user("abc").await.unwrap();
    user.add_traffic(1, 1).await;

    assert!(auth.auth_user("abc").await.unwrap().is_none());
    assert_eq!(user.get_traffic().await.unwrap(), (0, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_concurrent_add_traffic_sums() {
    let auth = setup("concurrent").await;
    let hash = sha224_hex("concurrent");
    auth.add_user(&hash).await.unwrap();
    let user = auth.auth_user(&hash).await.unwrap().unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let user = user.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..100 {
                user.add_traffic(1, 2).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(user.get_traffic().await.unwrap(), (800, 1600));
    auth.del_user(&hash).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_list_users_and_capabilities() {
    let auth = setup("list").await;
    auth.add_user("a").await.unwrap();
    auth.add_user("b").await.unwrap();

    let mut hashes: Vec<_> = auth
        .list_users()
        .await
        .unwrap()
        .iter()
        .map(|u| u.hash().to_string())
        .collect();
    hashes.sort();
    assert_eq!(hashes, ["a", "b"]);

    let user = auth.auth_user("a").await.unwrap().unwrap();
    assert_eq!(auth.capabilities(), REDIS_CAPABILITIES);
    assert!(!user.capabilities().ip_limit);
    user.set_ip_limit(1);
    assert!(user.add_ip("1.1.1.1".parse().unwrap()));
    assert!(user.add_ip("2.2.2.2".parse().unwrap()));
    assert_eq!(user.get_speed_limit(), (0, 0));

    auth.del_user("a").await.unwrap();
    auth.del_user("b").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_closed_fails_fast() {
    let auth = setup("closed").await;
    auth.close().await.unwrap();
    assert!(matches!(auth.auth_user("abc").await, Err(AuthError::Closed)));
    assert!(matches!(auth.add_user("abc").await, Err(AuthError::Closed)));
}
