use mockito::{Matcher, Server};
use plex_discovery::{DiscoveryCoordinator, DiscoveryError, MemoryStore, StaticTokenAuth};
use std::sync::Arc;

use crate::common::{TEST_TOKEN, test_config};

#[tokio::test]
async fn test_persistent_rate_limit_surfaces_after_budget() {
    let mut plex_tv = Server::new_async().await;
    let mock = plex_tv
        .mock("GET", "/api/v2/resources")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("retry-after", "0")
        .with_body("slow down")
        .expect(2)
        .create_async()
        .await;

    let coordinator = DiscoveryCoordinator::new(
        &test_config(&plex_tv.url()),
        Arc::new(StaticTokenAuth::new(TEST_TOKEN)),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    let err = coordinator.initialize().await.unwrap_err();

    assert_eq!(err.code(), "RATE_LIMITED");
    assert!(matches!(
        err,
        DiscoveryError::RateLimited { attempts: 2, .. }
    ));
    assert!(err.is_retryable());
    assert!(!err.to_string().contains(TEST_TOKEN));
    assert!(coordinator.get_servers().await.is_empty());
    assert!(!coordinator.is_discovering().await);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_recovers_after_one_rate_limited_attempt() {
    let mut plex_tv = Server::new_async().await;
    let limited = plex_tv
        .mock("GET", "/api/v2/resources")
        .match_query(Matcher::Any)
        .with_status(429)
        .expect(1)
        .create_async()
        .await;
    let ok = plex_tv
        .mock("GET", "/api/v2/resources")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let coordinator = DiscoveryCoordinator::new(
        &test_config(&plex_tv.url()),
        Arc::new(StaticTokenAuth::new(TEST_TOKEN)),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    let servers = coordinator.discover_servers().await.unwrap();
    assert!(servers.is_empty());

    limited.assert_async().await;
    ok.assert_async().await;
}
