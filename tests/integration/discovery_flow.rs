use mockito::{Matcher, Server};
use plex_discovery::{
    ConnectionType, DiscoveryCoordinator, DiscoveryEvent, DiscoveryEventKind, HealthStatus,
    MemoryStore, Protocol, StaticTokenAuth,
};
use std::sync::{Arc, Mutex};

use crate::common::{TEST_TOKEN, connection, resource, resources_body, test_config};

#[tokio::test]
async fn test_local_http_fallback_against_live_identity_endpoint() {
    let mut plex_tv = Server::new_async().await;
    let mut media_server = Server::new_async().await;
    let local_uri = media_server.url();

    let body = resources_body(vec![
        resource(
            "srv1",
            "Garage",
            "server",
            vec![connection(&local_uri, true, false)],
        ),
        resource("player1", "Phone", "player", vec![]),
    ]);
    let discovery = plex_tv
        .mock("GET", "/api/v2/resources")
        .match_query(Matcher::Any)
        .match_header("x-plex-token", TEST_TOKEN)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect(1)
        .create_async()
        .await;
    let identity = media_server
        .mock("GET", "/identity")
        .match_header("x-plex-token", TEST_TOKEN)
        .with_status(200)
        .with_body(r#"{"MediaContainer":{"machineIdentifier":"srv1"}}"#)
        .create_async()
        .await;

    let coordinator = DiscoveryCoordinator::new(
        &test_config(&plex_tv.url()),
        Arc::new(StaticTokenAuth::new(TEST_TOKEN)),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = coordinator.on(DiscoveryEventKind::ConnectionChange, move |event| {
        sink.lock().unwrap().push(event.clone())
    });

    let servers = coordinator.discover_servers().await.unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].owner_id.as_deref(), Some("4242"));
    assert!(seen.lock().unwrap().is_empty());

    assert!(coordinator.select_server("srv1").await);

    let selected = coordinator.get_selected_connection().await.unwrap();
    assert_eq!(selected.uri, local_uri);
    assert_eq!(selected.protocol, Protocol::Http);
    assert!(selected.latency_ms.is_some());
    assert!(coordinator.is_connected().await);
    assert!(coordinator.get_https_connection().await.is_none());

    let health = coordinator.health_report();
    assert_eq!(health["srv1"].status, HealthStatus::Ok);
    assert_eq!(health["srv1"].connection_type, ConnectionType::Local);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![DiscoveryEvent::ConnectionChange(Some(local_uri.clone()))]
    );

    discovery.assert_async().await;
    identity.assert_async().await;
}

#[tokio::test]
async fn test_identity_auth_failure_reports_auth_required() {
    let mut plex_tv = Server::new_async().await;
    let mut media_server = Server::new_async().await;

    plex_tv
        .mock("GET", "/api/v2/resources")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(resources_body(vec![resource(
            "srv1",
            "Garage",
            "server",
            vec![connection(&media_server.url(), true, false)],
        )]))
        .create_async()
        .await;
    media_server
        .mock("GET", "/identity")
        .with_status(401)
        .create_async()
        .await;

    let coordinator = DiscoveryCoordinator::new(
        &test_config(&plex_tv.url()),
        Arc::new(StaticTokenAuth::new(TEST_TOKEN)),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    coordinator.discover_servers().await.unwrap();
    let server = coordinator.get_servers().await[0].clone();

    let result = coordinator.find_fastest_connection(&server).await;
    assert!(result.connection.is_none());
    assert!(result.auth_required);

    assert!(!coordinator.select_server("srv1").await);
    assert!(coordinator.get_selected_server().await.is_none());
    assert_eq!(
        coordinator.health_report()["srv1"].status,
        HealthStatus::AuthRequired
    );
}
