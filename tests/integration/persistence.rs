use mockito::{Matcher, Server};
use plex_discovery::{
    DiscoveryCoordinator, FileStore, KeyValueStore, SELECTED_SERVER_KEY, StaticTokenAuth,
};
use std::sync::Arc;
use tempfile::TempDir;

use crate::common::{TEST_TOKEN, connection, resource, resources_body, test_config};

#[tokio::test]
async fn test_selection_survives_restart() {
    let mut plex_tv = Server::new_async().await;
    let mut media_server = Server::new_async().await;
    let temp_dir = TempDir::new().unwrap();
    let state_path = temp_dir.path().join("state").join("state.json");

    let discovery = plex_tv
        .mock("GET", "/api/v2/resources")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(resources_body(vec![
            resource(
                "srv1",
                "Garage",
                "server",
                vec![connection(&media_server.url(), true, false)],
            ),
            resource("srv2", "Office", "server", vec![]),
        ]))
        .expect(2)
        .create_async()
        .await;
    media_server
        .mock("GET", "/identity")
        .with_status(200)
        .create_async()
        .await;

    let config = test_config(&plex_tv.url());

    {
        let coordinator = DiscoveryCoordinator::new(
            &config,
            Arc::new(StaticTokenAuth::new(TEST_TOKEN)),
            Arc::new(FileStore::new(&state_path)),
        )
        .unwrap();

        assert!(coordinator.initialize().await.unwrap().is_none());
        assert!(coordinator.select_server("srv1").await);
    }

    let store = FileStore::new(&state_path);
    assert_eq!(
        store.get(SELECTED_SERVER_KEY).unwrap().as_deref(),
        Some("srv1")
    );

    let restarted = DiscoveryCoordinator::new(
        &config,
        Arc::new(StaticTokenAuth::new(TEST_TOKEN)),
        Arc::new(store),
    )
    .unwrap();

    let restored = restarted.initialize().await.unwrap();
    assert_eq!(restored.unwrap().id, "srv1");
    assert_eq!(
        restarted.get_server_uri().await,
        Some(media_server.url())
    );
    assert!(restarted.health_report().contains_key("srv1"));

    restarted.clear_selection().await;
    let store = FileStore::new(&state_path);
    assert!(store.get(SELECTED_SERVER_KEY).unwrap().is_none());

    discovery.assert_async().await;
}
