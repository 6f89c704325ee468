use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::KeyValueStore;
use crate::models::{ConnectionType, HealthRecord, HealthStatus, PlexConnection, ServerId};

pub const HEALTH_STORAGE_KEY: &str = "plex_server_health";

pub type HealthMap = BTreeMap<String, HealthRecord>;

/// Per-server reachability log.
///
/// Diagnostics only: nothing here feeds back into connection selection, and
/// storage failures are logged and dropped.
#[derive(Clone)]
pub struct HealthPersistence {
    store: Arc<dyn KeyValueStore>,
}

impl HealthPersistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn record(
        &self,
        server_id: &ServerId,
        status: HealthStatus,
        connection: Option<&PlexConnection>,
    ) {
        let record = HealthRecord {
            status,
            connection_type: connection
                .map(ConnectionType::from_connection)
                .unwrap_or(ConnectionType::Unknown),
            latency_ms: connection.and_then(|c| c.latency_ms),
            tested_at: Utc::now(),
        };

        let mut health = self.load_all();
        health.insert(server_id.to_string(), record);

        let serialized = match serde_json::to_string(&health) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize server health: {}", e);
                return;
            }
        };

        match self.store.set(HEALTH_STORAGE_KEY, &serialized) {
            Ok(()) => debug!("Recorded health {} for server {}", status, server_id),
            Err(e) => warn!("Failed to persist health for server {}: {:#}", server_id, e),
        }
    }

    /// Stored map, empty when missing, unreadable, or corrupt
    pub fn load_all(&self) -> HealthMap {
        let raw = match self.store.get(HEALTH_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return HealthMap::new(),
            Err(e) => {
                warn!("Failed to read server health: {:#}", e);
                return HealthMap::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            debug!("Discarding unreadable server health map: {}", e);
            HealthMap::new()
        })
    }

    pub fn get(&self, server_id: &ServerId) -> Option<HealthRecord> {
        self.load_all().remove(server_id.as_str())
    }
}
