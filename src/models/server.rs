use serde::{Deserialize, Serialize};

use super::connection::PlexConnection;
use super::identifiers::ServerId;

/// A Plex Media Server the signed-in user can reach.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlexServer {
    pub id: ServerId,
    pub name: String,
    /// Owner's username (empty for servers the user owns)
    pub source_title: String,
    pub owner_id: Option<String>,
    pub owned: bool,
    pub connections: Vec<PlexConnection>,
    pub capabilities: Vec<String>,
    /// Set only after a successful selection
    pub preferred_connection: Option<PlexConnection>,
}

impl PlexServer {
    /// Best HTTPS direct connection: local before remote.
    pub fn https_connection(&self) -> Option<&PlexConnection> {
        let mut candidates: Vec<&PlexConnection> = self
            .connections
            .iter()
            .filter(|c| c.is_https() && !c.relay)
            .collect();
        candidates.sort_by_key(|c| !c.local);
        candidates.into_iter().next()
    }

    pub fn relay_connection(&self) -> Option<&PlexConnection> {
        self.connections.iter().find(|c| c.relay)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}
