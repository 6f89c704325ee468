use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::PlexServer;

/// Event names consumers can register handlers for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoveryEventKind {
    ServerChange,
    ConnectionChange,
}

impl DiscoveryEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryEventKind::ServerChange => "serverChange",
            DiscoveryEventKind::ConnectionChange => "connectionChange",
        }
    }
}

impl fmt::Display for DiscoveryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selection changes pushed to UI and player collaborators.
///
/// Never emitted by plain discovery, only by selection and clearing.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// New selected server, `None` when the selection was reset
    ServerChange(Option<PlexServer>),
    /// URI of the active connection, `None` when the selection was reset
    ConnectionChange(Option<String>),
}

impl DiscoveryEvent {
    pub fn kind(&self) -> DiscoveryEventKind {
        match self {
            DiscoveryEvent::ServerChange(_) => DiscoveryEventKind::ServerChange,
            DiscoveryEvent::ConnectionChange(_) => DiscoveryEventKind::ConnectionChange,
        }
    }
}
