use serde::{Deserialize, Deserializer};
use tracing::debug;
use url::Url;

use crate::models::{PlexConnection, PlexServer, Protocol, ServerId};
use crate::utils::normalize_connection_uri;

/// A device entry from the plex.tv resources endpoint, before filtering
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlexResource {
    #[serde(default)]
    pub name: Option<String>,
    pub client_identifier: String,
    #[serde(default)]
    pub source_title: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub owned: Option<bool>,
    #[serde(default)]
    pub provides: Option<String>,
    #[serde(default)]
    pub connections: Vec<PlexResourceConnection>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PlexResourceConnection {
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub port: Option<u32>,
    pub uri: String,
    #[serde(default)]
    pub local: Option<bool>,
    #[serde(default)]
    pub relay: Option<bool>,
}

/// plex.tv sends `ownerId` as a number for shared servers and null for owned ones
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl PlexResource {
    pub fn provides_server(&self) -> bool {
        self.provides
            .as_deref()
            .is_some_and(|provides| provides.contains("server"))
    }

    /// Convert into a [`PlexServer`], or `None` for non-server devices.
    ///
    /// Every connection URI goes through the sanitizer; rejected ones are
    /// dropped, and a server left with no connections is still returned.
    pub fn into_server(self) -> Option<PlexServer> {
        if !self.provides_server() {
            debug!(
                "Skipping resource {} (provides: {:?})",
                self.client_identifier, self.provides
            );
            return None;
        }

        let capabilities = self
            .provides
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        let connections = self
            .connections
            .into_iter()
            .filter_map(PlexResourceConnection::into_connection)
            .collect();

        Some(PlexServer {
            id: ServerId::new(self.client_identifier),
            name: self.name.unwrap_or_default(),
            source_title: self.source_title.unwrap_or_default(),
            owner_id: self.owner_id,
            owned: self.owned.unwrap_or(false),
            connections,
            capabilities,
            preferred_connection: None,
        })
    }
}

impl PlexResourceConnection {
    /// Sanitized connection, or `None` if the URI is rejected
    pub fn into_connection(self) -> Option<PlexConnection> {
        let uri = normalize_connection_uri(&self.uri)?;
        // The sanitized origin is authoritative for scheme, host and port
        let parsed = Url::parse(&uri).ok()?;
        let protocol = Protocol::from_scheme(parsed.scheme())?;

        let address = self
            .address
            .filter(|a| !a.is_empty())
            .or_else(|| parsed.host_str().map(str::to_string))
            .unwrap_or_default();
        let port = parsed.port_or_known_default().unwrap_or_else(|| {
            self.port
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or_default()
        });

        Some(PlexConnection {
            uri,
            protocol,
            address,
            port,
            local: self.local.unwrap_or(false),
            relay: self.relay.unwrap_or(false),
            latency_ms: None,
        })
    }
}
