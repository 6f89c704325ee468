use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents one network path to a Plex server.
///
/// `uri` is always a sanitized origin (scheme, host and port only). It is
/// produced by [`crate::utils::normalize_connection_uri`] during discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlexConnection {
    pub uri: String,
    pub protocol: Protocol,
    pub address: String,
    pub port: u16,
    pub local: bool,
    pub relay: bool,
    pub latency_ms: Option<u64>,
}

impl PlexConnection {
    pub fn is_https(&self) -> bool {
        self.protocol == Protocol::Https
    }

    pub fn connection_type(&self) -> ConnectionType {
        ConnectionType::from_connection(self)
    }

    /// Same host and port over HTTPS. Only meaningful for HTTP connections;
    /// returns `None` for anything else.
    pub fn https_upgrade(&self) -> Option<PlexConnection> {
        if self.protocol != Protocol::Http {
            return None;
        }

        let mut url = Url::parse(&self.uri).ok()?;
        let port = url.port_or_known_default()?;
        url.set_scheme("https").ok()?;
        url.set_port(Some(port)).ok()?;

        Some(PlexConnection {
            uri: url.origin().ascii_serialization(),
            protocol: Protocol::Https,
            latency_ms: None,
            ..self.clone()
        })
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Local,
    Remote,
    Relay,
    Unknown,
}

impl ConnectionType {
    pub fn from_connection(conn: &PlexConnection) -> Self {
        if conn.relay {
            ConnectionType::Relay
        } else if conn.local {
            ConnectionType::Local
        } else {
            ConnectionType::Remote
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionType::Local => "local",
            ConnectionType::Remote => "remote",
            ConnectionType::Relay => "relay",
            ConnectionType::Unknown => "unknown",
        };
        f.write_str(label)
    }
}
