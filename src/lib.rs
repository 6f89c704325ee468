//! Plex server discovery and connection resolution.
//!
//! [`DiscoveryCoordinator`] fetches the account's servers from plex.tv, probes
//! their connections in HTTPS-first priority order, and keeps the selected
//! server and connection for the rest of the application.

pub mod backends;
pub mod config;
pub mod events;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use backends::plex::api::{
    AuthHeaderProvider, DiscoveryError, ResourceFetcher, StaticTokenAuth,
};
pub use config::{Config, SelectionPolicy};
pub use events::{DiscoveryEvent, DiscoveryEventKind, Subscription};
pub use models::{
    ConnectionType, HealthRecord, HealthStatus, PlexConnection, PlexServer, Protocol, ServerId,
};
pub use services::core::{
    ConnectionProbe, ConnectionSelector, ConnectionTester, FileStore, KeyValueStore, MemoryStore,
    ProbeOutcome, SelectionResult,
};
pub use services::{DiscoveryCoordinator, SELECTED_SERVER_KEY};
