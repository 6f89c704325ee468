mod connection;
mod health;
mod identifiers;
mod server;

pub use connection::{ConnectionType, PlexConnection, Protocol};
pub use health::{HealthRecord, HealthStatus};
pub use identifiers::ServerId;
pub use server::PlexServer;
