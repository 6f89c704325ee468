//! Building blocks the discovery coordinator composes: probing, selection,
//! health diagnostics, and durable key/value storage.

pub mod connection;
pub mod connection_selector;
pub mod health;
pub mod storage;

pub use connection::{ConnectionProbe, ConnectionTester, ProbeOutcome};
pub use connection_selector::{CandidateTier, ConnectionSelector, SelectionResult, Tier};
pub use health::{HEALTH_STORAGE_KEY, HealthMap, HealthPersistence};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
