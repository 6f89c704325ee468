pub mod core;
pub mod discovery;

pub use discovery::{DiscoveryCoordinator, SELECTED_SERVER_KEY};
