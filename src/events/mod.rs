pub mod event_bus;
pub mod types;

pub use event_bus::{EventBus, EventHandler, EventSubscriber, Subscription};
pub use types::{DiscoveryEvent, DiscoveryEventKind};
