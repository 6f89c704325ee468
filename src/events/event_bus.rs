use super::types::{DiscoveryEvent, DiscoveryEventKind};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tracing::{trace, warn};

pub type EventHandler = Arc<dyn Fn(&DiscoveryEvent) + Send + Sync>;

type HandlerRegistry = Mutex<HashMap<DiscoveryEventKind, Vec<(u64, EventHandler)>>>;

/// Async receiver side of the bus
pub struct EventSubscriber {
    receiver: broadcast::Receiver<DiscoveryEvent>,
    kinds: Option<Vec<DiscoveryEventKind>>,
}

impl EventSubscriber {
    pub fn new(
        receiver: broadcast::Receiver<DiscoveryEvent>,
        kinds: Option<Vec<DiscoveryEventKind>>,
    ) -> Self {
        Self { receiver, kinds }
    }

    fn matches(&self, event: &DiscoveryEvent) -> bool {
        self.kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&event.kind()))
    }

    /// Receive the next event matching the filter
    pub async fn recv(&mut self) -> Result<DiscoveryEvent> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive without blocking
    pub fn try_recv(&mut self) -> Result<Option<DiscoveryEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Ok(Some(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Handle returned by [`EventBus::on`]. The handler stays registered until
/// `unsubscribe` is called or the handle is dropped.
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    registry: Weak<HandlerRegistry>,
    kind: DiscoveryEventKind,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    /// Keep the handler registered for the lifetime of the bus
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let Ok(mut handlers) = registry.lock() else {
            return;
        };
        if let Some(entries) = handlers.get_mut(&self.kind) {
            entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Typed pub/sub for selection changes.
///
/// Callback handlers run synchronously inside `publish`, in registration
/// order; broadcast subscribers receive the same events afterwards.
pub struct EventBus {
    sender: broadcast::Sender<DiscoveryEvent>,
    handlers: Arc<HandlerRegistry>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(32)
    }
}

impl EventBus {
    /// Create a new event bus with specified buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            handlers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn on<F>(&self, kind: DiscoveryEventKind, handler: F) -> Subscription
    where
        F: Fn(&DiscoveryEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handler: EventHandler = Arc::new(handler);
        match self.handlers.lock() {
            Ok(mut handlers) => handlers.entry(kind).or_default().push((id, handler)),
            Err(_) => warn!("Event handler registry poisoned, {} handler ignored", kind),
        }

        Subscription {
            registry: Arc::downgrade(&self.handlers),
            kind,
            id,
        }
    }

    pub fn publish(&self, event: DiscoveryEvent) {
        trace!("Publishing event: {}", event.kind());

        // Snapshot so handlers may (un)subscribe without deadlocking
        let handlers: Vec<EventHandler> = match self.handlers.lock() {
            Ok(handlers) => handlers
                .get(&event.kind())
                .map(|entries| entries.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };

        for handler in handlers {
            handler(&event);
        }

        // No broadcast receivers is normal
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), None)
    }

    /// Subscribe to specific event kinds
    pub fn subscribe_to(&self, kinds: Vec<DiscoveryEventKind>) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), Some(kinds))
    }

    pub fn handler_count(&self, kind: DiscoveryEventKind) -> usize {
        self.handlers
            .lock()
            .map(|handlers| handlers.get(&kind).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
