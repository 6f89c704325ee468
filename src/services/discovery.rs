use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backends::plex::api::{AuthHeaderProvider, DiscoveryError, ResourceFetcher};
use crate::config::Config;
use crate::events::{DiscoveryEvent, DiscoveryEventKind, EventBus, EventSubscriber, Subscription};
use crate::models::{HealthStatus, PlexConnection, PlexServer};
use crate::services::core::{
    ConnectionSelector, ConnectionTester, HealthMap, HealthPersistence, KeyValueStore,
    ProbeOutcome, SelectionResult,
};

/// Storage key holding the id of the last successfully selected server
pub const SELECTED_SERVER_KEY: &str = "plex_selected_server_id";

type DiscoveryResult = Result<Arc<Vec<PlexServer>>, DiscoveryError>;
type SharedDiscovery = Shared<BoxFuture<'static, DiscoveryResult>>;

#[derive(Default)]
struct DiscoveryState {
    servers: Arc<Vec<PlexServer>>,
    selected_server: Option<PlexServer>,
    selected_connection: Option<PlexConnection>,
    last_refresh_at: Option<DateTime<Utc>>,
    /// Monotonic twin of `last_refresh_at`, drives cache freshness
    refreshed_at: Option<Instant>,
    in_flight: Option<(u64, SharedDiscovery)>,
}

struct Inner {
    fetcher: ResourceFetcher,
    selector: ConnectionSelector,
    health: HealthPersistence,
    store: Arc<dyn KeyValueStore>,
    events: EventBus,
    cache_ttl: Duration,
    state: RwLock<DiscoveryState>,
    discovery_seq: AtomicU64,
    selection_generation: AtomicU64,
}

/// Owns the discovered server list and the current selection.
///
/// One instance per account, cloned into whoever needs it. Getters are pure
/// reads over the cached state and never touch the network.
#[derive(Clone)]
pub struct DiscoveryCoordinator {
    inner: Arc<Inner>,
}

impl DiscoveryCoordinator {
    pub fn new(
        config: &Config,
        auth: Arc<dyn AuthHeaderProvider>,
        store: Arc<dyn KeyValueStore>,
    ) -> anyhow::Result<Self> {
        let fetcher = ResourceFetcher::new(&config.discovery, auth.clone())?;
        let tester = ConnectionTester::new(auth, config.discovery.connection_timeout())?;
        let selector = ConnectionSelector::new(Arc::new(tester), config.selection);

        Ok(Self::with_components(
            fetcher,
            selector,
            store,
            config.discovery.cache_ttl(),
        ))
    }

    pub fn with_components(
        fetcher: ResourceFetcher,
        selector: ConnectionSelector,
        store: Arc<dyn KeyValueStore>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                selector,
                health: HealthPersistence::new(store.clone()),
                store,
                events: EventBus::default(),
                cache_ttl,
                state: RwLock::new(DiscoveryState::default()),
                discovery_seq: AtomicU64::new(0),
                selection_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Fetch the server list, joining a discovery that is already running.
    ///
    /// Every caller that joins the same run receives the same `Arc`. A list
    /// fetched within the cache TTL is returned without a request. The fetch
    /// runs on its own task, so dropping the returned future does not cancel
    /// it.
    pub async fn discover_servers(&self) -> DiscoveryResult {
        let discovery = {
            let mut state = self.inner.state.write().await;
            let running = state.in_flight.as_ref().map(|(_, running)| running.clone());

            if let Some(running) = running {
                debug!("Joining in-flight server discovery");
                running
            } else if state
                .refreshed_at
                .is_some_and(|at| at.elapsed() < self.inner.cache_ttl)
            {
                debug!("Using cached server list ({} servers)", state.servers.len());
                return Ok(state.servers.clone());
            } else {
                let seq = self.inner.discovery_seq.fetch_add(1, Ordering::SeqCst) + 1;
                // Spawned so the run finishes and clears `in_flight` even when
                // every caller stops waiting
                let task = tokio::spawn({
                    let inner = self.inner.clone();
                    async move { inner.run_discovery(seq).await }
                });
                let running = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(DiscoveryError::ServerUnreachable {
                            status: None,
                            message: format!("discovery task failed: {}", e),
                        })
                    })
                }
                .boxed()
                .shared();
                state.in_flight = Some((seq, running.clone()));
                running
            }
        };

        discovery.await
    }

    /// Discard the freshness marker and discover again
    pub async fn refresh_servers(&self) -> DiscoveryResult {
        {
            let mut state = self.inner.state.write().await;
            state.refreshed_at = None;
        }
        self.discover_servers().await
    }

    /// Discover, then restore the persisted selection if it still resolves
    pub async fn initialize(&self) -> Result<Option<PlexServer>, DiscoveryError> {
        let servers = self.discover_servers().await?;

        let saved = match self.inner.store.get(SELECTED_SERVER_KEY) {
            Ok(saved) => saved,
            Err(e) => {
                warn!("Failed to read saved server selection: {:#}", e);
                None
            }
        };

        if let Some(server_id) = saved {
            if servers.iter().any(|server| server.id == server_id.as_str()) {
                info!("Restoring saved server selection {}", server_id);
                if !self.select_server(&server_id).await {
                    warn!("Saved server {} is not reachable", server_id);
                }
            } else {
                debug!("Saved server {} is no longer available", server_id);
            }
        }

        Ok(self.get_selected_server().await)
    }

    pub async fn test_connection(&self, connection: &PlexConnection) -> ProbeOutcome {
        self.inner.selector.probe().test(connection).await
    }

    pub async fn find_fastest_connection(&self, server: &PlexServer) -> SelectionResult {
        self.inner.selector.find_fastest_connection(server).await
    }

    /// Probe `server_id` and make it the active server.
    ///
    /// Returns `false` for unknown ids and unreachable servers; health is
    /// recorded either way for known ids. When several selections overlap the
    /// most recently started one wins.
    pub async fn select_server(&self, server_id: &str) -> bool {
        let server = {
            let state = self.inner.state.read().await;
            state.servers.iter().find(|s| s.id == server_id).cloned()
        };

        let Some(server) = server else {
            warn!("Cannot select unknown server {}", server_id);
            return false;
        };

        let generation = self
            .inner
            .selection_generation
            .fetch_add(1, Ordering::SeqCst)
            + 1;

        let SelectionResult {
            connection,
            auth_required,
        } = self.inner.selector.find_fastest_connection(&server).await;

        let Some(connection) = connection else {
            let status = if auth_required {
                HealthStatus::AuthRequired
            } else {
                HealthStatus::Unreachable
            };
            self.inner.health.record(&server.id, status, None);
            self.reset_if_selected(&server, generation).await;
            return false;
        };

        self.inner
            .health
            .record(&server.id, HealthStatus::Ok, Some(&connection));

        let mut selected = server;
        selected.preferred_connection = Some(connection.clone());

        // Storage and events are updated under the guard so a concurrent
        // clear or newer selection can never interleave with this commit
        let mut state = self.inner.state.write().await;

        if self.inner.selection_generation.load(Ordering::SeqCst) != generation {
            debug!(
                "Selection of {} superseded by a newer request",
                selected.name
            );
            return false;
        }

        let servers = Arc::make_mut(&mut state.servers);
        if let Some(cached) = servers.iter_mut().find(|s| s.id == selected.id) {
            cached.preferred_connection = Some(connection.clone());
        }
        state.selected_server = Some(selected.clone());
        state.selected_connection = Some(connection.clone());

        if let Err(e) = self.inner.store.set(SELECTED_SERVER_KEY, selected.id.as_str()) {
            warn!("Failed to persist server selection: {:#}", e);
        }

        info!(
            "✓ Selected server {} via {} ({})",
            selected.name,
            connection.uri,
            connection.connection_type()
        );

        self.inner
            .events
            .publish(DiscoveryEvent::ServerChange(Some(selected)));
        self.inner
            .events
            .publish(DiscoveryEvent::ConnectionChange(Some(connection.uri.clone())));

        true
    }

    /// Forget the current selection, in memory and in storage
    pub async fn clear_selection(&self) {
        let mut state = self.inner.state.write().await;
        self.inner
            .selection_generation
            .fetch_add(1, Ordering::SeqCst);

        state.selected_server = None;
        state.selected_connection = None;

        if let Err(e) = self.inner.store.remove(SELECTED_SERVER_KEY) {
            warn!("Failed to remove saved server selection: {:#}", e);
        }

        self.publish_reset();
    }

    async fn reset_if_selected(&self, server: &PlexServer, generation: u64) {
        let mut state = self.inner.state.write().await;
        if self.inner.selection_generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let is_selected = state
            .selected_server
            .as_ref()
            .is_some_and(|selected| selected.id == server.id);
        if !is_selected {
            return;
        }
        state.selected_server = None;
        state.selected_connection = None;

        warn!("✗ Selected server {} is no longer reachable", server.name);
        self.publish_reset();
    }

    /// Callers hold the state write guard
    fn publish_reset(&self) {
        self.inner.events.publish(DiscoveryEvent::ServerChange(None));
        self.inner
            .events
            .publish(DiscoveryEvent::ConnectionChange(None));
    }

    pub async fn get_servers(&self) -> Arc<Vec<PlexServer>> {
        self.inner.state.read().await.servers.clone()
    }

    pub async fn get_selected_server(&self) -> Option<PlexServer> {
        self.inner.state.read().await.selected_server.clone()
    }

    pub async fn get_selected_connection(&self) -> Option<PlexConnection> {
        self.inner.state.read().await.selected_connection.clone()
    }

    /// Base URI of the selected server's preferred connection
    pub async fn get_server_uri(&self) -> Option<String> {
        let state = self.inner.state.read().await;
        state
            .selected_server
            .as_ref()
            .and_then(|server| server.preferred_connection.as_ref())
            .map(|connection| connection.uri.clone())
    }

    pub async fn get_active_connection_uri(&self) -> Option<String> {
        let state = self.inner.state.read().await;
        state
            .selected_connection
            .as_ref()
            .map(|connection| connection.uri.clone())
    }

    pub async fn get_https_connection(&self) -> Option<PlexConnection> {
        let state = self.inner.state.read().await;
        state
            .selected_server
            .as_ref()
            .and_then(|server| server.https_connection().cloned())
    }

    pub async fn get_relay_connection(&self) -> Option<PlexConnection> {
        let state = self.inner.state.read().await;
        state
            .selected_server
            .as_ref()
            .and_then(|server| server.relay_connection().cloned())
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.state.read().await.selected_connection.is_some()
    }

    pub async fn is_discovering(&self) -> bool {
        self.inner.state.read().await.in_flight.is_some()
    }

    pub async fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state.read().await.last_refresh_at
    }

    /// Last recorded reachability per server id
    pub fn health_report(&self) -> HealthMap {
        self.inner.health.load_all()
    }

    pub fn on<F>(&self, kind: DiscoveryEventKind, handler: F) -> Subscription
    where
        F: Fn(&DiscoveryEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    pub fn subscribe(&self) -> EventSubscriber {
        self.inner.events.subscribe()
    }
}

impl Inner {
    async fn run_discovery(&self, seq: u64) -> DiscoveryResult {
        let started = Instant::now();
        let result = self.fetcher.fetch_servers().await;

        let mut state = self.state.write().await;
        if state.in_flight.as_ref().is_some_and(|(id, _)| *id == seq) {
            state.in_flight = None;
        }

        match result {
            Ok(servers) => {
                let servers = Arc::new(servers);
                state.servers = servers.clone();
                state.last_refresh_at = Some(Utc::now());
                state.refreshed_at = Some(Instant::now());
                debug!(
                    "Discovery finished in {:?} with {} servers",
                    started.elapsed(),
                    servers.len()
                );
                Ok(servers)
            }
            Err(e) => {
                warn!("✗ Server discovery failed: {}", e);
                Err(e)
            }
        }
    }
}
