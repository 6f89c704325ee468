use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::connection::{ConnectionProbe, ProbeOutcome};
use crate::config::SelectionPolicy;
use crate::models::{PlexConnection, PlexServer};

/// Outcome of a selection run over one server's connections
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionResult {
    /// Winning connection with its measured latency
    pub connection: Option<PlexConnection>,
    /// Some endpoint answered 401/403 and nothing succeeded
    pub auth_required: bool,
}

/// Priority tiers, tested in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    HttpsLocal,
    HttpsRemote,
    HttpsRelay,
    /// HTTP endpoints retried over HTTPS, same host and port
    HttpsUpgrade,
    HttpLocal,
    HttpRemote,
    HttpRelay,
}

impl Tier {
    pub fn is_unencrypted(&self) -> bool {
        matches!(self, Tier::HttpLocal | Tier::HttpRemote | Tier::HttpRelay)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tier::HttpsLocal => "https-local",
            Tier::HttpsRemote => "https-remote",
            Tier::HttpsRelay => "https-relay",
            Tier::HttpsUpgrade => "https-upgrade",
            Tier::HttpLocal => "http-local",
            Tier::HttpRemote => "http-remote",
            Tier::HttpRelay => "http-relay",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTier {
    pub tier: Tier,
    pub candidates: Vec<PlexConnection>,
}

impl CandidateTier {
    fn new(tier: Tier, candidates: Vec<PlexConnection>) -> Self {
        Self { tier, candidates }
    }
}

/// Picks the connection to use for a server: walks the tiers in order and
/// probes candidates one at a time, stopping at the first that answers.
#[derive(Clone)]
pub struct ConnectionSelector {
    probe: Arc<dyn ConnectionProbe>,
    policy: SelectionPolicy,
}

impl ConnectionSelector {
    pub fn new(probe: Arc<dyn ConnectionProbe>, policy: SelectionPolicy) -> Self {
        Self { probe, policy }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn probe(&self) -> &Arc<dyn ConnectionProbe> {
        &self.probe
    }

    /// Build the ordered candidate list for `server` under this selector's policy
    pub fn candidate_tiers(&self, server: &PlexServer) -> Vec<CandidateTier> {
        build_tiers(&server.connections, self.policy)
    }

    pub async fn find_fastest_connection(&self, server: &PlexServer) -> SelectionResult {
        let mut auth_required = false;

        for CandidateTier { tier, candidates } in self.candidate_tiers(server) {
            for candidate in candidates {
                debug!(
                    "Testing {} candidate {} for {}",
                    tier, candidate.uri, server.name
                );

                match self.probe.test(&candidate).await {
                    ProbeOutcome::Reachable { latency_ms } => {
                        if tier.is_unencrypted() {
                            warn!(
                                "Using unencrypted HTTP connection to {}: {}",
                                server.name, candidate.uri
                            );
                        }
                        info!(
                            "Selected {} connection for {}: {} ({}ms)",
                            tier, server.name, candidate.uri, latency_ms
                        );
                        return SelectionResult {
                            connection: Some(candidate.with_latency(latency_ms)),
                            auth_required: false,
                        };
                    }
                    ProbeOutcome::AuthRequired => {
                        debug!("{} requires authentication, continuing", candidate.uri);
                        auth_required = true;
                    }
                    ProbeOutcome::Unreachable => {}
                }
            }
        }

        warn!(
            "No usable connection for {} (auth required: {})",
            server.name, auth_required
        );
        SelectionResult {
            connection: None,
            auth_required,
        }
    }
}

fn build_tiers(connections: &[PlexConnection], policy: SelectionPolicy) -> Vec<CandidateTier> {
    let pick = |https: bool, local: Option<bool>, relay: bool| -> Vec<PlexConnection> {
        connections
            .iter()
            .filter(|c| c.is_https() == https && c.relay == relay)
            .filter(|c| relay || local.is_none_or(|l| c.local == l))
            .cloned()
            .collect()
    };

    let mut tiers = Vec::new();

    if policy.prefer_https {
        tiers.push(CandidateTier::new(Tier::HttpsLocal, pick(true, Some(true), false)));
        tiers.push(CandidateTier::new(Tier::HttpsRemote, pick(true, Some(false), false)));
        tiers.push(CandidateTier::new(Tier::HttpsRelay, pick(true, None, true)));

        if policy.try_https_upgrade {
            let known: Vec<&str> = connections
                .iter()
                .filter(|c| c.is_https())
                .map(|c| c.uri.as_str())
                .collect();
            let upgrades = [
                pick(false, Some(true), false),
                pick(false, Some(false), false),
                pick(false, None, true),
            ]
            .into_iter()
            .flatten()
            .filter_map(|c| c.https_upgrade())
            // Already probed as a native HTTPS connection
            .filter(|c| !known.contains(&c.uri.as_str()))
            .collect();
            tiers.push(CandidateTier::new(Tier::HttpsUpgrade, upgrades));
        }

        if policy.allow_local_http {
            tiers.push(CandidateTier::new(Tier::HttpLocal, pick(false, Some(true), false)));
        }
    } else {
        tiers.push(CandidateTier::new(Tier::HttpsLocal, pick(true, Some(true), false)));
        tiers.push(CandidateTier::new(Tier::HttpLocal, pick(false, Some(true), false)));
        tiers.push(CandidateTier::new(Tier::HttpsRemote, pick(true, Some(false), false)));
        tiers.push(CandidateTier::new(Tier::HttpRemote, pick(false, Some(false), false)));
        tiers.push(CandidateTier::new(Tier::HttpsRelay, pick(true, None, true)));
        tiers.push(CandidateTier::new(Tier::HttpRelay, pick(false, None, true)));
    }

    tiers
}
