#![cfg(test)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::backends::plex::api::Sleeper;
use crate::models::PlexConnection;
use crate::services::core::{ConnectionProbe, KeyValueStore, ProbeOutcome};

/// Records requested delays instead of waiting
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Probe with canned outcomes per URI; anything unscripted is unreachable
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reachable(self, uri: &str, latency_ms: u64) -> Self {
        self.set_outcome(uri, ProbeOutcome::Reachable { latency_ms });
        self
    }

    pub fn auth_required(self, uri: &str) -> Self {
        self.set_outcome(uri, ProbeOutcome::AuthRequired);
        self
    }

    /// Hold the probe of `uri` for `delay` before answering
    pub fn delayed(mut self, uri: &str, delay: Duration) -> Self {
        self.delays.insert(uri.to_string(), delay);
        self
    }

    pub fn set_outcome(&self, uri: &str, outcome: ProbeOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(uri.to_string(), outcome);
    }

    /// URIs probed so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionProbe for ScriptedProbe {
    async fn test(&self, connection: &PlexConnection) -> ProbeOutcome {
        self.calls.lock().unwrap().push(connection.uri.clone());

        if let Some(delay) = self.delays.get(&connection.uri) {
            tokio::time::sleep(*delay).await;
        }

        self.outcomes
            .lock()
            .unwrap()
            .get(&connection.uri)
            .copied()
            .unwrap_or(ProbeOutcome::Unreachable)
    }
}

/// Store whose every operation fails
#[derive(Debug, Default)]
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(anyhow!("storage unavailable"))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(anyhow!("storage unavailable"))
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Err(anyhow!("storage unavailable"))
    }
}
