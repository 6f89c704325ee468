use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::connection::ConnectionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Unreachable,
    AuthRequired,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Unreachable => "unreachable",
            HealthStatus::AuthRequired => "auth_required",
        };
        f.write_str(label)
    }
}

/// Last reachability outcome for one server. Diagnostics only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub status: HealthStatus,
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    pub latency_ms: Option<u64>,
    pub tested_at: DateTime<Utc>,
}
