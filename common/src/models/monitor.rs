//! Endpoint health models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::connection::Target;

/// Outcome of one probe against one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EndpointHealth {
    /// Probed endpoint.
    pub endpoint: Target,
    /// Whether the round trip succeeded.
    pub reachable: bool,
    /// Round-trip time in milliseconds, connection setup included.
    /// Absent when unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    /// When the probe finished.
    pub checked_at: DateTime<Utc>,
}

impl EndpointHealth {
    pub fn reachable(endpoint: Target, latency_ms: f64) -> Self {
        Self {
            endpoint,
            reachable: true,
            latency_ms: Some(latency_ms),
            checked_at: Utc::now(),
        }
    }

    pub fn unreachable(endpoint: Target) -> Self {
        Self {
            endpoint,
            reachable: false,
            latency_ms: None,
            checked_at: Utc::now(),
        }
    }

    /// `(reachable, latency_ms)` as reported to callers of `check_connection`.
    pub fn as_pair(&self) -> (bool, Option<f64>) {
        (self.reachable, self.latency_ms)
    }
}

/// Latest probe result per endpoint; `None` until the first probe completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthSnapshot {
    pub primary: Option<EndpointHealth>,
    pub replica: Option<EndpointHealth>,
}

impl HealthSnapshot {
    pub fn get(&self, endpoint: Target) -> Option<&EndpointHealth> {
        match endpoint {
            Target::Primary => self.primary.as_ref(),
            Target::Replica => self.replica.as_ref(),
        }
    }

    pub fn record(&mut self, health: EndpointHealth) {
        match health.endpoint {
            Target::Primary => self.primary = Some(health),
            Target::Replica => self.replica = Some(health),
        }
    }
}
