use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub service: String,
    pub timestamp: String,
    pub queues: Vec<String>,
    pub checks: HashMap<String, ServiceHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            status: HealthStatus::Healthy,
            response_time_ms: Some(response_time_ms),
            reconnect_attempts: None,
            error: None,
        }
    }

    pub fn unhealthy(error: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time_ms: None,
            reconnect_attempts: None,
            error: Some(error),
        }
    }

    pub fn degraded(error: String) -> Self {
        Self {
            status: HealthStatus::Degraded,
            response_time_ms: None,
            reconnect_attempts: None,
            error: Some(error),
        }
    }

    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = Some(attempts);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BrokerState {
    Connecting,
    Connected,
    Reconnecting,
}

/// Connection state published by a consumer supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerHealth {
    pub state: BrokerState,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub since: DateTime<Utc>,
}

impl BrokerHealth {
    pub fn connecting() -> Self {
        Self {
            state: BrokerState::Connecting,
            consecutive_failures: 0,
            last_error: None,
            since: Utc::now(),
        }
    }

    pub fn connected() -> Self {
        Self {
            state: BrokerState::Connected,
            consecutive_failures: 0,
            last_error: None,
            since: Utc::now(),
        }
    }

    pub fn reconnecting(&self, error: String) -> Self {
        Self {
            state: BrokerState::Reconnecting,
            consecutive_failures: self.consecutive_failures.saturating_add(1),
            last_error: Some(error),
            since: Utc::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == BrokerState::Connected
    }
}
