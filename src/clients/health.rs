use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{SecondsFormat, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
    clients::mailer::MailSender,
    models::health::{BrokerHealth, BrokerState, HealthCheckResponse, HealthStatus, ServiceHealth},
    utils::with_deadline,
};

pub const SERVICE_NAME: &str = "notification-relay";

pub struct HealthChecker {
    queues: Vec<String>,
    brokers: Vec<(String, watch::Receiver<BrokerHealth>)>,
    mailer: Arc<dyn MailSender>,
    mail_deadline: Duration,
}

impl HealthChecker {
    /// `mail_deadline` bounds the transport check so a stalled SMTP server
    /// cannot hold up the health endpoint.
    pub fn new(queues: Vec<String>, mailer: Arc<dyn MailSender>, mail_deadline: Duration) -> Self {
        Self {
            queues,
            brokers: Vec::new(),
            mailer,
            mail_deadline,
        }
    }

    pub fn with_broker(mut self, queue: impl Into<String>, health: watch::Receiver<BrokerHealth>) -> Self {
        self.brokers.push((queue.into(), health));
        self
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        for (queue, health) in &self.brokers {
            let broker_health = Self::check_broker(queue, &health.borrow());
            checks.insert(format!("message_broker:{}", queue), broker_health);
        }

        let mail_health = self.check_mailer().await;
        checks.insert("mail_transport".to_string(), mail_health);

        let overall_status = self.determine_overall_status(&checks);

        HealthCheckResponse {
            status: overall_status,
            service: SERVICE_NAME.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            queues: self.queues.clone(),
            checks,
        }
    }

    fn check_broker(queue: &str, health: &BrokerHealth) -> ServiceHealth {
        match health.state {
            BrokerState::Connected => ServiceHealth::healthy(0),
            BrokerState::Connecting => {
                debug!(queue, "Consumer still connecting");
                ServiceHealth::unhealthy("Consumer is connecting".to_string())
            }
            BrokerState::Reconnecting => ServiceHealth::unhealthy(
                health
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "Consumer is reconnecting".to_string()),
            )
            .with_reconnect_attempts(health.consecutive_failures),
        }
    }

    async fn check_mailer(&self) -> ServiceHealth {
        let start = Instant::now();

        let outcome = with_deadline(
            self.mail_deadline,
            "Mail transport check",
            self.mailer.health_check(),
        )
        .await;

        match outcome {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(
                    response_time_ms = elapsed,
                    sender = self.mailer.name(),
                    "Mail transport health check passed"
                );
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, sender = self.mailer.name(), "Mail transport health check failed");
                ServiceHealth::degraded(format!("Mail transport unavailable: {}", e))
            }
        }
    }

    fn determine_overall_status(&self, checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
        let has_unhealthy = checks
            .values()
            .any(|health| health.status == HealthStatus::Unhealthy);

        let has_degraded = checks
            .values()
            .any(|health| health.status == HealthStatus::Degraded);

        if has_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
