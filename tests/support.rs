use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use notification_relay::{
    clients::{mailer::MailSender, orders::OrderStatusClient},
    config::Config,
    context::ServiceContext,
    models::{
        email::{DeliveryResult, OutboundEmail},
        order::{OrderDetails, OrderStatusUpdateResult},
    },
};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

/// Mail sender that records what it was asked to send and fails on demand.
pub struct RecordingMailSender {
    sent: Mutex<Vec<OutboundEmail>>,
    failures_remaining: Mutex<u32>,
    attempts: AtomicU32,
    healthy: bool,
    health_delay: Option<Duration>,
}

impl RecordingMailSender {
    pub fn new() -> Arc<Self> {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            failures_remaining: Mutex::new(failures),
            attempts: AtomicU32::new(0),
            healthy: true,
            health_delay: None,
        })
    }

    pub fn always_failing() -> Arc<Self> {
        Self::failing_first(u32::MAX)
    }

    pub fn unhealthy() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            failures_remaining: Mutex::new(0),
            attempts: AtomicU32::new(0),
            healthy: false,
            health_delay: None,
        })
    }

    /// Health checks hang for `delay` before answering.
    pub fn stalling_health(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            failures_remaining: Mutex::new(0),
            attempts: AtomicU32::new(0),
            healthy: true,
            health_delay: Some(delay),
        })
    }

    pub async fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailSender for RecordingMailSender {
    async fn send(&self, email: &OutboundEmail) -> DeliveryResult {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let mut failures = self.failures_remaining.lock().await;
        if *failures > 0 {
            *failures -= 1;
            return DeliveryResult::Failed {
                error: "simulated SMTP failure".to_string(),
            };
        }

        self.sent.lock().await.push(email.clone());

        DeliveryResult::Delivered {
            message_id: format!("<test-{}@example.com>", attempt),
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }

    async fn health_check(&self) -> Result<(), Error> {
        if let Some(delay) = self.health_delay {
            tokio::time::sleep(delay).await;
        }

        if self.healthy {
            Ok(())
        } else {
            Err(anyhow!("connection refused"))
        }
    }
}

/// Order service stand-in with a fixed answer for each call.
pub struct FakeOrderClient {
    update: OrderStatusUpdateResult,
    order: Option<OrderDetails>,
    lookup_fails: bool,
    updates: Mutex<Vec<(String, String)>>,
    lookups: AtomicU32,
}

impl FakeOrderClient {
    pub fn updating() -> Self {
        Self {
            update: OrderStatusUpdateResult::Updated {
                response_data: serde_json::json!({ "status": "paid" }),
            },
            order: None,
            lookup_fails: false,
            updates: Mutex::new(Vec::new()),
            lookups: AtomicU32::new(0),
        }
    }

    pub fn failing(status_code: Option<u16>, detail: &str) -> Self {
        Self {
            update: OrderStatusUpdateResult::Failed {
                status_code,
                error_detail: detail.to_string(),
            },
            ..Self::updating()
        }
    }

    pub fn with_order_email(mut self, email: &str) -> Self {
        self.order = Some(OrderDetails {
            user_email: Some(email.to_string()),
            ..Default::default()
        });
        self
    }

    pub fn with_failing_lookup(mut self) -> Self {
        self.lookup_fails = true;
        self
    }

    pub async fn updates(&self) -> Vec<(String, String)> {
        self.updates.lock().await.clone()
    }

    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStatusClient for FakeOrderClient {
    async fn update_status(&self, order_id: &str, status: &str) -> OrderStatusUpdateResult {
        self.updates
            .lock()
            .await
            .push((order_id.to_string(), status.to_string()));
        self.update.clone()
    }

    async fn fetch_order(&self, _order_id: &str) -> Result<Option<OrderDetails>, Error> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if self.lookup_fails {
            return Err(anyhow!("order service unavailable"));
        }

        Ok(self.order.clone())
    }
}

/// Unsigned token whose payload segment carries `claims`.
pub fn token_with_claims(claims: JsonValue) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

pub fn test_config(vars: &[(&str, &str)]) -> Config {
    Config::from_vars(vars.iter().map(|(k, v)| (k.to_lowercase(), v.to_string())))
        .expect("test configuration should be valid")
}

pub fn test_context(
    vars: &[(&str, &str)],
    mailer: Arc<RecordingMailSender>,
    orders: Arc<FakeOrderClient>,
) -> ServiceContext {
    ServiceContext::with_collaborators(test_config(vars), mailer, orders)
}
