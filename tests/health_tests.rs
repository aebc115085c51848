use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use notification_relay::{
    clients::health::HealthChecker,
    models::health::{BrokerHealth, HealthStatus},
};
use tokio::sync::watch;

use crate::support::RecordingMailSender;

fn checker(mailer: Arc<RecordingMailSender>, deadline: Duration) -> (HealthChecker, watch::Sender<BrokerHealth>) {
    let (broker, broker_rx) = watch::channel(BrokerHealth::connected());
    let checker = HealthChecker::new(vec!["emails_queue".to_string()], mailer, deadline)
        .with_broker("emails_queue", broker_rx);

    (checker, broker)
}

/// Test: A stalled mail transport is reported degraded once the deadline passes
#[tokio::test]
async fn test_stalled_mail_transport_is_bounded() -> Result<()> {
    let mailer = RecordingMailSender::stalling_health(Duration::from_secs(30));
    let (checker, _broker) = checker(mailer, Duration::from_millis(100));

    let started = Instant::now();
    let response = checker.check_all().await;

    assert!(
        started.elapsed() < Duration::from_secs(5),
        "Health check took {:?}",
        started.elapsed()
    );

    let mail = &response.checks["mail_transport"];
    assert_eq!(mail.status, HealthStatus::Degraded);
    assert!(
        mail.error.as_deref().is_some_and(|error| error.contains("timed out")),
        "unexpected error: {:?}",
        mail.error
    );
    assert_eq!(response.status, HealthStatus::Degraded);

    Ok(())
}

/// Test: A transport that answers within the deadline is healthy
#[tokio::test]
async fn test_prompt_mail_transport_is_healthy() -> Result<()> {
    let mailer = RecordingMailSender::stalling_health(Duration::from_millis(10));
    let (checker, _broker) = checker(mailer, Duration::from_secs(2));

    let response = checker.check_all().await;

    assert_eq!(response.checks["mail_transport"].status, HealthStatus::Healthy);
    assert_eq!(response.checks["message_broker:emails_queue"].status, HealthStatus::Healthy);
    assert_eq!(response.status, HealthStatus::Healthy);

    Ok(())
}
