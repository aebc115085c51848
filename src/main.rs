use std::sync::Arc;

use anyhow::{Error, Result};
use notification_relay::{
    api::{AppState, run_api_server},
    clients::health::HealthChecker,
    config::Config,
    consumers::supervisor::ConsumerSupervisor,
    context::ServiceContext,
    logging::init_tracing,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    init_tracing(config.log_format);

    let context = ServiceContext::from_config(config)?;
    let config = Arc::clone(&context.config);

    info!(
        rabbitmq_url = %config.rabbitmq_url,
        queues = ?config.queue_names(),
        orders_service_url = %config.orders_service_url,
        "Starting notification relay"
    );

    let email_supervisor =
        ConsumerSupervisor::new(&config, Arc::new(context.email_consumer()));
    let payment_supervisor =
        ConsumerSupervisor::new(&config, Arc::new(context.payment_orchestrator()));

    let health_checker = HealthChecker::new(
        config.queue_names(),
        Arc::clone(&context.mailer),
        config.health_check_timeout(),
    )
        .with_broker(email_supervisor.queue(), email_supervisor.health())
        .with_broker(payment_supervisor.queue(), payment_supervisor.health());

    tokio::spawn(email_supervisor.run());
    tokio::spawn(payment_supervisor.run());

    let state = Arc::new(AppState {
        config,
        health_checker,
        dispatcher: Arc::clone(&context.dispatcher),
    });

    run_api_server(state).await
}
