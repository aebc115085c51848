use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    clients::{health::HealthChecker, rbmq::RabbitMqClient},
    config::Config,
    dispatcher::EmailDispatcher,
    models::{
        email::{DeliveryResult, EmailNotification, EmailType},
        health::HealthStatus,
        payment::{PaymentEvent, deserialize_optional_order_id},
        response::{ApiResponse, QueueStats, TestEmailSent},
    },
};

pub struct AppState {
    pub config: Arc<Config>,
    pub health_checker: HealthChecker,
    pub dispatcher: Arc<EmailDispatcher>,
}

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    pub to: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<EmailType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatePaymentRequest {
    #[serde(default, deserialize_with = "deserialize_optional_order_id")]
    pub order_id: Option<String>,
    pub user_email: Option<String>,
    pub amount: Option<f64>,
    pub status: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/queue-status", get(queue_status))
        .route("/test-email", post(test_email))
        .route("/simulate-payment", post(simulate_payment))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(state: Arc<AppState>) -> Result<(), Error> {
    let addr = format!("0.0.0.0:{}", state.config.server_port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "HTTP server started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, closing HTTP listener");
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn queue_status(State(state): State<Arc<AppState>>) -> Response {
    match collect_queue_stats(&state.config).await {
        Ok(queues) => (
            StatusCode::OK,
            Json(ApiResponse::success(queues, "Queues are active".to_string())),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to inspect queues");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(
                    e.to_string(),
                    "Failed to inspect queue status".to_string(),
                )),
            )
                .into_response()
        }
    }
}

async fn collect_queue_stats(config: &Config) -> Result<BTreeMap<String, QueueStats>, Error> {
    let client = RabbitMqClient::connect(&config.rabbitmq_url, config.broker_timeout()).await?;

    let mut queues = BTreeMap::new();
    for queue in config.queue_names() {
        let stats = client.queue_stats(&queue).await?;
        queues.insert(queue, stats);
    }

    client.close().await?;

    Ok(queues)
}

async fn test_email(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TestEmailRequest>,
) -> Response {
    let notification = EmailNotification::new(
        request.to.unwrap_or_else(|| "test@example.com".to_string()),
        request
            .subject
            .unwrap_or_else(|| "Test email - Notification Service".to_string()),
        request
            .body
            .unwrap_or_else(|| "This is a test email from the notification service".to_string()),
        Some(request.kind.unwrap_or(EmailType::Test)),
    );

    match state.dispatcher.dispatch(&notification).await {
        DeliveryResult::Delivered { message_id } => (
            StatusCode::OK,
            Json(ApiResponse::success(
                TestEmailSent { message_id },
                "Test email sent".to_string(),
            )),
        )
            .into_response(),
        DeliveryResult::Failed { error } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error(
                error,
                "Failed to send test email".to_string(),
            )),
        )
            .into_response(),
    }
}

async fn simulate_payment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SimulatePaymentRequest>,
) -> Response {
    let Some(order_id) = request.order_id.filter(|id| !id.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(
                "orderId is required".to_string(),
                "Invalid payment simulation request".to_string(),
            )),
        )
            .into_response();
    };

    let event = PaymentEvent {
        user_email: Some(
            request
                .user_email
                .unwrap_or_else(|| format!("user{}@example.com", order_id)),
        ),
        amount: Some(request.amount.unwrap_or(50.0)),
        status: Some(request.status.unwrap_or_else(|| "completed".to_string())),
        timestamp: Some(Utc::now()),
        order_id,
    };

    info!(order_id = %event.order_id, "Simulating payment event");

    match publish_payment_event(&state.config, &event).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                event.clone(),
                format!("Payment event simulated for order {}", event.order_id),
            )),
        )
            .into_response(),
        Err(e) => {
            error!(order_id = %event.order_id, error = %e, "Failed to publish payment event");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(
                    e.to_string(),
                    "Failed to simulate payment".to_string(),
                )),
            )
                .into_response()
        }
    }
}

async fn publish_payment_event(config: &Config, event: &PaymentEvent) -> Result<(), Error> {
    let client = RabbitMqClient::connect(&config.rabbitmq_url, config.broker_timeout()).await?;
    let payload = serde_json::to_vec(event)?;

    client.declare_queue(&config.payment_queue).await?;
    client.publish(&config.payment_queue, &payload, 1).await?;
    client.close().await?;

    Ok(())
}
