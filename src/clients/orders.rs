use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    models::{
        credential::BearerCredential,
        order::{OrderDetails, OrderStatusUpdateResult},
        retry::RetryConfig,
    },
    utils::retry_with_backoff,
};

#[async_trait]
pub trait OrderStatusClient: Send + Sync {
    /// Single attempt at moving an order to `status`.
    async fn update_status(&self, order_id: &str, status: &str) -> OrderStatusUpdateResult;

    /// Looks an order up; `Ok(None)` when the service does not know it.
    async fn fetch_order(&self, order_id: &str) -> Result<Option<OrderDetails>, Error>;
}

pub struct HttpOrderServiceClient {
    http_client: Client,
    base_url: Url,
    credential: Option<BearerCredential>,
    retry_config: RetryConfig,
}

impl HttpOrderServiceClient {
    pub fn new(config: &Config, credential: Option<BearerCredential>) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        let base_url = Url::parse(&config.orders_service_url).map_err(|e| {
            anyhow!(
                "Invalid orders service URL '{}': {}",
                config.orders_service_url,
                e
            )
        })?;

        if base_url.cannot_be_a_base() {
            return Err(anyhow!(
                "Orders service URL '{}' cannot be used as a base",
                config.orders_service_url
            ));
        }

        if credential.is_none() {
            warn!("No JWT_TOKEN configured, order status updates will fail");
        }

        info!(base_url = %base_url, "Order service client initialized");

        Ok(Self {
            http_client,
            base_url,
            credential,
            retry_config: config.retry_config(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "v1", "orders"]).extend(segments);
        }
        url
    }
}

#[async_trait]
impl OrderStatusClient for HttpOrderServiceClient {
    async fn update_status(&self, order_id: &str, status: &str) -> OrderStatusUpdateResult {
        let Some(credential) = &self.credential else {
            return OrderStatusUpdateResult::Failed {
                status_code: None,
                error_detail: "no bearer credential configured".to_string(),
            };
        };

        let url = self.endpoint(&[order_id, "state", status]);

        debug!(order_id, status, url = %url, "Updating order status");

        let response = match self
            .http_client
            .put(url)
            .bearer_auth(credential.token())
            .json(&serde_json::json!({}))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(order_id, error = %e, "Order status request failed");
                return OrderStatusUpdateResult::Failed {
                    status_code: None,
                    error_detail: e.to_string(),
                };
            }
        };

        let code = response.status();
        let body = response.text().await.unwrap_or_default();

        if code.is_success() {
            info!(order_id, status, "Order status updated");

            let response_data = if body.trim().is_empty() {
                JsonValue::Null
            } else {
                serde_json::from_str(&body).unwrap_or(JsonValue::String(body))
            };

            return OrderStatusUpdateResult::Updated { response_data };
        }

        if code == StatusCode::UNAUTHORIZED {
            warn!(
                order_id,
                "Order service rejected the bearer token (401). It is invalid or expired; \
                 generate a new one from the users service and update JWT_TOKEN"
            );
        }

        let error_detail = if body.trim().is_empty() {
            code.canonical_reason().unwrap_or("unknown status").to_string()
        } else {
            body
        };

        warn!(
            order_id,
            status_code = code.as_u16(),
            error = %error_detail,
            "Order status update rejected"
        );

        OrderStatusUpdateResult::Failed {
            status_code: Some(code.as_u16()),
            error_detail,
        }
    }

    async fn fetch_order(&self, order_id: &str) -> Result<Option<OrderDetails>, Error> {
        let url = self.endpoint(&[order_id]);

        debug!(order_id, url = %url, "Fetching order details");

        retry_with_backoff(&self.retry_config, || {
            let client = self.http_client.clone();
            let url = url.clone();
            let token = self.credential.as_ref().map(|c| c.token().to_string());

            async move {
                let mut request = client.get(url);
                if let Some(token) = token {
                    request = request.bearer_auth(token);
                }

                let response = request
                    .send()
                    .await
                    .map_err(|e| anyhow!("Order lookup failed: {}", e))?;

                let status = response.status();

                if status == StatusCode::NOT_FOUND {
                    return Ok(None);
                }

                if !status.is_success() {
                    return Err(anyhow!("Order service returned status {}", status));
                }

                let details = response
                    .json::<OrderDetails>()
                    .await
                    .map_err(|e| anyhow!("Failed to parse order JSON: {}", e))?;

                Ok(Some(details))
            }
        })
        .await
    }
}
