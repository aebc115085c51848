use std::future::Future;

use anyhow::{Error, Result, anyhow};
use tokio::time::{Duration, sleep, timeout};
use tracing::{debug, info, warn};

use crate::models::retry::RetryConfig;

/// Exponential delay schedule with +-10% jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: u64,
    current_ms: u64,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            initial_delay_ms: config.initial_delay_ms,
            max_delay_ms: config.max_delay_ms,
            multiplier: config.backoff_multiplier.max(1),
            current_ms: config.initial_delay_ms,
        }
    }

    /// Returns the next delay and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let jitter = rand::random_range(-0.1..=0.1);
        let jittered_delay = (self.current_ms as f64 * (1.0 + jitter)) as u64;

        self.current_ms = std::cmp::min(
            self.current_ms.saturating_mul(self.multiplier),
            self.max_delay_ms,
        );

        Duration::from_millis(jittered_delay)
    }

    pub fn reset(&mut self) {
        self.current_ms = self.initial_delay_ms;
    }
}

pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut backoff = Backoff::new(config);

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        attempt,
                        max_attempts = config.max_attempts,
                        "Retry succeeded"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    warn!(
                        max_attempts = config.max_attempts,
                        error = %e,
                        "Retry failed after exhausting all attempts"
                    );
                    return Err(e);
                }

                let delay = backoff.next_delay();

                debug!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retry attempt failed, backing off"
                );

                sleep(delay).await;
            }
        }
    }
}

/// Runs a remote operation under a deadline.
pub async fn with_deadline<Fut, T>(deadline: Duration, operation: &str, future: Fut) -> Result<T, Error>
where
    Fut: Future<Output = Result<T, Error>>,
{
    match timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!(
            "{} timed out after {}ms",
            operation,
            deadline.as_millis()
        )),
    }
}

/// Drops `<...>` tags, keeping the text between them. A `<` that is never
/// closed is kept as text.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        match rest[start..].find('>') {
            Some(end) => {
                text.push_str(&rest[..start]);
                rest = &rest[start + end + 1..];
            }
            None => break,
        }
    }

    text.push_str(rest);
    text
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }

    escaped
}
