use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use anyhow::{Result, anyhow};
use notification_relay::{
    models::retry::RetryConfig,
    utils::{Backoff, retry_with_backoff, with_deadline},
};
use tokio::time::{Duration, Instant, sleep};
use tokio_test::{assert_err, assert_ok};

use crate::support::test_config;

fn lookup_config(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 50,
        max_delay_ms: 500,
        backoff_multiplier: 2,
    }
}

/// Test: Successful lookups complete without retry
#[tokio::test]
async fn test_successful_operation_no_retry() -> Result<()> {
    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_with_backoff(&lookup_config(3), || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>("order")
        }
    })
    .await?;

    assert_eq!(result, "order");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 1, "Should only attempt once");

    Ok(())
}

/// Test: Transient failures are retried until one succeeds
#[tokio::test]
async fn test_transient_failures_are_retried() -> Result<()> {
    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_with_backoff(&lookup_config(5), || {
        let counter = Arc::clone(&counter);
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow!("connection reset"))
            } else {
                Ok("order")
            }
        }
    })
    .await;

    assert_eq!(assert_ok!(result), "order");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3, "Two failures then a success");

    Ok(())
}

/// Test: Permanent failures stop at the attempt bound
#[tokio::test]
async fn test_permanent_failure_exhausts_retries() -> Result<()> {
    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_with_backoff(&lookup_config(4), || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(anyhow!("Order service returned status 503"))
        }
    })
    .await;

    assert_err!(result);
    assert_eq!(
        attempt_count.load(Ordering::SeqCst),
        4,
        "Should attempt exactly max_attempts times"
    );

    Ok(())
}

/// Test: Retry delays follow exponential backoff within the jitter band
#[tokio::test]
async fn test_exponential_backoff_timing() -> Result<()> {
    let config = RetryConfig {
        max_attempts: 4,
        initial_delay_ms: 100,
        max_delay_ms: 1000,
        backoff_multiplier: 2,
    };

    let start = Instant::now();
    let attempt_times = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let times = Arc::clone(&attempt_times);

    let _ = retry_with_backoff(&config, || {
        let times = Arc::clone(&times);
        async move {
            times.lock().await.push(start.elapsed().as_millis());
            Err::<String, _>(anyhow!("Fail"))
        }
    })
    .await;

    let times = attempt_times.lock().await;

    assert_eq!(times.len(), 4);
    assert!(times[0] < 50, "First attempt should be immediate");

    for i in 1..times.len() {
        let delay = times[i] - times[i - 1];
        let nominal = config.initial_delay_ms * config.backoff_multiplier.pow(i as u32 - 1);

        assert!(
            delay >= (nominal * 8 / 10) as u128 && delay <= (nominal * 13 / 10) as u128,
            "Delay {} of {}ms is outside the band around {}ms",
            i,
            delay,
            nominal
        );
    }

    Ok(())
}

/// Test: The schedule grows by the multiplier and stops at the cap
#[test]
fn test_backoff_is_capped() {
    let mut backoff = Backoff::new(&RetryConfig {
        max_attempts: u32::MAX,
        initial_delay_ms: 5_000,
        max_delay_ms: 60_000,
        backoff_multiplier: 2,
    });

    let nominal = [5_000u64, 10_000, 20_000, 40_000, 60_000, 60_000, 60_000];

    for expected in nominal {
        let delay = backoff.next_delay().as_millis() as u64;
        assert!(
            delay >= expected * 9 / 10 && delay <= expected * 11 / 10,
            "Delay {}ms should be within 10% of {}ms",
            delay,
            expected
        );
    }
}

/// Test: A reset starts the schedule over from the initial delay
#[test]
fn test_backoff_reset_restarts_schedule() {
    let mut backoff = Backoff::new(&lookup_config(3));

    for _ in 0..5 {
        backoff.next_delay();
    }
    backoff.reset();

    let delay = backoff.next_delay().as_millis() as u64;
    assert!((45..=55).contains(&delay), "Expected ~50ms after reset, got {}ms", delay);
}

/// Test: Reconnect delays come from configuration
#[test]
fn test_reconnect_schedule_uses_configured_delays() {
    let config = test_config(&[
        ("RECONNECT_INITIAL_DELAY_MS", "1000"),
        ("RECONNECT_MAX_DELAY_MS", "4000"),
    ]);

    let mut backoff = Backoff::new(&config.reconnect_config());
    let delays: Vec<u64> = (0..4)
        .map(|_| backoff.next_delay().as_millis() as u64)
        .collect();

    assert!(delays[0] >= 900 && delays[0] <= 1100);
    assert!(delays[3] >= 3600 && delays[3] <= 4400, "Capped at 4000ms");
}

/// Test: Retry state is independent per operation
#[tokio::test]
async fn test_retry_state_independence() -> Result<()> {
    let config = Arc::new(lookup_config(5));

    let config1 = Arc::clone(&config);
    let handle1 = tokio::spawn(async move {
        retry_with_backoff(&config1, || async { Err::<String, _>(anyhow!("Always fail")) }).await
    });

    let config2 = Arc::clone(&config);
    let counter2 = Arc::new(AtomicU32::new(0));
    let counter2_clone = Arc::clone(&counter2);
    let handle2 = tokio::spawn(async move {
        retry_with_backoff(&config2, || {
            let counter = Arc::clone(&counter2_clone);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(anyhow!("Fail"))
                } else {
                    Ok("success")
                }
            }
        })
        .await
    });

    let (result1, result2) = tokio::join!(handle1, handle2);

    assert!(result1?.is_err(), "Operation 1 should fail");
    assert!(result2?.is_ok(), "Operation 2 should succeed");
    assert_eq!(counter2.load(Ordering::SeqCst), 3);

    Ok(())
}

/// Test: Operations that outlive their deadline fail with a timeout error
#[tokio::test]
async fn test_deadline_bounds_slow_operations() -> Result<()> {
    let result = with_deadline(Duration::from_millis(20), "SMTP send", async {
        sleep(Duration::from_secs(5)).await;
        Ok(())
    })
    .await;

    let error = assert_err!(result);
    assert_eq!(error.to_string(), "SMTP send timed out after 20ms");

    let fast = with_deadline(Duration::from_secs(1), "Queue declare", async { Ok(7) }).await;
    assert_eq!(assert_ok!(fast), 7);

    Ok(())
}
