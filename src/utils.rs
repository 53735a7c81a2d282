use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use backoff::{future::retry, ExponentialBackoff};
use log::warn;

/// Run `f`, retrying up to `max_retries` more times when it fails.
///
/// `max_retries == 0` means a single attempt. Only call this for requests
/// that are safe to repeat: a label request that timed out may still have
/// been billed by the carrier.
pub async fn retry_wrapper<I, E, F, Fut>(max_retries: usize, f: F) -> Result<I, E>
where
    E: std::fmt::Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<I, E>>,
{
    let attempts = AtomicUsize::new(0);
    retry(backoff_config(), || async {
        let attempt = attempts.fetch_add(1, Ordering::AcqRel) + 1;
        if attempt > 1 {
            warn!("retrying for the {} time", attempt - 1);
        }
        f().await
            .map_err(|err| map_to_backoff_err(err, attempt, max_retries))
    })
        .await
}

fn map_to_backoff_err<E: std::fmt::Display>(err: E, attempt: usize, max_retries: usize) -> backoff::Error<E> {
    if attempt > max_retries {
        backoff::Error::permanent(err)
    } else {
        warn!("attempt {} failed: {}", attempt, err);
        backoff::Error::transient(err)
    }
}

#[inline]
fn backoff_config() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(200),
        max_interval: Duration::from_millis(2000),
        ..Default::default()
    }
}
