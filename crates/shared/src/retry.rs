//! Generalizes the teacher's pure exponential-doubling delay formula into
//! the full backoff-with-jitter wrapper (spec 4.5): a predicate decides
//! whether a given error at a given attempt is worth retrying, and delay
//! grows as `min(base * 2^n + uniform(0, 1000ms), max)`.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

pub fn retry_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponential = base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
    exponential.saturating_add(jitter).min(max)
}

/// Total attempts = `max_retries + 1`. `should_retry` sees the error and
/// the attempt index that just failed (0-based); returning false stops
/// the loop immediately and reraises that error.
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    should_retry: impl Fn(&E, u32) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_retries || !should_retry(&err, attempt) {
                    return Err(err);
                }
                tokio::time::sleep(retry_delay(base_delay, max_delay, attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_and_is_capped() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(500);
        assert!(retry_delay(base, max, 0) >= base);
        assert!(retry_delay(base, max, 0) < base + Duration::from_millis(1000));
        assert_eq!(retry_delay(base, max, 10), max);
    }

    #[tokio::test]
    async fn stops_after_max_retries_total_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with_backoff(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("always fails") }
            },
            2,
            Duration::from_millis(1),
            Duration::from_millis(2),
            |_, _| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn should_retry_false_stops_immediately() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with_backoff(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("permanent") }
            },
            5,
            Duration::from_millis(1),
            Duration::from_millis(2),
            |_, _| false,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_without_retrying_on_first_try() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff::<_, _, _, &str>(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            },
            3,
            Duration::from_millis(1),
            Duration::from_millis(2),
            |_, _| true,
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
