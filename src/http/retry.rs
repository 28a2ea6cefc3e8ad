use std::thread;
use std::time::Duration;

/// Maximum number of retry attempts after a 429 response.
const MAX_RETRIES: u32 = 3;

/// Minimum backoff between retries (seconds).
const BASE_BACKOFF_SECS: u64 = 1;

/// Execute `f` with exponential backoff and jitter on HTTP 429 responses.
///
/// Retries up to 3 times with delays of 1 s, 2 s, 4 s plus 0-499 ms of
/// jitter. A server-provided `Retry-After` raises the delay to
/// `max(computed_backoff, retry_after)`. Any other error is returned at once.
///
/// # Errors
///
/// Propagates the final error if all attempts fail or the first non-429 error.
pub fn with_retry<T, F>(operation: &str, f: F) -> anyhow::Result<T>
where
    F: FnMut() -> anyhow::Result<T>,
{
    with_retry_sleeping(operation, f, thread::sleep)
}

fn with_retry_sleeping<T, F, S>(operation: &str, mut f: F, mut sleep: S) -> anyhow::Result<T>
where
    F: FnMut() -> anyhow::Result<T>,
    S: FnMut(Duration),
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_rate_limited(&e) || attempt >= MAX_RETRIES {
                    return Err(e);
                }
                let backoff = backoff_secs(attempt, parse_retry_after(&e));
                attempt += 1;
                tracing::warn!(
                    operation,
                    attempt,
                    max = MAX_RETRIES,
                    "rate limited, retrying in {backoff}s"
                );
                sleep(Duration::from_secs(backoff) + Duration::from_millis(jitter()));
            }
        }
    }
}

fn backoff_secs(attempt: u32, retry_after: Option<u64>) -> u64 {
    let computed = BASE_BACKOFF_SECS << attempt;
    retry_after.map_or(computed, |ra| ra.max(computed))
}

/// Pseudo-random jitter in the range 0-499 ms.
fn jitter() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    u64::from(nanos % 500)
}

fn is_rate_limited(err: &anyhow::Error) -> bool {
    err.downcast_ref::<super::RateLimitedError>().is_some()
}

fn parse_retry_after(err: &anyhow::Error) -> Option<u64> {
    err.downcast_ref::<super::RateLimitedError>()
        .map(|e| e.retry_after_secs)
}
