pub mod retry;

use std::time::Duration;

/// Request timeout for warehouse statements.
pub const WAREHOUSE_TIMEOUT_SECS: u64 = 60;
/// Request timeout for LLM completions, which can take a while.
pub const LLM_TIMEOUT_SECS: u64 = 120;
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Structured error for HTTP 429 responses, so retry logic can branch on the
/// type rather than on message text.
#[derive(Debug, thiserror::Error)]
#[error("rate limit exceeded, try again in {retry_after_secs}s (HTTP 429)")]
pub struct RateLimitedError {
    pub retry_after_secs: u64,
}

/// Build a blocking HTTP client with the given request timeout.
///
/// # Errors
///
/// Returns an error if the client cannot be constructed (e.g., invalid TLS config).
pub fn build_client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .map_err(|e| anyhow::anyhow!("could not build HTTP client: {e}"))
}

/// Consume a response and return it if the status is successful.
///
/// 401/403 become an error naming `service` and the credential to check;
/// 429 becomes a [`RateLimitedError`] carrying `Retry-After` (default 60 s);
/// any other non-2xx status includes the response body.
///
/// # Errors
///
/// Returns an error for any non-2xx status code.
pub fn require_success(
    resp: reqwest::blocking::Response,
    service: &str,
    credential_hint: &str,
) -> anyhow::Result<reqwest::blocking::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        anyhow::bail!("{service} returned HTTP {status}; check {credential_hint}");
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(RateLimitedError {
            retry_after_secs: retry_after,
        }
        .into());
    }
    if !status.is_success() {
        let text = resp
            .text()
            .map_err(|e| anyhow::anyhow!("could not read response body: {e}"))?;
        anyhow::bail!("{service} returned HTTP {status}: {text}");
    }
    Ok(resp)
}

/// Returns `true` if the URL uses HTTPS or targets localhost.
pub fn is_secure_url(url: &str) -> bool {
    if url.starts_with("https://") {
        return true;
    }
    url.starts_with("http://localhost") || url.starts_with("http://127.0.0.1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_urls() {
        assert!(is_secure_url("https://acme.snowflakecomputing.com"));
        assert!(is_secure_url("http://localhost:8080"));
        assert!(is_secure_url("http://127.0.0.1:1234"));
        assert!(!is_secure_url("http://acme.snowflakecomputing.com"));
    }

    #[test]
    fn rate_limited_display() {
        let err = RateLimitedError {
            retry_after_secs: 7,
        };
        assert_eq!(
            err.to_string(),
            "rate limit exceeded, try again in 7s (HTTP 429)"
        );
    }
}
