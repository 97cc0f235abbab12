// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared HTTP retry policy for all streaming drivers.
//!
//! Transport failures and HTTP 429 are retried with exponential backoff
//! (5 s, 10 s, 20 s, 40 s, capped at 60 s) plus up to one second of jitter.
//! A parseable `Retry-After` header overrides the computed delay.  After
//! five attempts the failure is handed back to the driver, which surfaces
//! it as a terminal error event.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

pub(crate) const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_CAP_SECS: u64 = 60;

/// Why a request could not be completed within the retry budget.
#[derive(Debug, thiserror::Error)]
pub(crate) enum RequestError {
    #[error("HTTP 429 rate_limit after {attempts} attempts{}: {body}",
        retry_after.map(|s| format!("; retry-after: {s}")).unwrap_or_default())]
    RateLimited {
        attempts: u32,
        retry_after: Option<u64>,
        body: String,
    },
    #[error("transport error after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        source: reqwest::Error,
    },
}

/// Exponential backoff schedule: 5 s, 10 s, 20 s, 40 s, 60 s (cap).
/// `attempt` is 1-based (the attempt that just failed).
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let secs = 5u64.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(4));
    Duration::from_secs(secs.min(BACKOFF_CAP_SECS))
}

/// Up to one second of uniform jitter, added to every computed delay.
pub(crate) fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..=1000))
}

/// Parse a `Retry-After` header as delay-seconds.  HTTP-date values are not
/// parsed; callers fall back to the computed backoff.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Send a request built by `build`, retrying transport errors and HTTP 429.
///
/// Any other response — success or error status — is returned to the caller
/// untouched; non-429 error statuses are not retryable and terminate the
/// run at the driver level.
pub(crate) async fn send_with_retry<F>(
    driver: &str,
    mut build: F,
) -> Result<reqwest::Response, RequestError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match build().send().await {
            Ok(resp) if resp.status().as_u16() == 429 => {
                let retry_after = parse_retry_after(resp.headers());
                if attempt >= MAX_ATTEMPTS {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(RequestError::RateLimited {
                        attempts: attempt,
                        retry_after,
                        body,
                    });
                }
                let delay = retry_after
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| backoff_delay(attempt));
                warn!(
                    driver,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "rate limited; backing off"
                );
                tokio::time::sleep(delay + jitter()).await;
            }
            Ok(resp) => return Ok(resp),
            Err(e) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(RequestError::Transport {
                        attempts: attempt,
                        source: e,
                    });
                }
                let delay = backoff_delay(attempt);
                warn!(
                    driver,
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "transport error; backing off"
                );
                tokio::time::sleep(delay + jitter()).await;
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(5));
        assert_eq!(backoff_delay(2), Duration::from_secs(10));
        assert_eq!(backoff_delay(3), Duration::from_secs(20));
        assert_eq!(backoff_delay(4), Duration::from_secs(40));
        assert_eq!(backoff_delay(5), Duration::from_secs(60));
        assert_eq!(backoff_delay(9), Duration::from_secs(60), "cap holds beyond the schedule");
    }

    #[test]
    fn jitter_stays_under_one_second() {
        for _ in 0..100 {
            assert!(jitter() <= Duration::from_secs(1));
        }
    }

    #[test]
    fn retry_after_parses_delay_seconds() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(7));
    }

    #[test]
    fn retry_after_absent_is_none() {
        let headers = reqwest::header::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn retry_after_http_date_is_ignored() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::RETRY_AFTER,
            "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn rate_limited_error_mentions_429_and_retry_after() {
        let err = RequestError::RateLimited {
            attempts: 5,
            retry_after: Some(3),
            body: "slow down".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("429"), "{msg}");
        assert!(msg.contains("rate_limit"), "{msg}");
        assert!(msg.contains("retry-after: 3"), "{msg}");
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_exhausts_attempts() {
        // Port 1 refuses immediately; paused time auto-advances through the
        // backoff sleeps so the full five-attempt budget runs instantly.
        let client = reqwest::Client::new();
        let result = send_with_retry("test", move || client.post("http://127.0.0.1:1/x")).await;
        match result {
            Err(RequestError::Transport { attempts, .. }) => assert_eq!(attempts, MAX_ATTEMPTS),
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
