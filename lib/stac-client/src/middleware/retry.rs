//! Retry middleware with capped exponential backoff.
//!
//! Transient failures (connection errors, timeouts, `429` and `5xx`) are
//! retried for both `GET` and `POST`; a search is read-only, so resending its
//! body is safe.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Sleep;
use tower::retry::Policy;
use tracing::debug;

use crate::{Error, Request, Response};

/// Delay schedule: `base`, `2 * base`, `4 * base`, ... never above `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    /// Schedule starting at `base` and capped at `max`.
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        2_u32
            .checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(5))
    }
}

/// Retry policy for [`tower::retry::RetryLayer`].
///
/// `tower` clones the policy for every request, so each request starts with
/// the full retry budget.
///
/// # Example
///
/// ```ignore
/// use stac_client::middleware::{Backoff, RetryPolicy};
/// use tower::retry::RetryLayer;
///
/// let layer = RetryLayer::new(RetryPolicy::new(3, Backoff::default()));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    remaining: u32,
    attempt: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Policy allowing `max_retries` retries.
    #[must_use]
    pub const fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            remaining: max_retries,
            attempt: 0,
            backoff,
        }
    }

    fn should_retry_response(response: &Response<Bytes>) -> bool {
        response.is_transient()
    }

    fn should_retry_error(error: &Error) -> bool {
        error.is_connection() || error.is_timeout()
    }
}

impl Policy<Request<Bytes>, Response<Bytes>, Error> for RetryPolicy {
    type Future = Sleep;

    fn retry(
        &mut self,
        req: &mut Request<Bytes>,
        result: &mut Result<Response<Bytes>, Error>,
    ) -> Option<Self::Future> {
        if self.remaining == 0 {
            return None;
        }

        let should_retry = match result {
            Ok(response) => Self::should_retry_response(response),
            Err(error) => Self::should_retry_error(error),
        };
        if !should_retry {
            return None;
        }

        let delay = self.backoff.delay(self.attempt);
        self.remaining -= 1;
        self.attempt += 1;
        debug!(
            attempt = self.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            url = %req.url(),
            "retrying request"
        );
        Some(tokio::time::sleep(delay))
    }

    fn clone_request(&mut self, req: &Request<Bytes>) -> Option<Request<Bytes>> {
        Some(req.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(0), Duration::from_millis(200));
        assert_eq!(backoff.delay(1), Duration::from_millis(400));
        assert_eq!(backoff.delay(2), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_millis(3200));
        assert_eq!(backoff.delay(5), Duration::from_secs(5));
        assert_eq!(backoff.delay(40), Duration::from_secs(5));
    }

    #[test]
    fn retries_transient_responses() {
        for status in [429, 500, 502, 503, 504] {
            let response = Response::new(status, HashMap::default(), Bytes::new());
            assert!(RetryPolicy::should_retry_response(&response), "{status}");
        }
    }

    #[test]
    fn does_not_retry_other_responses() {
        for status in [200, 400, 404, 405] {
            let response = Response::new(status, HashMap::default(), Bytes::new());
            assert!(!RetryPolicy::should_retry_response(&response), "{status}");
        }
    }

    #[test]
    fn retries_connection_errors_and_timeouts() {
        assert!(RetryPolicy::should_retry_error(&Error::connection("refused")));
        assert!(RetryPolicy::should_retry_error(&Error::Timeout));
        assert!(!RetryPolicy::should_retry_error(&Error::invalid_search("bad")));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_is_spent_per_retry() {
        let url = url::Url::parse("https://stac.example.com/search").expect("url");
        let mut request = Request::builder(crate::Method::Get, url).build();
        let mut policy = RetryPolicy::new(2, Backoff::default());

        for _ in 0..2 {
            let mut result = Err(Error::Timeout);
            let sleep = policy.retry(&mut request, &mut result).expect("retry");
            sleep.await;
        }
        let mut result = Err(Error::Timeout);
        assert!(policy.retry(&mut request, &mut result).is_none());
    }
}
