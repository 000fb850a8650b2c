//! Retry logic with exponential backoff for provider and JWKS HTTP requests.
//!
//! Handles transient failures: 5xx responses, rate limiting, and connection
//! errors. There is no circuit breaker here — a single unhealthy upstream
//! provider is expected to be rare enough that bounded retries are
//! sufficient, and a circuit breaker would add cross-request state this
//! proxy otherwise has no need for.

use std::{future::Future, time::Duration};

use rand::Rng;
use reqwest::StatusCode;
use tracing::{debug, warn};

/// Backoff shape applied between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// `base_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    Exponential,
    /// Always `base_delay`, regardless of attempt number.
    Fixed,
    /// Exponential, but the delay is a uniform random value in `[0, computed]`.
    RandomJitter,
}

/// A retry budget shared by every call site that hits a given upstream.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Add up to +/-20% jitter on top of the strategy's computed delay.
    pub jitter: bool,
    pub strategy: RetryStrategy,
}

impl RetryPolicy {
    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: 4,
            base_delay,
            max_delay,
            backoff_multiplier: 2.0,
            jitter: true,
            strategy: RetryStrategy::Exponential,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let computed = match self.strategy {
            RetryStrategy::Fixed => self.base_delay,
            RetryStrategy::Exponential | RetryStrategy::RandomJitter => {
                let scaled = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
                Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
            }
        };

        if self.strategy == RetryStrategy::RandomJitter {
            let frac: f64 = rand::thread_rng().gen_range(0.0..=1.0);
            return Duration::from_secs_f64(computed.as_secs_f64() * frac);
        }

        if self.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.8..=1.2);
            return Duration::from_secs_f64((computed.as_secs_f64() * factor).min(self.max_delay.as_secs_f64()));
        }

        computed
    }
}

/// The default retry budget for chat/completion calls to an LLM provider.
pub fn default_llm_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(120),
        backoff_multiplier: 2.0,
        jitter: true,
        strategy: RetryStrategy::Exponential,
    }
}

/// The retry budget for JWKS fetches: faster and tighter, since a stalled
/// JWKS fetch blocks every authenticated request.
pub fn keycloak_jwks_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(8),
        backoff_multiplier: 2.0,
        jitter: true,
        strategy: RetryStrategy::Exponential,
    }
}

/// HTTP status codes considered transient and worth retrying.
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        429 | 500 | 502 | 503 | 504 | 507 | 509 | 520..=524
    )
}

/// Connection-level reqwest errors worth retrying: timeouts and connect
/// failures. Already-received non-2xx responses are judged separately via
/// [`is_retryable_status`].
pub fn is_retryable_error(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }
    if let Some(source) = error.source_io_error() {
        return source.kind() == std::io::ErrorKind::ConnectionReset;
    }
    false
}

trait ReqwestErrorExt {
    fn source_io_error(&self) -> Option<&std::io::Error>;
}

impl ReqwestErrorExt for reqwest::Error {
    fn source_io_error(&self) -> Option<&std::io::Error> {
        use std::error::Error as _;
        let mut source = self.source();
        while let Some(err) = source {
            if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
                return Some(io_err);
            }
            source = err.source();
        }
        None
    }
}

/// Error produced by a provider request after the retry budget is spent.
/// The last error is re-raised untouched; this wrapper only exists so
/// callers have a single type to match on.
#[derive(Debug, thiserror::Error)]
pub enum ProviderRequestError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

/// Run `make_request` until it succeeds, returns a non-retryable status, or
/// the policy's attempt budget is exhausted. The last error/response is
/// returned untouched — callers see exactly what the upstream sent.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    provider_name: &str,
    operation: &str,
    make_request: F,
) -> Result<T, ProviderRequestError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderRequestError>>,
    T: HasStatus,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 0..max_attempts {
        let result = make_request().await;
        let is_last = attempt + 1 == max_attempts;

        match result {
            Ok(value) => {
                if !is_last
                    && let Some(status) = value.status()
                    && is_retryable_status(status)
                {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        provider = provider_name,
                        operation, %status, attempt = attempt + 1, max_attempts, delay_ms = delay.as_millis(),
                        "retryable status, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                if attempt > 0 {
                    debug!(provider = provider_name, operation, attempt = attempt + 1, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(ProviderRequestError::Request(err)) => {
                if !is_last && is_retryable_error(&err) {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        provider = provider_name,
                        operation, error = %err, attempt = attempt + 1, max_attempts, delay_ms = delay.as_millis(),
                        "retryable error, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                if attempt > 0 {
                    warn!(provider = provider_name, operation, error = %err, attempts = attempt + 1, "request failed after all retries");
                }
                return Err(ProviderRequestError::Request(err));
            }
        }
    }

    unreachable!("retry loop always returns on its last attempt")
}

/// Lets [`with_retry`] work over either a bare `reqwest::Response` or any
/// wrapper type that knows its own HTTP status.
pub trait HasStatus {
    fn status(&self) -> Option<StatusCode>;
}

impl HasStatus for reqwest::Response {
    fn status(&self) -> Option<StatusCode> {
        Some(reqwest::Response::status(self))
    }
}

/// Run a non-HTTP fallible operation with the same backoff shape as
/// [`with_retry`], using a caller-supplied retryability predicate.
pub async fn with_retry_generic<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: P,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 0..max_attempts {
        let result = operation().await;
        let is_last = attempt + 1 == max_attempts;

        match result {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation = operation_name, attempt = attempt + 1, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if !is_last && is_retryable(&error) {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        operation = operation_name,
                        error = %error, attempt = attempt + 1, max_attempts, delay_ms = delay.as_millis(),
                        "retryable error, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                if attempt > 0 {
                    warn!(operation = operation_name, error = %error, attempts = attempt + 1, "operation failed after all retries");
                }
                return Err(error);
            }
        }
    }

    unreachable!("retry loop always returns on its last attempt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_status_set_matches_spec() {
        for code in [429, 500, 502, 503, 504, 507, 509, 520, 524] {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()), "{code} should retry");
        }
        for code in [200, 400, 401, 403, 404, 409] {
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()), "{code} should not retry");
        }
    }

    #[test]
    fn exponential_delay_without_jitter() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: false,
            strategy: RetryStrategy::Exponential,
        };
        assert_eq!(policy.delay_for_attempt(0).as_millis(), 100);
        assert_eq!(policy.delay_for_attempt(1).as_millis(), 200);
        assert_eq!(policy.delay_for_attempt(2).as_millis(), 400);
    }

    #[test]
    fn delay_capped_at_max() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 10.0,
            jitter: false,
            strategy: RetryStrategy::Exponential,
        };
        assert_eq!(policy.delay_for_attempt(5).as_millis(), 5000);
    }

    #[test]
    fn fixed_strategy_ignores_attempt_number() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: false,
            strategy: RetryStrategy::Fixed,
        };
        assert_eq!(policy.delay_for_attempt(0), policy.delay_for_attempt(4));
    }

    #[test]
    fn default_llm_policy_matches_spec_constants() {
        let policy = default_llm_retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.max_delay, Duration::from_secs(120));
        assert_eq!(policy.strategy, RetryStrategy::Exponential);
    }

    #[test]
    fn default_jwks_policy_matches_spec_constants() {
        let policy = keycloak_jwks_retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(8));
    }

    #[tokio::test]
    async fn with_retry_generic_succeeds_after_transient_errors() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: false,
            strategy: RetryStrategy::Exponential,
        };
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<i32, String> = with_retry_generic(&policy, "op", |_| true, || {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move { if n < 2 { Err("transient".to_string()) } else { Ok(42) } }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_generic_reraises_last_error_on_exhaustion() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
            strategy: RetryStrategy::Exponential,
        };
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<i32, String> = with_retry_generic(&policy, "op", |_| true, || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err("permanent".to_string()) }
        })
        .await;
        assert_eq!(result.unwrap_err(), "permanent");
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn with_retry_generic_skips_non_retryable_errors() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
            strategy: RetryStrategy::Exponential,
        };
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<i32, String> = with_retry_generic(&policy, "op", |e: &String| !e.contains("permanent"), || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err("permanent failure".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
