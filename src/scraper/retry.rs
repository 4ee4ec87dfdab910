//! Retry wrapper for page loads and waits.
//!
//! Only transient failures are retried. Anything else (parse errors, HTTP
//! 404, bad selectors) goes straight back to the caller so extraction bugs
//! are not hidden behind repeated attempts.

use anyhow::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tracing::warn;

use crate::config::ScraperConfig;

/// Lower-case substrings that mark an error as transient.
pub const TRANSIENT_PATTERNS: [&str; 4] = ["timeout", "network", "navigation", "element not found"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Linear back-off: base × 1, base × 2, … one entry per retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let base = self.base_delay;
        (1..=self.max_retries).map(move |attempt| base * attempt)
    }
}

/// True when the error text (context chain included) names a transient
/// failure.
pub fn is_recoverable(err: &Error) -> bool {
    let text = format!("{:#}", err).to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| text.contains(p))
}

/// Run `op`, retrying transient failures according to `policy`.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let total = policy.max_retries + 1;
    let mut attempt = 0u32;

    let outcome = RetryIf::spawn(
        policy.delays(),
        || op(),
        |e: &Error| {
            attempt += 1;
            let retry = is_recoverable(e);
            if retry {
                warn!("{} failed, attempt {}/{}: {:#}", op_name, attempt, total, e);
            }
            retry
        },
    )
    .await;

    outcome.map_err(|e| {
        if is_recoverable(&e) {
            e.context(format!("{} failed after {} attempts", op_name, total))
        } else {
            e
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_default_delays_are_linear() {
        let delays: Vec<Duration> = RetryPolicy::default().delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(6000)
            ]
        );
    }

    #[test]
    fn test_classification() {
        assert!(is_recoverable(&anyhow!("Navigation timeout of 30000ms exceeded")));
        assert!(is_recoverable(&anyhow!("Network error: connection reset")));
        assert!(is_recoverable(&anyhow!("Element not found: .css-1b38kx6")));
        assert!(!is_recoverable(&anyhow!("Unexpected token in JSON")));
        assert!(!is_recoverable(&ScrapeError::HttpStatus { url: "u".into(), status: 404 }.into()));

        // Context on top of a transient cause still counts.
        let wrapped = anyhow::Error::from(ScrapeError::Timeout { url: "u".into(), timeout_ms: 30_000 })
            .context("load suburb page");
        assert!(is_recoverable(&wrapped));
    }

    #[tokio::test]
    async fn test_transient_error_is_retried_until_exhausted() {
        let calls = AtomicU32::new(0);
        let res: Result<()> = with_retry(fast_policy(), "load page", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow!("Navigation timeout of 30000ms exceeded")) }
        })
        .await;

        let err = res.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(format!("{:#}", err).contains("failed after 4 attempts"));
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let res: Result<()> = with_retry(fast_policy(), "parse", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow!("Unexpected token in JSON")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(res.unwrap_err().to_string(), "Unexpected token in JSON");
    }

    #[test]
    fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let res = tokio_test::block_on(with_retry(fast_policy(), "load page", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(anyhow!("network error: connection reset"))
                } else {
                    Ok(n)
                }
            }
        }));

        assert_eq!(res.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
