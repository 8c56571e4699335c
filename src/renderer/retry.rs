//! Retry with exponential backoff at the renderer-call boundary.
//!
//! [`RetryRenderer`] wraps any [`PageRenderer`] and applies one
//! [`RetryPolicy`] to every call, so no other code carries its own retry loop.
//!
//! # Retry Strategy
//!
//! - Only [`RenderError::Transient`] failures are retried
//! - At most `max_attempts` calls in total per operation (3 by default)
//! - Delay doubles from `base_delay`, capped at `max_delay`
//! - Random jitter (0-250ms by default) added to every delay
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```

use super::PageRenderer;
use crate::error::RenderError;
use rand::{Rng, rng};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// Which failures are retried, how often, and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls per operation, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles with each further attempt.
    pub base_delay: Duration,
    /// Upper bound on the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Whether `error` qualifies for another attempt after `attempt` calls.
    pub fn should_retry(&self, error: &RenderError, attempt: u32) -> bool {
        error.is_transient() && attempt < self.max_attempts
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=jitter_ms)
        };
        self.backoff(attempt) + Duration::from_millis(jitter)
    }
}

/// Decorator applying a [`RetryPolicy`] to every call of the inner renderer.
pub struct RetryRenderer<R> {
    inner: R,
    policy: RetryPolicy,
    /// Backoff-and-retry cycles performed so far, across all operations.
    retries: u32,
}

impl<R: PageRenderer> RetryRenderer<R> {
    pub fn new(inner: R, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            retries: 0,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Decide what to do with a failed call: sleep and return `Ok` to try
    /// again, or hand the error back.
    async fn backoff(
        &mut self,
        operation: &'static str,
        attempt: &mut u32,
        err: RenderError,
    ) -> Result<(), RenderError> {
        *attempt += 1;
        if !err.is_transient() {
            error!(operation, error = %err, "Renderer call failed permanently");
            return Err(err);
        }
        if !self.policy.should_retry(&err, *attempt) {
            error!(
                operation,
                attempt = *attempt,
                max = self.policy.max_attempts,
                error = %err,
                "Renderer call exhausted retries"
            );
            return Err(err);
        }

        let delay = self.policy.delay_with_jitter(*attempt);
        warn!(
            operation,
            attempt = *attempt,
            max = self.policy.max_attempts,
            ?delay,
            error = %err,
            "Renderer call failed; backing off"
        );
        self.retries += 1;
        sleep(delay).await;
        Ok(())
    }
}

impl<R> fmt::Debug for RetryRenderer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryRenderer")
            .field("policy", &self.policy)
            .field("retries", &self.retries)
            .finish()
    }
}

/// Run `$call` until it succeeds or the policy gives up.
macro_rules! with_retry {
    ($self:ident, $operation:literal, $call:expr) => {{
        let mut attempt = 0u32;
        loop {
            match $call.await {
                Ok(value) => break Ok(value),
                Err(err) => $self.backoff($operation, &mut attempt, err).await?,
            }
        }
    }};
}

impl<R: PageRenderer> PageRenderer for RetryRenderer<R> {
    #[instrument(level = "debug", skip(self))]
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        with_retry!(self, "navigate", self.inner.navigate(url))
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), RenderError> {
        with_retry!(self, "scroll_to_bottom", self.inner.scroll_to_bottom())
    }

    async fn current_height(&mut self) -> Result<u64, RenderError> {
        with_retry!(self, "current_height", self.inner.current_height())
    }

    async fn current_markup(&mut self) -> Result<String, RenderError> {
        with_retry!(self, "current_markup", self.inner.current_markup())
    }

    async fn close(&mut self) {
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Renderer whose `navigate` plays back a script of results.
    #[derive(Default)]
    struct Flaky {
        script: VecDeque<Result<(), RenderError>>,
        calls: u32,
        closed: bool,
    }

    impl PageRenderer for Flaky {
        async fn navigate(&mut self, _url: &str) -> Result<(), RenderError> {
            self.calls += 1;
            self.script.pop_front().unwrap_or(Ok(()))
        }
        async fn scroll_to_bottom(&mut self) -> Result<(), RenderError> {
            Ok(())
        }
        async fn current_height(&mut self) -> Result<u64, RenderError> {
            Ok(0)
        }
        async fn current_markup(&mut self) -> Result<String, RenderError> {
            Ok(String::new())
        }
        async fn close(&mut self) {
            self.closed = true;
        }
    }

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    fn transient() -> RenderError {
        RenderError::Transient("timed out".into())
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
    }

    #[test]
    fn test_should_retry_only_transient_within_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&transient(), 1));
        assert!(policy.should_retry(&transient(), 2));
        assert!(!policy.should_retry(&transient(), 3));
        assert!(!policy.should_retry(&RenderError::Permanent("403".into()), 1));
    }

    #[tokio::test]
    async fn test_transient_twice_then_success() {
        let inner = Flaky {
            script: VecDeque::from([Err(transient()), Err(transient()), Ok(())]),
            ..Default::default()
        };
        let mut renderer = RetryRenderer::new(inner, instant_policy(3));

        renderer.navigate("https://example.com").await.unwrap();
        assert_eq!(renderer.retries(), 2);
        assert_eq!(renderer.inner.calls, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Flaky {
            script: VecDeque::from([Err(transient()), Err(transient()), Err(transient()), Ok(())]),
            ..Default::default()
        };
        let mut renderer = RetryRenderer::new(inner, instant_policy(3));

        let err = renderer.navigate("https://example.com").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(renderer.inner.calls, 3);
        assert_eq!(renderer.retries(), 2);
    }

    #[tokio::test]
    async fn test_permanent_fails_immediately() {
        let inner = Flaky {
            script: VecDeque::from([Err(RenderError::Permanent("forbidden".into()))]),
            ..Default::default()
        };
        let mut renderer = RetryRenderer::new(inner, instant_policy(3));

        let err = renderer.navigate("https://example.com").await.unwrap_err();
        assert_eq!(err, RenderError::Permanent("forbidden".into()));
        assert_eq!(renderer.inner.calls, 1);
        assert_eq!(renderer.retries(), 0);
    }

    #[tokio::test]
    async fn test_close_passes_through() {
        let mut renderer = RetryRenderer::new(Flaky::default(), instant_policy(3));
        renderer.close().await;
        assert!(renderer.inner.closed);
    }
}
