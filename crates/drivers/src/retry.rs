//! Retry wrapper — bounded re-attempts with a fixed delay.
//!
//! Wraps any driver and re-issues the prompt on failure, up to
//! `max_retries` attempts with `retry_delay` between them. After the
//! last failed attempt the final error propagates unchanged. This is
//! the only place in the engine that retries blocking I/O; the action
//! loop's self-correction path is conversational, not a retry.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use stepweave_core::artifact::Artifact;
use stepweave_core::driver::Driver;
use stepweave_core::error::DriverError;

/// A driver that wraps another driver with bounded retries.
pub struct RetryDriver {
    name: String,
    inner: Arc<dyn Driver>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryDriver {
    /// Wrap `inner` with up to `max_retries` attempts, sleeping
    /// `retry_delay` between failures.
    pub fn new(inner: Arc<dyn Driver>, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            name: format!("retry({})", inner.name()),
            inner,
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    /// Wrap `inner` using the retry policy from configuration.
    pub fn from_config(inner: Arc<dyn Driver>, config: &stepweave_config::DriverConfig) -> Self {
        Self::new(
            inner,
            config.max_retries,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    /// The configured attempt bound.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[async_trait]
impl Driver for RetryDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn context_window(&self) -> usize {
        self.inner.context_window()
    }

    async fn run(&self, prompt: &str) -> std::result::Result<Artifact, DriverError> {
        let mut last_error = DriverError::NotConfigured("retry wrapper made no attempts".into());

        for attempt in 1..=self.max_retries {
            match self.inner.run(prompt).await {
                Ok(artifact) => return Ok(artifact),
                Err(e) => {
                    warn!(
                        driver = %self.inner.name(),
                        attempt,
                        max = self.max_retries,
                        error = %e,
                        "Driver attempt failed"
                    );
                    last_error = e;
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyDriver {
        failures: u32,
        calls: Mutex<u32>,
    }

    impl FlakyDriver {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Driver for FlakyDriver {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn run(&self, _prompt: &str) -> std::result::Result<Artifact, DriverError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.failures {
                Err(DriverError::Request(format!("transient failure #{calls}")))
            } else {
                Ok(Artifact::output("recovered"))
            }
        }
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let inner = Arc::new(FlakyDriver::new(0));
        let retry = RetryDriver::new(inner.clone(), 3, Duration::from_millis(1));

        let artifact = retry.run("prompt").await.unwrap();
        assert_eq!(artifact.text(), "recovered");
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn recovers_within_budget() {
        // Fails twice, succeeds on the third of three allowed attempts.
        let inner = Arc::new(FlakyDriver::new(2));
        let retry = RetryDriver::new(inner.clone(), 3, Duration::from_millis(1));

        let artifact = retry.run("prompt").await.unwrap();
        assert_eq!(artifact.text(), "recovered");
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let inner = Arc::new(FlakyDriver::new(10));
        let retry = RetryDriver::new(inner.clone(), 3, Duration::from_millis(1));

        let err = retry.run("prompt").await.unwrap_err();
        match err {
            DriverError::Request(msg) => assert!(msg.contains("#3")),
            other => panic!("Expected Request error, got: {other:?}"),
        }
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn zero_retries_clamps_to_one_attempt() {
        let inner = Arc::new(FlakyDriver::new(0));
        let retry = RetryDriver::new(inner.clone(), 0, Duration::from_millis(1));

        retry.run("prompt").await.unwrap();
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn context_window_passes_through() {
        let inner = Arc::new(FlakyDriver::new(0));
        let retry = RetryDriver::new(inner, 3, Duration::from_millis(1));
        assert_eq!(
            retry.context_window(),
            stepweave_core::driver::DEFAULT_CONTEXT_WINDOW
        );
    }

    #[test]
    fn from_config_applies_policy() {
        let config = stepweave_config::DriverConfig {
            max_retries: 5,
            retry_delay_ms: 10,
        };
        let retry = RetryDriver::from_config(Arc::new(FlakyDriver::new(0)), &config);
        assert_eq!(retry.max_retries(), 5);
        assert!(retry.name().starts_with("retry("));
    }
}
