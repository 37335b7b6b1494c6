//! Scripted driver — deterministic completions for tests and demos.
//!
//! Returns a queue of pre-written replies in sequence. Optionally keeps
//! repeating a fallback reply once the queue drains, which is how tests
//! exercise "the model never stops calling tools" behavior.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use stepweave_core::artifact::Artifact;
use stepweave_core::driver::{DEFAULT_CONTEXT_WINDOW, Driver};
use stepweave_core::error::DriverError;

/// One scripted reply: a completion text or a driver error.
pub type ScriptedReply = std::result::Result<String, DriverError>;

/// A driver that replays a scripted sequence of completions.
pub struct ScriptedDriver {
    script: Mutex<VecDeque<ScriptedReply>>,
    fallback: Option<String>,
    calls: Mutex<usize>,
    context_window: usize,
}

impl ScriptedDriver {
    /// Create a driver from an explicit reply sequence.
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            fallback: None,
            calls: Mutex::new(0),
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }

    /// Create a driver that returns the given completions in order.
    pub fn sequence<S: Into<String>>(texts: Vec<S>) -> Self {
        Self::new(texts.into_iter().map(|t| Ok(t.into())).collect())
    }

    /// Create a driver that returns the same completion forever.
    pub fn repeating(text: impl Into<String>) -> Self {
        let mut driver = Self::new(Vec::new());
        driver.fallback = Some(text.into());
        driver
    }

    /// Create a driver that fails `failures` times, then succeeds with
    /// `text` on every later call.
    pub fn failing_then(failures: u32, error: DriverError, text: impl Into<String>) -> Self {
        let mut replies: Vec<ScriptedReply> =
            (0..failures).map(|_| Err(error.clone())).collect();
        let text = text.into();
        replies.push(Ok(text.clone()));
        let mut driver = Self::new(replies);
        driver.fallback = Some(text);
        driver
    }

    /// Keep returning `text` once the scripted replies are exhausted.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Override the reported context window.
    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }

    /// Number of completions served so far.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    fn name(&self) -> &str {
        "scripted"
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    async fn run(&self, _prompt: &str) -> std::result::Result<Artifact, DriverError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        let call_number = *calls;
        drop(calls);

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(Artifact::output(text)),
            Some(Err(e)) => Err(e),
            None => match &self.fallback {
                Some(text) => Ok(Artifact::output(text.clone())),
                None => Err(DriverError::Exhausted(format!(
                    "no scripted reply for call #{call_number}"
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_sequence() {
        let driver = ScriptedDriver::sequence(vec!["first", "second"]);
        assert_eq!(driver.run("p").await.unwrap().text(), "first");
        assert_eq!(driver.run("p").await.unwrap().text(), "second");
        assert_eq!(driver.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_script_errors() {
        let driver = ScriptedDriver::sequence(vec!["only"]);
        driver.run("p").await.unwrap();
        let err = driver.run("p").await.unwrap_err();
        assert!(matches!(err, DriverError::Exhausted(_)));
    }

    #[tokio::test]
    async fn repeating_never_exhausts() {
        let driver = ScriptedDriver::repeating("again");
        for _ in 0..5 {
            assert_eq!(driver.run("p").await.unwrap().text(), "again");
        }
    }

    #[tokio::test]
    async fn scripted_errors_surface() {
        let driver = ScriptedDriver::new(vec![
            Err(DriverError::Timeout("30s".into())),
            Ok("ok".into()),
        ]);
        assert!(matches!(
            driver.run("p").await.unwrap_err(),
            DriverError::Timeout(_)
        ));
        assert_eq!(driver.run("p").await.unwrap().text(), "ok");
    }

    #[tokio::test]
    async fn failing_then_recovers() {
        let driver =
            ScriptedDriver::failing_then(2, DriverError::Request("boom".into()), "done");
        assert!(driver.run("p").await.is_err());
        assert!(driver.run("p").await.is_err());
        assert_eq!(driver.run("p").await.unwrap().text(), "done");
        // Fallback keeps serving after the script drains.
        assert_eq!(driver.run("p").await.unwrap().text(), "done");
    }

    #[test]
    fn context_window_override() {
        let driver = ScriptedDriver::repeating("x").with_context_window(128);
        assert_eq!(driver.context_window(), 128);
    }
}
