//! Driver trait — the abstraction over LLM backends.
//!
//! A Driver knows how to send one rendered prompt to a language model and
//! return the completion as an [`Artifact`]. Concrete HTTP clients live
//! outside the engine; the core only ever sees this trait.

use async_trait::async_trait;

use crate::artifact::Artifact;
use crate::error::DriverError;

/// Default context window assumed when a backend does not report one.
pub const DEFAULT_CONTEXT_WINDOW: usize = 4096;

/// The core Driver trait.
///
/// Every model backend implements this trait. Structures call `run()`
/// without knowing which backend is wired in. Implementations must be
/// safe to call repeatedly: the engine's retry wrapper may re-issue the
/// same prompt after a transient failure.
#[async_trait]
pub trait Driver: Send + Sync {
    /// A human-readable name for this driver (e.g., "scripted", "retry").
    fn name(&self) -> &str;

    /// The context window of the underlying model, in tokens.
    fn context_window(&self) -> usize {
        DEFAULT_CONTEXT_WINDOW
    }

    /// Send a rendered prompt and return the completion.
    async fn run(&self, prompt: &str) -> std::result::Result<Artifact, DriverError>;
}
