//! Driver wrappers for Stepweave.
//!
//! Concrete model-provider clients live outside the engine; this crate
//! provides the pieces the engine itself owns:
//!
//! - [`RetryDriver`] — bounded retry with fixed delay around any driver
//! - [`ScriptedDriver`] — deterministic scripted completions for tests
//!   and demos

pub mod retry;
pub mod scripted;

pub use retry::RetryDriver;
pub use scripted::{ScriptedDriver, ScriptedReply};
