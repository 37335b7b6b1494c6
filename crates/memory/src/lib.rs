//! Memory strategies for Stepweave.
//!
//! Two interchangeable implementations of the core [`Memory`] trait:
//!
//! - [`BufferMemory`] — bounded buffer, drops the oldest exchanges
//! - [`SummaryMemory`] — rolling summary, folds old exchanges through a
//!   pluggable [`Summarizer`]
//!
//! Both support token-budget pruning via `to_prompt_string(Some(budget))`:
//! a linear search over "render the last n exchanges", decrementing `n`
//! until the rendering fits. The search is linear rather than binary
//! because the rendered cost is only monotonic enough to guarantee
//! termination, not to index into.

pub mod buffer;
pub mod summary;

pub use buffer::BufferMemory;
pub use summary::{DriverSummarizer, Summarizer, SummaryMemory, SummarySnapshot};

pub use stepweave_core::memory::{Exchange, Memory};
