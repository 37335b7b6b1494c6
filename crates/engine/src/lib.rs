//! # Stepweave Engine
//!
//! Structure execution for Stepweave: the Step state machine, the
//! tool-calling action loop, and the two Structure variants.
//!
//! - [`Pipeline`] runs steps strictly in sequence, pruning memory to the
//!   token budget before each step.
//! - [`Workflow`] runs steps as a DAG over a bounded worker pool,
//!   failing fast on the first unrecoverable step error.
//!
//! Steps live in an arena keyed by ID and reference each other only by
//! ID, so graphs serialize trivially and cycles cannot be built out of
//! references. All structure walks are iterative; there is no recursion
//! over the graph.

use std::sync::Arc;

use stepweave_config::{MemoryConfig, MemoryStrategy};
use stepweave_core::error::Error;
use stepweave_core::memory::Memory;
use stepweave_memory::{BufferMemory, Summarizer, SummaryMemory};

pub mod action;
pub mod pipeline;
pub mod render;
pub mod step;
pub mod workflow;

pub use action::{Action, ActionParseError, ParsedCompletion, parse_action, parse_completion};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use step::{
    DEFAULT_MAX_SUBSTEPS, PromptStep, Step, StepContext, StepCore, StepId, StepKind, StepState,
    Substep, ToolStep, ToolkitStep,
};
pub use workflow::{DEFAULT_WORKER_LIMIT, Workflow, WorkflowBuilder, topological_order};

/// Build a memory strategy from configuration.
///
/// The summary strategy needs a summarizer; omitting one is a
/// configuration error rather than a silent fallback.
pub fn memory_from_config(
    config: &MemoryConfig,
    summarizer: Option<Arc<dyn Summarizer>>,
) -> Result<Box<dyn Memory>, Error> {
    match config.strategy {
        MemoryStrategy::Buffer => Ok(Box::new(BufferMemory::new(config.buffer_size))),
        MemoryStrategy::Summary => {
            let summarizer = summarizer.ok_or_else(|| Error::Config {
                message: "summary memory strategy requires a summarizer".into(),
            })?;
            Ok(Box::new(SummaryMemory::new(config.keep_recent, summarizer)))
        }
    }
}
