//! Step — the unit of work inside a Structure.
//!
//! A Step is a state machine (`Pending -> Executing -> Finished`, no
//! backward transitions) around one of three behaviors: a plain prompt
//! call, a single-tool action loop, or a multi-tool action loop. Steps
//! reference each other only by ID, never by pointer: the owning
//! Structure keeps them in an arena map, which keeps the graph trivially
//! serializable and makes reference cycles impossible to build.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use stepweave_core::artifact::Artifact;
use stepweave_core::driver::Driver;
use stepweave_core::event::{EngineEvent, EventBus};
use stepweave_core::tool::{Tool, ToolRegistry};

pub mod prompt;
pub mod tool;

pub use prompt::PromptStep;
pub use tool::{DEFAULT_MAX_SUBSTEPS, Substep, ToolStep, ToolkitStep};

/// Unique identifier for a Step or Substep.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The lifecycle state of a Step.
///
/// Valid transitions: `Pending -> Executing -> Finished`. `reset()` is
/// the only way back to Pending, used when a Structure is re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Executing,
    Finished,
}

/// Shared bookkeeping for every step kind: identity, lifecycle state,
/// graph edges (by ID), and the input/output artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCore {
    pub id: StepId,
    pub state: StepState,
    pub parent_ids: Vec<StepId>,
    pub child_ids: Vec<StepId>,
    pub input: Option<Artifact>,
    pub output: Option<Artifact>,
}

impl StepCore {
    fn new() -> Self {
        Self {
            id: StepId::new(),
            state: StepState::Pending,
            parent_ids: Vec::new(),
            child_ids: Vec::new(),
            input: None,
            output: None,
        }
    }
}

/// Everything a step needs from its Structure to execute: the active
/// driver, the rendered context and memory blocks, and the event bus.
#[derive(Clone)]
pub struct StepContext {
    pub driver: Arc<dyn Driver>,
    pub context_block: String,
    pub memory_block: String,
    pub events: Arc<EventBus>,
}

/// The step-type-specific behavior.
pub enum StepKind {
    Prompt(PromptStep),
    Tool(ToolStep),
    Toolkit(ToolkitStep),
}

/// A unit of work in a Structure.
pub struct Step {
    pub core: StepCore,
    pub kind: StepKind,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            core: StepCore::new(),
            kind,
        }
    }

    /// Convenience constructor for a plain prompt step.
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self::new(StepKind::Prompt(PromptStep::new(prompt)))
    }

    /// Convenience constructor for a single-tool step.
    pub fn tool(prompt: impl Into<String>, tool: Arc<dyn Tool>) -> Self {
        Self::new(StepKind::Tool(ToolStep::new(prompt, tool)))
    }

    /// Convenience constructor for a multi-tool step.
    pub fn toolkit(prompt: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(StepKind::Toolkit(ToolkitStep::new(prompt, tools)))
    }

    pub fn id(&self) -> &StepId {
        &self.core.id
    }

    pub fn state(&self) -> StepState {
        self.core.state
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            StepKind::Prompt(_) => "prompt",
            StepKind::Tool(_) => "tool",
            StepKind::Toolkit(_) => "toolkit",
        }
    }

    /// Whether this step may execute: still Pending, and every parent
    /// in the arena has Finished.
    pub fn can_execute(&self, arena: &HashMap<StepId, Step>) -> bool {
        self.core.state == StepState::Pending
            && self
                .core
                .parent_ids
                .iter()
                .all(|p| arena.get(p).is_some_and(|s| s.core.state == StepState::Finished))
    }

    /// Return the step to Pending, clearing input, output, and any
    /// accumulated substeps. Root inputs are re-seeded by the Structure
    /// on the next run.
    pub fn reset(&mut self) {
        self.core.state = StepState::Pending;
        self.core.input = None;
        self.core.output = None;
        match &mut self.kind {
            StepKind::Prompt(_) => {}
            StepKind::Tool(step) => step.substeps.clear(),
            StepKind::Toolkit(step) => step.substeps.clear(),
        }
    }

    /// The driver this step will actually use: its own override if set,
    /// otherwise the Structure's default.
    pub fn active_driver(&self, default_driver: &Arc<dyn Driver>) -> Arc<dyn Driver> {
        let override_driver = match &self.kind {
            StepKind::Prompt(step) => step.driver_override.clone(),
            StepKind::Tool(step) => step.driver_override.clone(),
            StepKind::Toolkit(step) => step.driver_override.clone(),
        };
        override_driver.unwrap_or_else(|| default_driver.clone())
    }

    /// Render the full prompt stack this step would send right now.
    pub fn render(&self, ctx: &StepContext) -> String {
        match &self.kind {
            StepKind::Prompt(step) => step.render(&self.core, ctx),
            StepKind::Tool(step) => step.render(&self.core, ctx),
            StepKind::Toolkit(step) => step.render(&self.core, ctx),
        }
    }

    /// Execute this step, transitioning Pending -> Executing -> Finished.
    ///
    /// Errors raised by the kind-specific run are captured into an Error
    /// artifact rather than propagated, so schedulers treat "errored"
    /// uniformly with "produced output".
    pub async fn execute(&mut self, ctx: &StepContext) -> Artifact {
        let started = Instant::now();
        self.before_run(ctx);

        let result = match &mut self.kind {
            StepKind::Prompt(step) => step.run(&self.core, ctx).await,
            StepKind::Tool(step) => step.run(&self.core, ctx).await,
            StepKind::Toolkit(step) => step.run(&self.core, ctx).await,
        };

        let artifact = match result {
            Ok(artifact) => artifact,
            Err(e) => Artifact::error(e.to_string()),
        };

        self.after_run(artifact.clone(), started.elapsed().as_millis() as u64, ctx);
        artifact
    }

    fn before_run(&mut self, ctx: &StepContext) {
        debug!(step_id = %self.core.id, kind = self.kind_name(), "Step executing");
        self.core.state = StepState::Executing;
        ctx.events.publish(EngineEvent::StepStarted {
            step_id: self.core.id.to_string(),
            kind: self.kind_name().to_string(),
            timestamp: Utc::now(),
        });
    }

    fn after_run(&mut self, artifact: Artifact, duration_ms: u64, ctx: &StepContext) {
        let is_error = artifact.is_error();
        if is_error {
            warn!(step_id = %self.core.id, error = artifact.text(), "Step failed");
        }
        self.core.output = Some(artifact);
        self.core.state = StepState::Finished;
        ctx.events.publish(EngineEvent::StepFinished {
            step_id: self.core.id.to_string(),
            is_error,
            duration_ms,
            timestamp: Utc::now(),
        });
    }
}
