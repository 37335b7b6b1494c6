//! Pipeline — the linear Structure.
//!
//! Runs its steps strictly in sequence, pruning Memory to the active
//! driver's token budget before each step, and failing fast on the
//! first Error artifact. After a full chain completes, the transcript
//! (first step's rendered prompt, last step's output) is recorded as
//! one Memory exchange.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use stepweave_core::artifact::Artifact;
use stepweave_core::driver::Driver;
use stepweave_core::error::{Error, StructureError};
use stepweave_core::event::{EngineEvent, EventBus};
use stepweave_core::memory::{Exchange, Memory};
use stepweave_core::token::Tokenizer;

use crate::step::{Step, StepContext, StepId};
use stepweave_memory::BufferMemory;

/// A Structure that runs Steps strictly in sequence.
pub struct Pipeline {
    arena: HashMap<StepId, Step>,
    first: StepId,
    driver: Arc<dyn Driver>,
    memory: Box<dyn Memory>,
    context: String,
    events: Arc<EventBus>,
}

impl Pipeline {
    /// Start building a pipeline around a default driver.
    pub fn builder(driver: Arc<dyn Driver>) -> PipelineBuilder {
        PipelineBuilder {
            driver,
            memory: None,
            context: String::new(),
            events: None,
            steps: Vec::new(),
        }
    }

    /// The first step of the chain.
    pub fn first_step(&self) -> Option<&Step> {
        self.arena.get(&self.first)
    }

    /// The last step of the chain, found by walking child links.
    pub fn last_step(&self) -> Option<&Step> {
        let mut id = self.first.clone();
        loop {
            let step = self.arena.get(&id)?;
            match step.core.child_ids.first() {
                Some(next) => id = next.clone(),
                None => return Some(step),
            }
        }
    }

    /// Look up a step by ID.
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.arena.get(id)
    }

    /// Number of steps in the chain.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether the pipeline has no steps (unreachable via the builder).
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// The pipeline's memory.
    pub fn memory(&self) -> &dyn Memory {
        self.memory.as_ref()
    }

    /// The pipeline's event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Run the chain from first to last step.
    ///
    /// Returns the last step's artifact on success, or the failing
    /// step's Error artifact: step failures are values, never `Err`.
    /// `Err` is reserved for structural misuse and memory faults.
    pub async fn run(&mut self, args: Option<Artifact>) -> Result<Artifact, Error> {
        for step in self.arena.values_mut() {
            step.reset();
        }
        if let Some(args) = args {
            let first = self
                .arena
                .get_mut(&self.first)
                .ok_or_else(|| StructureError::UnknownStep(self.first.to_string()))?;
            first.core.input = Some(args);
        }

        let mut current = Some(self.first.clone());
        let mut first_rendered: Option<String> = None;
        let mut last_output: Option<Artifact> = None;
        let mut steps_run = 0usize;

        while let Some(id) = current.take() {
            // Render with memory pruned to what the active driver's
            // window leaves after the rest of the prompt stack.
            let ctx = {
                let step = self
                    .arena
                    .get(&id)
                    .ok_or_else(|| StructureError::UnknownStep(id.to_string()))?;
                let driver = step.active_driver(&self.driver);
                let tokenizer = Tokenizer::new(driver.context_window());
                let base_ctx = StepContext {
                    driver,
                    context_block: self.context.clone(),
                    memory_block: String::new(),
                    events: self.events.clone(),
                };
                let budget = tokenizer.remaining(&step.render(&base_ctx));
                let memory_block = self.memory.to_prompt_string(Some(budget));
                StepContext {
                    memory_block,
                    ..base_ctx
                }
            };

            let (artifact, child) = {
                let step = self
                    .arena
                    .get_mut(&id)
                    .ok_or_else(|| StructureError::UnknownStep(id.to_string()))?;
                if first_rendered.is_none() {
                    first_rendered = Some(step.render(&ctx));
                }
                let artifact = step.execute(&ctx).await;
                (artifact, step.core.child_ids.first().cloned())
            };
            steps_run += 1;

            if artifact.is_error() {
                warn!(step_id = %id, steps_run, "Pipeline step failed, aborting run");
                self.events.publish(EngineEvent::StructureCompleted {
                    kind: "pipeline".into(),
                    steps_run,
                    failed: true,
                    timestamp: Utc::now(),
                });
                return Ok(artifact);
            }

            if let Some(child_id) = &child
                && let Some(child_step) = self.arena.get_mut(child_id)
            {
                child_step.core.input = Some(artifact.clone());
            }
            last_output = Some(artifact);
            current = child;
        }

        let (Some(prompt), Some(output)) = (first_rendered, last_output) else {
            return Err(Error::Internal("pipeline completed without output".into()));
        };

        self.memory
            .record(Exchange::new(prompt, output.text()))
            .await?;
        self.events.publish(EngineEvent::MemoryRecorded {
            entries: self.memory.len(),
            timestamp: Utc::now(),
        });
        self.events.publish(EngineEvent::StructureCompleted {
            kind: "pipeline".into(),
            steps_run,
            failed: false,
            timestamp: Utc::now(),
        });
        info!(steps_run, "Pipeline run completed");
        Ok(output)
    }
}

/// Builder for [`Pipeline`]; appended steps are chained in order.
pub struct PipelineBuilder {
    driver: Arc<dyn Driver>,
    memory: Option<Box<dyn Memory>>,
    context: String,
    events: Option<Arc<EventBus>>,
    steps: Vec<Step>,
}

impl PipelineBuilder {
    /// Set the context block rendered at the top of every prompt.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Use a specific memory strategy (defaults to a bounded buffer).
    pub fn memory(mut self, memory: Box<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Use a shared event bus.
    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Append a step to the chain.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a plain prompt step.
    pub fn prompt_step(self, prompt: impl Into<String>) -> Self {
        self.step(Step::prompt(prompt))
    }

    /// Link the chain and build the pipeline.
    pub fn build(mut self) -> Result<Pipeline, Error> {
        if self.steps.is_empty() {
            return Err(StructureError::Empty.into());
        }

        for i in 0..self.steps.len() - 1 {
            let child_id = self.steps[i + 1].core.id.clone();
            let parent_id = self.steps[i].core.id.clone();
            self.steps[i].core.child_ids.push(child_id);
            self.steps[i + 1].core.parent_ids.push(parent_id);
        }

        let first = self.steps[0].core.id.clone();
        let arena = self
            .steps
            .into_iter()
            .map(|step| (step.core.id.clone(), step))
            .collect();

        Ok(Pipeline {
            arena,
            first,
            driver: self.driver,
            memory: self
                .memory
                .unwrap_or_else(|| Box::new(BufferMemory::default())),
            context: self.context,
            events: self.events.unwrap_or_else(|| Arc::new(EventBus::default())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepweave_drivers::ScriptedDriver;

    #[tokio::test]
    async fn empty_pipeline_rejected_at_build() {
        let driver: Arc<dyn Driver> = Arc::new(ScriptedDriver::repeating("x"));
        let result = Pipeline::builder(driver).build();
        assert!(matches!(
            result,
            Err(Error::Structure(StructureError::Empty))
        ));
    }

    #[tokio::test]
    async fn chain_links_parents_and_children() {
        let driver: Arc<dyn Driver> = Arc::new(ScriptedDriver::repeating("x"));
        let pipeline = Pipeline::builder(driver)
            .prompt_step("one")
            .prompt_step("two")
            .prompt_step("three")
            .build()
            .unwrap();

        assert_eq!(pipeline.len(), 3);
        let first = pipeline.first_step().unwrap();
        assert!(first.core.parent_ids.is_empty());
        assert_eq!(first.core.child_ids.len(), 1);

        let last = pipeline.last_step().unwrap();
        assert!(last.core.child_ids.is_empty());
        assert_eq!(last.core.parent_ids.len(), 1);
        assert_ne!(first.id(), last.id());
    }

    #[tokio::test]
    async fn output_flows_into_child_input() {
        let driver: Arc<dyn Driver> =
            Arc::new(ScriptedDriver::sequence(vec!["from step one", "final"]));
        let mut pipeline = Pipeline::builder(driver)
            .prompt_step("first")
            .prompt_step("second")
            .build()
            .unwrap();

        let output = pipeline.run(None).await.unwrap();
        assert_eq!(output.text(), "final");

        let last = pipeline.last_step().unwrap();
        assert_eq!(last.core.input.as_ref().unwrap().text(), "from step one");
    }

    #[tokio::test]
    async fn fail_fast_stops_the_chain() {
        // One completion, then the script drains and the driver errors.
        let driver: Arc<dyn Driver> = Arc::new(ScriptedDriver::sequence(vec!["only reply"]));
        let mut pipeline = Pipeline::builder(driver)
            .prompt_step("a")
            .prompt_step("b")
            .prompt_step("c")
            .build()
            .unwrap();

        let output = pipeline.run(None).await.unwrap();
        assert!(output.is_error());

        // The tail step never ran.
        let last = pipeline.last_step().unwrap();
        assert_eq!(last.state(), crate::step::StepState::Pending);
        // And nothing was recorded into memory.
        assert!(pipeline.memory().is_empty());
    }

    #[tokio::test]
    async fn rerun_resets_state() {
        let driver: Arc<dyn Driver> = Arc::new(ScriptedDriver::repeating("again"));
        let mut pipeline = Pipeline::builder(driver)
            .prompt_step("only")
            .build()
            .unwrap();

        pipeline.run(Some(Artifact::output("seed"))).await.unwrap();
        let output = pipeline.run(None).await.unwrap();
        assert_eq!(output.text(), "again");
        // Re-run cleared the seeded input.
        assert!(pipeline.first_step().unwrap().core.input.is_none());
        assert_eq!(pipeline.memory().len(), 2);
    }
}
