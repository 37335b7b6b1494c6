//! Workflow — the DAG Structure.
//!
//! Steps are topologically ordered for a stable dispatch order, then
//! executed in batches: every currently-runnable step is submitted to a
//! bounded worker pool, the batch is awaited, outputs are propagated,
//! and the scan repeats. The scheduler loop is the only mutator of
//! scheduling state and Memory, and it runs synchronously between
//! batches. On the first Error artifact the run aborts: running steps
//! are awaited to completion, but no new work is submitted and their
//! results are not used for further scheduling.

use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use stepweave_core::artifact::Artifact;
use stepweave_core::driver::Driver;
use stepweave_core::error::{Error, StructureError};
use stepweave_core::event::{EngineEvent, EventBus};
use stepweave_core::memory::{Exchange, Memory};
use stepweave_core::token::Tokenizer;

use crate::step::{Step, StepContext, StepId, StepState};
use stepweave_memory::BufferMemory;

/// Default bound on concurrently executing steps.
pub const DEFAULT_WORKER_LIMIT: usize = 4;

/// A Structure that runs Steps as a DAG over a bounded worker pool.
pub struct Workflow {
    arena: HashMap<StepId, Step>,
    order: Vec<StepId>,
    driver: Arc<dyn Driver>,
    memory: Box<dyn Memory>,
    context: String,
    events: Arc<EventBus>,
    worker_limit: usize,
}

impl Workflow {
    /// Start building a workflow around a default driver.
    pub fn builder(driver: Arc<dyn Driver>) -> WorkflowBuilder {
        WorkflowBuilder {
            driver,
            memory: None,
            context: String::new(),
            events: None,
            worker_limit: DEFAULT_WORKER_LIMIT,
            order: Vec::new(),
            arena: HashMap::new(),
        }
    }

    /// Look up a step by ID.
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.arena.get(id)
    }

    /// Number of steps in the graph.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether the workflow has no steps (unreachable via the builder).
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// The workflow's memory.
    pub fn memory(&self) -> &dyn Memory {
        self.memory.as_ref()
    }

    /// The workflow's event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// IDs of the leaf steps (no children), in insertion order.
    pub fn leaf_ids(&self) -> Vec<StepId> {
        self.order
            .iter()
            .filter(|id| {
                self.arena
                    .get(*id)
                    .is_some_and(|s| s.core.child_ids.is_empty())
            })
            .cloned()
            .collect()
    }

    /// Run the DAG to completion or first failure.
    ///
    /// Returns the artifacts of all leaf steps that produced output.
    /// A failing run returns early: finished steps keep their outputs,
    /// unreached leaves simply contribute nothing.
    pub async fn run(&mut self, args: Option<Artifact>) -> Result<Vec<Artifact>, Error> {
        if self.arena.is_empty() {
            return Err(StructureError::Empty.into());
        }

        for step in self.arena.values_mut() {
            step.reset();
        }
        if let Some(args) = &args {
            for id in &self.order {
                if let Some(step) = self.arena.get_mut(id)
                    && step.core.parent_ids.is_empty()
                {
                    step.core.input = Some(args.clone());
                }
            }
        }

        let topo = topological_order(&self.order, &self.arena)?;
        let semaphore = Arc::new(Semaphore::new(self.worker_limit.max(1)));
        let mut submitted: HashSet<StepId> = HashSet::new();
        let mut failed = false;

        loop {
            let runnable: Vec<StepId> = topo
                .iter()
                .filter(|id| {
                    !submitted.contains(*id)
                        && self
                            .arena
                            .get(*id)
                            .is_some_and(|s| s.can_execute(&self.arena))
                })
                .cloned()
                .collect();
            if runnable.is_empty() {
                break;
            }
            debug!(batch = runnable.len(), "Workflow dispatching batch");

            let mut batch: JoinSet<(Step, String, Artifact)> = JoinSet::new();
            for id in runnable {
                submitted.insert(id.clone());
                let Some(step) = self.arena.remove(&id) else {
                    continue;
                };
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
                let ctx = StepContext {
                    memory_block,
                    ..base_ctx
                };
                let permits = semaphore.clone();
                batch.spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    let mut step = step;
                    let rendered = step.render(&ctx);
                    let artifact = step.execute(&ctx).await;
                    (step, rendered, artifact)
                });
            }

            // Await the whole batch; running steps always finish.
            while let Some(joined) = batch.join_next().await {
                let (step, rendered, artifact) = match joined {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(error = %e, "Workflow task failed to join");
                        failed = true;
                        continue;
                    }
                };
                let id = step.core.id.clone();
                let children = step.core.child_ids.clone();
                self.arena.insert(id.clone(), step);

                if artifact.is_error() {
                    warn!(step_id = %id, "Workflow step failed, aborting after batch");
                    failed = true;
                    continue;
                }

                for child_id in &children {
                    if let Some(child) = self.arena.get_mut(child_id) {
                        child.core.input = Some(artifact.clone());
                    }
                }
                self.memory
                    .record(Exchange::new(rendered, artifact.text()))
                    .await?;
                self.events.publish(EngineEvent::MemoryRecorded {
                    entries: self.memory.len(),
                    timestamp: Utc::now(),
                });
            }

            if failed {
                break;
            }
        }

        let steps_run = self
            .arena
            .values()
            .filter(|s| s.core.state == StepState::Finished)
            .count();
        self.events.publish(EngineEvent::StructureCompleted {
            kind: "workflow".into(),
            steps_run,
            failed,
            timestamp: Utc::now(),
        });
        info!(steps_run, failed, "Workflow run completed");

        let outputs = self
            .leaf_ids()
            .iter()
            .filter_map(|id| self.arena.get(id))
            .filter_map(|step| step.core.output.clone())
            .collect();
        Ok(outputs)
    }
}

/// Compute a deterministic topological order over the step IDs.
///
/// Reverse edges are derived by scanning each step's `child_ids`. A
/// cycle is reported as a [`StructureError::Cycle`] naming one of the
/// steps stuck in it.
pub fn topological_order(
    order: &[StepId],
    arena: &HashMap<StepId, Step>,
) -> Result<Vec<StepId>, StructureError> {
    let mut indegree: HashMap<StepId, usize> =
        order.iter().map(|id| (id.clone(), 0)).collect();
    for id in order {
        let step = arena
            .get(id)
            .ok_or_else(|| StructureError::UnknownStep(id.to_string()))?;
        for child in &step.core.child_ids {
            let Some(count) = indegree.get_mut(child) else {
                return Err(StructureError::UnknownStep(child.to_string()));
            };
            *count += 1;
        }
    }

    let mut queue: VecDeque<StepId> = order
        .iter()
        .filter(|id| indegree.get(*id) == Some(&0))
        .cloned()
        .collect();
    let mut sorted = Vec::with_capacity(order.len());

    while let Some(id) = queue.pop_front() {
        if let Some(step) = arena.get(&id) {
            for child in &step.core.child_ids {
                if let Some(count) = indegree.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(child.clone());
                    }
                }
            }
        }
        sorted.push(id);
    }

    if sorted.len() != order.len() {
        let stuck = order
            .iter()
            .find(|id| !sorted.contains(id))
            .map(|id| id.to_string())
            .unwrap_or_default();
        return Err(StructureError::Cycle(stuck));
    }
    Ok(sorted)
}

/// Builder for [`Workflow`]; edges are declared explicitly via `link`.
pub struct WorkflowBuilder {
    driver: Arc<dyn Driver>,
    memory: Option<Box<dyn Memory>>,
    context: String,
    events: Option<Arc<EventBus>>,
    worker_limit: usize,
    order: Vec<StepId>,
    arena: HashMap<StepId, Step>,
}

impl WorkflowBuilder {
    /// Add a step to the graph, returning its ID for linking.
    pub fn add_step(&mut self, step: Step) -> StepId {
        let id = step.core.id.clone();
        self.order.push(id.clone());
        self.arena.insert(id.clone(), step);
        id
    }

    /// Declare a parent -> child dependency edge.
    pub fn link(&mut self, parent: &StepId, child: &StepId) -> Result<(), Error> {
        if !self.arena.contains_key(parent) {
            return Err(StructureError::UnknownStep(parent.to_string()).into());
        }
        if !self.arena.contains_key(child) {
            return Err(StructureError::UnknownStep(child.to_string()).into());
        }
        if let Some(step) = self.arena.get_mut(parent)
            && !step.core.child_ids.contains(child)
        {
            step.core.child_ids.push(child.clone());
        }
        if let Some(step) = self.arena.get_mut(child)
            && !step.core.parent_ids.contains(parent)
        {
            step.core.parent_ids.push(parent.clone());
        }
        Ok(())
    }

    /// Set the context block rendered at the top of every prompt.
    pub fn context(&mut self, context: impl Into<String>) -> &mut Self {
        self.context = context.into();
        self
    }

    /// Use a specific memory strategy (defaults to a bounded buffer).
    pub fn memory(&mut self, memory: Box<dyn Memory>) -> &mut Self {
        self.memory = Some(memory);
        self
    }

    /// Use a shared event bus.
    pub fn events(&mut self, events: Arc<EventBus>) -> &mut Self {
        self.events = Some(events);
        self
    }

    /// Bound the worker pool.
    pub fn worker_limit(&mut self, limit: usize) -> &mut Self {
        self.worker_limit = limit.max(1);
        self
    }

    /// Apply scheduler settings from configuration.
    pub fn configure(&mut self, config: &stepweave_config::EngineConfig) -> &mut Self {
        self.worker_limit(config.workflow.worker_limit)
    }

    /// Build the workflow.
    pub fn build(self) -> Result<Workflow, Error> {
        if self.arena.is_empty() {
            return Err(StructureError::Empty.into());
        }
        Ok(Workflow {
            arena: self.arena,
            order: self.order,
            driver: self.driver,
            memory: self
                .memory
                .unwrap_or_else(|| Box::new(BufferMemory::default())),
            context: self.context,
            events: self.events.unwrap_or_else(|| Arc::new(EventBus::default())),
            worker_limit: self.worker_limit,
        })
    }
}
