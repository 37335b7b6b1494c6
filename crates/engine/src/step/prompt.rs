//! PromptStep — one rendered prompt, one driver call.

use std::sync::Arc;

use stepweave_core::artifact::Artifact;
use stepweave_core::driver::Driver;
use stepweave_core::error::Error;

use super::{StepContext, StepCore};
use crate::render::render_prompt_stack;

/// A step that sends its rendered prompt to the driver and takes the
/// completion as its output.
pub struct PromptStep {
    /// The step's prompt text
    pub prompt: String,

    /// Optional driver used instead of the Structure's default
    pub driver_override: Option<Arc<dyn Driver>>,
}

impl PromptStep {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            driver_override: None,
        }
    }

    /// Use a specific driver for this step only.
    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver_override = Some(driver);
        self
    }

    pub(crate) fn render(&self, core: &StepCore, ctx: &StepContext) -> String {
        let mut framing = self.prompt.clone();
        if let Some(input) = &core.input {
            framing.push_str("\n\nInput:\n");
            framing.push_str(input.text());
        }
        render_prompt_stack(&ctx.context_block, &ctx.memory_block, &framing)
    }

    pub(crate) async fn run(
        &mut self,
        core: &StepCore,
        ctx: &StepContext,
    ) -> Result<Artifact, Error> {
        let prompt = self.render(core, ctx);
        let artifact = ctx.driver.run(&prompt).await?;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepweave_core::event::EventBus;

    fn ctx_with(memory_block: &str) -> StepContext {
        StepContext {
            driver: Arc::new(stepweave_drivers::ScriptedDriver::repeating("ok")),
            context_block: "You are a test harness.".into(),
            memory_block: memory_block.into(),
            events: Arc::new(EventBus::default()),
        }
    }

    #[test]
    fn render_includes_prompt_and_context() {
        let step = PromptStep::new("Summarize the input.");
        let core = StepCore::new();

        let rendered = step.render(&core, &ctx_with(""));
        assert!(rendered.contains("You are a test harness."));
        assert!(rendered.contains("Summarize the input."));
        assert!(!rendered.contains("Input:"));
    }

    #[test]
    fn render_appends_input_artifact() {
        let step = PromptStep::new("Summarize the input.");
        let mut core = StepCore::new();
        core.input = Some(Artifact::output("the upstream result"));

        let rendered = step.render(&core, &ctx_with("Prompt: p\nOutput: o"));
        assert!(rendered.contains("Input:\nthe upstream result"));
        assert!(rendered.contains("## Prior Exchanges"));
    }

    #[tokio::test]
    async fn run_returns_driver_completion() {
        let mut step = PromptStep::new("go");
        let core = StepCore::new();

        let artifact = step.run(&core, &ctx_with("")).await.unwrap();
        assert_eq!(artifact.text(), "ok");
    }
}
