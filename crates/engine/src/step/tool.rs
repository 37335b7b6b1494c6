//! ToolStep and ToolkitStep — the iterative tool-calling action loop.
//!
//! Each round asks the driver for a completion, parses it for an
//! `Action:` line, validates the input against the chosen tool's
//! schema, executes the tool, and feeds the observation back into the
//! next round's transcript. Parse and validation failures are fed back
//! to the model as observations so it can self-correct; only driver
//! failures and an exhausted substep budget end the step.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use stepweave_core::artifact::Artifact;
use stepweave_core::driver::Driver;
use stepweave_core::error::Error;
use stepweave_core::event::EngineEvent;
use stepweave_core::tool::{Tool, ToolDefinition, ToolRegistry};

use super::{StepContext, StepCore, StepId};
use crate::action::{self, ERROR_TOOL, EXIT_TOOL};
use crate::render::{ACTION_GUIDE, render_prompt_stack, render_tool_definitions};

/// Default bound on action-loop rounds per step.
pub const DEFAULT_MAX_SUBSTEPS: u32 = 15;

/// One round of the action loop, immutable once its output is set.
///
/// Carries a back-reference to its owning step by ID, never by pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Substep {
    pub id: StepId,
    pub step_id: StepId,
    pub thought: Option<String>,
    pub tool_name: Option<String>,
    pub tool_input: Option<Value>,
    pub output: Option<Artifact>,
}

impl Substep {
    fn new(
        step_id: &StepId,
        thought: Option<String>,
        tool_name: Option<String>,
        tool_input: Option<Value>,
        output: Artifact,
    ) -> Self {
        Self {
            id: StepId::new(),
            step_id: step_id.clone(),
            thought,
            tool_name,
            tool_input,
            output: Some(output),
        }
    }
}

/// A step that loops over a single tool until the model exits.
pub struct ToolStep {
    pub prompt: String,
    pub tool: Arc<dyn Tool>,
    pub max_substeps: u32,
    pub substeps: Vec<Substep>,
    pub driver_override: Option<Arc<dyn Driver>>,
}

impl ToolStep {
    pub fn new(prompt: impl Into<String>, tool: Arc<dyn Tool>) -> Self {
        Self {
            prompt: prompt.into(),
            tool,
            max_substeps: DEFAULT_MAX_SUBSTEPS,
            substeps: Vec::new(),
            driver_override: None,
        }
    }

    pub fn with_max_substeps(mut self, max: u32) -> Self {
        self.max_substeps = max;
        self
    }

    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver_override = Some(driver);
        self
    }

    pub(crate) fn render(&self, core: &StepCore, ctx: &StepContext) -> String {
        render_loop_prompt(
            &self.prompt,
            core,
            ctx,
            &[self.tool.to_definition()],
            &self.substeps,
        )
    }

    pub(crate) async fn run(
        &mut self,
        core: &StepCore,
        ctx: &StepContext,
    ) -> Result<Artifact, Error> {
        let tool = self.tool.clone();
        let resolve = move |name: &str| -> Option<Arc<dyn Tool>> {
            (name == tool.name()).then(|| tool.clone())
        };
        run_action_loop(
            core,
            ctx,
            &self.prompt,
            &[self.tool.to_definition()],
            self.max_substeps,
            false,
            resolve,
            &mut self.substeps,
        )
        .await
    }
}

/// A step that loops over a named set of tools until the model exits or
/// answers directly with an `Output:` line.
pub struct ToolkitStep {
    pub prompt: String,
    pub tools: Arc<ToolRegistry>,
    pub max_substeps: u32,
    pub substeps: Vec<Substep>,
    pub driver_override: Option<Arc<dyn Driver>>,
}

impl ToolkitStep {
    pub fn new(prompt: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            prompt: prompt.into(),
            tools,
            max_substeps: DEFAULT_MAX_SUBSTEPS,
            substeps: Vec::new(),
            driver_override: None,
        }
    }

    pub fn with_max_substeps(mut self, max: u32) -> Self {
        self.max_substeps = max;
        self
    }

    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver_override = Some(driver);
        self
    }

    pub(crate) fn render(&self, core: &StepCore, ctx: &StepContext) -> String {
        render_loop_prompt(
            &self.prompt,
            core,
            ctx,
            &self.tools.definitions(),
            &self.substeps,
        )
    }

    pub(crate) async fn run(
        &mut self,
        core: &StepCore,
        ctx: &StepContext,
    ) -> Result<Artifact, Error> {
        let tools = self.tools.clone();
        let resolve = move |name: &str| tools.get(name);
        run_action_loop(
            core,
            ctx,
            &self.prompt,
            &self.tools.definitions(),
            self.max_substeps,
            true,
            resolve,
            &mut self.substeps,
        )
        .await
    }
}

/// Render the prompt stack for one action-loop round: tool definitions,
/// protocol guide, step prompt, input, and the transcript so far.
fn render_loop_prompt(
    prompt: &str,
    core: &StepCore,
    ctx: &StepContext,
    tool_defs: &[ToolDefinition],
    substeps: &[Substep],
) -> String {
    let mut framing = String::new();
    framing.push_str(&render_tool_definitions(tool_defs));
    framing.push('\n');
    framing.push_str(ACTION_GUIDE);
    framing.push_str("\n\n");
    framing.push_str(prompt);

    if let Some(input) = &core.input {
        framing.push_str("\n\nInput:\n");
        framing.push_str(input.text());
    }

    if !substeps.is_empty() {
        framing.push_str("\n\n");
        for substep in substeps {
            if let Some(thought) = &substep.thought {
                framing.push_str(&format!("Thought: {thought}\n"));
            }
            if let Some(name) = &substep.tool_name {
                let input = substep.tool_input.clone().unwrap_or(Value::Null);
                let json = serde_json::json!({ "tool": name, "input": input });
                framing.push_str(&format!("Action: {json}\n"));
            }
            if let Some(output) = &substep.output {
                framing.push_str(&format!("Observation: {}\n", output.text()));
            }
        }
    }

    render_prompt_stack(&ctx.context_block, &ctx.memory_block, &framing)
}

/// The action loop shared by ToolStep and ToolkitStep.
///
/// Every round appends exactly one substep. Loop exits: an `exit`
/// action, an `Output:` short-circuit (toolkit only), a completion with
/// no `Action:` line (terminal parse failure), a driver error, or the
/// substep budget.
#[allow(clippy::too_many_arguments)]
async fn run_action_loop<F>(
    core: &StepCore,
    ctx: &StepContext,
    prompt: &str,
    tool_defs: &[ToolDefinition],
    max_substeps: u32,
    allow_output_shortcut: bool,
    resolve: F,
    substeps: &mut Vec<Substep>,
) -> Result<Artifact, Error>
where
    F: Fn(&str) -> Option<Arc<dyn Tool>>,
{
    for round in 0..max_substeps {
        let rendered = render_loop_prompt(prompt, core, ctx, tool_defs, substeps);
        let completion = ctx.driver.run(&rendered).await?;
        let parsed = action::parse_completion(completion.text());
        let thought = parsed.thought.clone();

        // Toolkit-era completions may skip the action format and answer
        // directly with an Output: line.
        if allow_output_shortcut && let Some(output_text) = parsed.output {
            let artifact = Artifact::output(output_text);
            substeps.push(Substep::new(&core.id, thought, None, None, artifact.clone()));
            debug!(step_id = %core.id, round, "Action loop short-circuited via Output");
            return Ok(artifact);
        }

        let Some(raw) = parsed.action_json else {
            warn!(step_id = %core.id, round, "Completion carried no Action line");
            return Ok(Artifact::error("invalid JSON, try again"));
        };

        let parsed_action = match action::parse_action(&raw) {
            Ok(parsed_action) => parsed_action,
            Err(e) => {
                // Self-correction path: the parse failure becomes the
                // observation for the next round.
                let observation = format!("{e}; try again");
                substeps.push(Substep::new(
                    &core.id,
                    thought,
                    Some(ERROR_TOOL.to_string()),
                    None,
                    Artifact::output(observation),
                ));
                continue;
            }
        };

        if parsed_action.tool == EXIT_TOOL {
            let text = match &parsed_action.input {
                Value::Null => completion.text().to_string(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let artifact = Artifact::output(text);
            substeps.push(Substep::new(
                &core.id,
                thought,
                Some(EXIT_TOOL.to_string()),
                Some(parsed_action.input.clone()),
                artifact.clone(),
            ));
            debug!(step_id = %core.id, round, "Action loop exited");
            return Ok(artifact);
        }

        let Some(tool) = resolve(&parsed_action.tool) else {
            substeps.push(Substep::new(
                &core.id,
                thought,
                Some(parsed_action.tool.clone()),
                Some(parsed_action.input.clone()),
                Artifact::output("tool not found"),
            ));
            continue;
        };

        if let Err(e) = tool.validate(&parsed_action.input) {
            substeps.push(Substep::new(
                &core.id,
                thought,
                Some(ERROR_TOOL.to_string()),
                Some(parsed_action.input.clone()),
                Artifact::output(e.to_string()),
            ));
            continue;
        }

        let started = Instant::now();
        let (observation, success) = match tool.run(parsed_action.input.clone()).await {
            Ok(observation) => (observation, true),
            Err(e) => (format!("Error: {e}"), false),
        };
        ctx.events.publish(EngineEvent::ToolInvoked {
            step_id: core.id.to_string(),
            tool_name: tool.name().to_string(),
            success,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });

        substeps.push(Substep::new(
            &core.id,
            thought,
            Some(tool.name().to_string()),
            Some(parsed_action.input),
            Artifact::output(observation),
        ));
    }

    warn!(step_id = %core.id, max_substeps, "Substep budget exhausted");
    Ok(Artifact::error("exceeded maximum tool execution limit"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use stepweave_core::error::ToolError;
    use stepweave_core::event::EventBus;
    use stepweave_drivers::ScriptedDriver;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input text"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn run(&self, input: Value) -> Result<String, ToolError> {
            Ok(input["text"].as_str().unwrap_or("").to_string())
        }
    }

    fn ctx_with(driver: ScriptedDriver) -> StepContext {
        StepContext {
            driver: Arc::new(driver),
            context_block: String::new(),
            memory_block: String::new(),
            events: Arc::new(EventBus::default()),
        }
    }

    fn exit_action(answer: &str) -> String {
        format!("Action: {{\"tool\": \"exit\", \"input\": \"{answer}\"}}")
    }

    #[tokio::test]
    async fn immediate_exit_terminates_in_one_substep() {
        let mut step = ToolStep::new("solve it", Arc::new(EchoTool));
        let core = StepCore::new();
        let ctx = ctx_with(ScriptedDriver::repeating(exit_action("done")));

        let artifact = step.run(&core, &ctx).await.unwrap();
        assert_eq!(artifact.text(), "done");
        assert_eq!(step.substeps.len(), 1);
        assert_eq!(step.substeps[0].tool_name.as_deref(), Some("exit"));
    }

    #[tokio::test]
    async fn tool_round_then_exit() {
        let script = vec![
            "Thought: echo first\nAction: {\"tool\": \"echo\", \"input\": {\"text\": \"ping\"}}"
                .to_string(),
            exit_action("pong"),
        ];
        let mut step = ToolStep::new("bounce it", Arc::new(EchoTool));
        let core = StepCore::new();
        let ctx = ctx_with(ScriptedDriver::sequence(script));

        let artifact = step.run(&core, &ctx).await.unwrap();
        assert_eq!(artifact.text(), "pong");
        assert_eq!(step.substeps.len(), 2);

        let first = &step.substeps[0];
        assert_eq!(first.tool_name.as_deref(), Some("echo"));
        assert_eq!(first.thought.as_deref(), Some("echo first"));
        assert_eq!(first.output.as_ref().unwrap().text(), "ping");
        assert_eq!(first.step_id, core.id);
    }

    #[tokio::test]
    async fn malformed_json_feeds_error_substep() {
        let script = vec![
            "Action: {definitely not json}".to_string(),
            exit_action("recovered"),
        ];
        let mut step = ToolStep::new("try", Arc::new(EchoTool));
        let core = StepCore::new();
        let ctx = ctx_with(ScriptedDriver::sequence(script));

        let artifact = step.run(&core, &ctx).await.unwrap();
        assert_eq!(artifact.text(), "recovered");
        assert_eq!(step.substeps.len(), 2);
        assert_eq!(step.substeps[0].tool_name.as_deref(), Some("error"));
        assert!(
            step.substeps[0]
                .output
                .as_ref()
                .unwrap()
                .text()
                .contains("try again")
        );
    }

    #[tokio::test]
    async fn schema_violation_feeds_error_substep() {
        let script = vec![
            // "text" must be a string, not a number.
            "Action: {\"tool\": \"echo\", \"input\": {\"text\": 42}}".to_string(),
            exit_action("fixed"),
        ];
        let mut step = ToolStep::new("validate", Arc::new(EchoTool));
        let core = StepCore::new();
        let ctx = ctx_with(ScriptedDriver::sequence(script));

        let artifact = step.run(&core, &ctx).await.unwrap();
        assert_eq!(artifact.text(), "fixed");
        assert_eq!(step.substeps[0].tool_name.as_deref(), Some("error"));
    }

    #[tokio::test]
    async fn no_action_line_is_terminal() {
        let mut step = ToolStep::new("chat", Arc::new(EchoTool));
        let core = StepCore::new();
        let ctx = ctx_with(ScriptedDriver::repeating("I would rather just talk."));

        let artifact = step.run(&core, &ctx).await.unwrap();
        assert!(artifact.is_error());
        assert_eq!(artifact.text(), "invalid JSON, try again");
        assert!(step.substeps.is_empty());
    }

    #[tokio::test]
    async fn substep_budget_exhaustion() {
        let loop_forever =
            "Action: {\"tool\": \"echo\", \"input\": {\"text\": \"again\"}}".to_string();
        let mut step = ToolStep::new("never stop", Arc::new(EchoTool)).with_max_substeps(4);
        let core = StepCore::new();
        let ctx = ctx_with(ScriptedDriver::repeating(loop_forever));

        let artifact = step.run(&core, &ctx).await.unwrap();
        assert!(artifact.is_error());
        assert_eq!(artifact.text(), "exceeded maximum tool execution limit");
        assert_eq!(step.substeps.len(), 4);
    }

    #[tokio::test]
    async fn unknown_tool_observes_not_found() {
        let script = vec![
            "Action: {\"tool\": \"missing\", \"input\": {}}".to_string(),
            exit_action("ok"),
        ];
        let mut step = ToolStep::new("lookup", Arc::new(EchoTool));
        let core = StepCore::new();
        let ctx = ctx_with(ScriptedDriver::sequence(script));

        step.run(&core, &ctx).await.unwrap();
        assert_eq!(step.substeps[0].tool_name.as_deref(), Some("missing"));
        assert_eq!(
            step.substeps[0].output.as_ref().unwrap().text(),
            "tool not found"
        );
    }

    #[tokio::test]
    async fn exit_without_input_returns_raw_completion() {
        let completion = "Thought: finished\nAction: {\"tool\": \"exit\"}";
        let mut step = ToolStep::new("wrap up", Arc::new(EchoTool));
        let core = StepCore::new();
        let ctx = ctx_with(ScriptedDriver::repeating(completion));

        let artifact = step.run(&core, &ctx).await.unwrap();
        assert_eq!(artifact.text(), completion);
    }

    #[tokio::test]
    async fn toolkit_resolves_from_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let script = vec![
            "Action: {\"tool\": \"echo\", \"input\": {\"text\": \"from registry\"}}".to_string(),
            exit_action("done"),
        ];
        let mut step = ToolkitStep::new("use the kit", Arc::new(registry));
        let core = StepCore::new();
        let ctx = ctx_with(ScriptedDriver::sequence(script));

        step.run(&core, &ctx).await.unwrap();
        assert_eq!(
            step.substeps[0].output.as_ref().unwrap().text(),
            "from registry"
        );
    }

    #[tokio::test]
    async fn toolkit_honors_output_shortcut() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let mut step = ToolkitStep::new("answer", Arc::new(registry));
        let core = StepCore::new();
        let ctx = ctx_with(ScriptedDriver::repeating("Output: direct answer"));

        let artifact = step.run(&core, &ctx).await.unwrap();
        assert_eq!(artifact.text(), "direct answer");
        assert_eq!(step.substeps.len(), 1);
        assert!(step.substeps[0].tool_name.is_none());
    }

    #[tokio::test]
    async fn tool_step_ignores_output_shortcut() {
        let mut step = ToolStep::new("answer", Arc::new(EchoTool));
        let core = StepCore::new();
        let ctx = ctx_with(ScriptedDriver::repeating("Output: direct answer"));

        // No Action line and no shortcut: terminal parse failure.
        let artifact = step.run(&core, &ctx).await.unwrap();
        assert!(artifact.is_error());
    }

    #[test]
    fn transcript_renders_protocol_lines() {
        let step_id = StepId::new();
        let substeps = vec![Substep::new(
            &step_id,
            Some("check".into()),
            Some("echo".into()),
            Some(serde_json::json!({"text": "hi"})),
            Artifact::output("hi"),
        )];
        let core = StepCore::new();
        let ctx = StepContext {
            driver: Arc::new(ScriptedDriver::repeating("unused")),
            context_block: String::new(),
            memory_block: String::new(),
            events: Arc::new(EventBus::default()),
        };

        let rendered = render_loop_prompt("prompt", &core, &ctx, &[], &substeps);
        assert!(rendered.contains("Thought: check"));
        assert!(rendered.contains("\"tool\":\"echo\""));
        assert!(rendered.contains("Observation: hi"));
    }
}
