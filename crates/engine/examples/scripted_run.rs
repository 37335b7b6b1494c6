//! Runs a pipeline and a workflow against a scripted driver, printing
//! the outputs. Useful for watching the engine's tracing output:
//!
//! ```sh
//! RUST_LOG=debug cargo run --example scripted_run
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stepweave_core::error::ToolError;
use stepweave_core::tool::{Tool, ToolRegistry};
use stepweave_drivers::{RetryDriver, ScriptedDriver};
use stepweave_engine::{Pipeline, Step, Workflow};

struct WordCountTool;

#[async_trait]
impl Tool for WordCountTool {
    fn name(&self) -> &str {
        "word_count"
    }
    fn description(&self) -> &str {
        "Counts the words in a piece of text"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" }
            },
            "required": ["text"]
        })
    }
    async fn run(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let text = input["text"].as_str().unwrap_or("");
        Ok(text.split_whitespace().count().to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // ── Pipeline: a prompt step feeding a toolkit step ──
    let script = vec![
        "A quick draft about execution engines".to_string(),
        "Thought: measure the draft\n\
         Action: {\"tool\": \"word_count\", \"input\": {\"text\": \"a quick draft\"}}"
            .to_string(),
        "Action: {\"tool\": \"exit\", \"input\": \"draft measured: 3 words\"}".to_string(),
    ];
    let driver = Arc::new(RetryDriver::new(
        Arc::new(ScriptedDriver::new(
            script.into_iter().map(Ok).collect(),
        )),
        3,
        Duration::from_millis(100),
    ));

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WordCountTool));

    let mut pipeline = Pipeline::builder(driver)
        .context("You are a writing assistant.")
        .prompt_step("Write a one-line draft.")
        .step(Step::toolkit("Measure the draft.", Arc::new(registry)))
        .build()?;

    let output = pipeline.run(None).await?;
    println!("pipeline output: {output}");
    println!("memory entries: {}", pipeline.memory().len());

    // ── Workflow: two parallel steps joined by a third ──
    let driver = Arc::new(ScriptedDriver::repeating("section done"));
    let mut builder = Workflow::builder(driver);
    builder.worker_limit(2);
    let intro = builder.add_step(Step::prompt("Write the intro."));
    let body = builder.add_step(Step::prompt("Write the body."));
    let merge = builder.add_step(Step::prompt("Merge the sections."));
    builder.link(&intro, &merge)?;
    builder.link(&body, &merge)?;
    let mut workflow = builder.build()?;

    let outputs = workflow.run(None).await?;
    for artifact in outputs {
        println!("workflow output: {artifact}");
    }

    Ok(())
}
