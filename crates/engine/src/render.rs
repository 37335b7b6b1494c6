//! Prompt-stack rendering.
//!
//! Every driver call sends a single text prompt assembled from layers:
//! the structure's context block, the budget-pruned memory block, and
//! the step-specific framing. Tool-calling steps additionally render
//! their tool definitions, protocol instructions, and transcript.

use stepweave_core::tool::ToolDefinition;

/// Instructions rendered into every tool-calling prompt so the model
/// knows the action protocol.
pub const ACTION_GUIDE: &str = "Respond with a line of the form \
`Action: {\"tool\": \"<name>\", \"input\": <json>}` to call a tool. \
The observation will be returned to you. When you have the final \
answer, respond with `Action: {\"tool\": \"exit\", \"input\": \"<answer>\"}`.";

/// Assemble the prompt stack: context block, memory block, then framing.
pub fn render_prompt_stack(context: &str, memory: &str, framing: &str) -> String {
    let mut out = String::new();
    if !context.is_empty() {
        out.push_str(context);
        out.push_str("\n\n");
    }
    if !memory.is_empty() {
        out.push_str("## Prior Exchanges\n");
        out.push_str(memory);
        out.push_str("\n\n");
    }
    out.push_str(framing);
    out
}

/// Render tool definitions as a prompt section.
pub fn render_tool_definitions(definitions: &[ToolDefinition]) -> String {
    let mut out = String::from("## Available Tools\n");
    for def in definitions {
        out.push_str(&format!(
            "- {}: {}\n  input schema: {}\n",
            def.name, def.description, def.input_schema
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_orders_context_memory_framing() {
        let rendered = render_prompt_stack("CONTEXT", "MEMORY", "FRAMING");
        let ctx_pos = rendered.find("CONTEXT").unwrap();
        let mem_pos = rendered.find("MEMORY").unwrap();
        let framing_pos = rendered.find("FRAMING").unwrap();
        assert!(ctx_pos < mem_pos);
        assert!(mem_pos < framing_pos);
    }

    #[test]
    fn empty_layers_are_omitted() {
        let rendered = render_prompt_stack("", "", "just the framing");
        assert_eq!(rendered, "just the framing");
        assert!(!rendered.contains("Prior Exchanges"));
    }

    #[test]
    fn memory_layer_gets_a_heading() {
        let rendered = render_prompt_stack("", "Prompt: p\nOutput: o", "ask");
        assert!(rendered.contains("## Prior Exchanges"));
    }

    #[test]
    fn tool_definitions_render_name_and_schema() {
        let defs = vec![ToolDefinition {
            name: "calculator".into(),
            description: "Evaluates expressions".into(),
            input_schema: serde_json::json!({"type": "object"}),
        }];
        let rendered = render_tool_definitions(&defs);
        assert!(rendered.contains("calculator"));
        assert!(rendered.contains("Evaluates expressions"));
        assert!(rendered.contains("\"type\":\"object\""));
    }
}
