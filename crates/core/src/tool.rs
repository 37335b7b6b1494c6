//! Tool trait — the abstraction over step capabilities.
//!
//! Tools are what give tool-calling steps the ability to act in the
//! world: evaluate expressions, query services, read data sources, etc.
//! The engine never inspects a tool beyond its name, schema, and `run`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ToolError;

/// A tool's advertised surface, rendered into prompts so the model knows
/// what it may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's input
    pub input_schema: serde_json::Value,
}

/// The core Tool trait.
///
/// Tools are registered explicitly in a [`ToolRegistry`]; there is no
/// reflection-based discovery. Implementations holding mutable state are
/// responsible for their own thread-safety: a tool may be shared
/// read-only across concurrently executing steps.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "calculator", "web_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (rendered into the prompt).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given input, returning the observation.
    async fn run(&self, input: serde_json::Value) -> std::result::Result<String, ToolError>;

    /// Validate an input value against this tool's schema.
    fn validate(&self, input: &serde_json::Value) -> std::result::Result<(), ToolError> {
        let schema = self.input_schema();
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| ToolError::InvalidSchema(e.to_string()))?;
        validator
            .validate(input)
            .map_err(|e| ToolError::InvalidInput(e.to_string()))
    }

    /// Convert this tool into a ToolDefinition for prompt rendering.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// A registry of available tools, keyed by name.
///
/// A ToolkitStep resolves the model's requested tool here; a plain
/// ToolStep carries a single tool directly. Entries are `Arc`-shared so
/// concurrent workflow steps can use the same tool instance.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get all tool definitions (for prompt rendering).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
