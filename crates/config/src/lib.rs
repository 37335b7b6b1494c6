//! Configuration loading and validation for the Stepweave engine.
//!
//! Loads engine settings from a TOML file with serde defaults for every
//! field, so an empty file is a valid configuration. Validates all
//! settings before the engine is constructed.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// The root engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Driver retry policy
    #[serde(default)]
    pub driver: DriverConfig,

    /// Memory strategy settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Workflow scheduler settings
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Tool-calling loop settings
    #[serde(default)]
    pub tools: ToolConfig,
}

/// Retry policy applied by the driver wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Maximum attempts per model call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed sleep between attempts, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Which memory strategy a Structure uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStrategy {
    /// Bounded buffer, drops the oldest exchanges (default)
    #[default]
    Buffer,
    /// Rolling summary, folds old exchanges through a summarizer
    Summary,
}

/// Memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub strategy: MemoryStrategy,

    /// Bound for the buffer strategy
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Exchanges kept verbatim by the summary strategy
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
}

fn default_buffer_size() -> usize {
    10
}
fn default_keep_recent() -> usize {
    4
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            strategy: MemoryStrategy::default(),
            buffer_size: default_buffer_size(),
            keep_recent: default_keep_recent(),
        }
    }
}

/// Workflow scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Maximum steps executing concurrently
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,
}

fn default_worker_limit() -> usize {
    4
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            worker_limit: default_worker_limit(),
        }
    }
}

/// Tool-calling loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Maximum action-loop rounds before a step fails
    #[serde(default = "default_max_substeps")]
    pub max_substeps: u32,
}

fn default_max_substeps() -> u32 {
    15
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            max_substeps: default_max_substeps(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, String> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| format!("Invalid config TOML: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read config {}: {e}", path.display()))?;
        Self::from_toml_str(&text)
    }

    /// Check every setting, collecting human-readable problems.
    pub fn validate(&self) -> Result<(), String> {
        let mut problems = Vec::new();

        if self.driver.max_retries == 0 {
            problems.push("driver.max_retries must be at least 1".to_string());
        }
        if self.memory.buffer_size == 0 {
            problems.push("memory.buffer_size must be at least 1".to_string());
        }
        if self.workflow.worker_limit == 0 {
            problems.push("workflow.worker_limit must be at least 1".to_string());
        }
        if self.tools.max_substeps == 0 {
            problems.push("tools.max_substeps must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }
}
