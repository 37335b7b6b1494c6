//! Error types for the Stepweave domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Stepweave operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Driver errors ---
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Structure errors ---
    #[error("Structure error: {0}")]
    Structure(#[from] StructureError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Driver not configured: {0}")]
    NotConfigured(String),

    #[error("Completion script exhausted: {0}")]
    Exhausted(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    #[error("Invalid tool schema: {0}")]
    InvalidSchema(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Summarization failed: {0}")]
    Summarization(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("Dependency cycle involving step {0}")]
    Cycle(String),

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Structure has no steps")]
    Empty,
}
