//! Artifact — the immutable value object produced by every run.
//!
//! Drivers, Tools, and Steps all hand their results around as Artifacts.
//! A failed step produces an Error artifact instead of raising, so the
//! schedulers can treat "errored" uniformly with "produced output".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::token::Tokenizer;

/// Whether an artifact carries a regular output or a captured failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Output,
    Error,
}

/// An immutable value container produced by a Driver, Tool, or Step.
///
/// Construct with [`Artifact::output`] or [`Artifact::error`]; there are
/// no mutators once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    kind: ArtifactKind,
    text: String,
    created_at: DateTime<Utc>,
}

impl Artifact {
    /// Create a regular output artifact.
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Output,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    /// Create an error artifact from a captured failure.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Error,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    /// The artifact's text content.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The artifact kind.
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Whether this artifact captures a failure.
    pub fn is_error(&self) -> bool {
        self.kind == ArtifactKind::Error
    }

    /// When this artifact was produced.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Token cost of this artifact's text under the given tokenizer.
    pub fn token_count(&self, tokenizer: &Tokenizer) -> usize {
        tokenizer.count(&self.text)
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}
