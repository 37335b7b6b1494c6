//! Memory trait — bounded conversational history.
//!
//! A Structure records each completed exchange (rendered prompt, output)
//! into its Memory, and renders the history back into future prompts.
//! Strategies decide how history degrades: the buffer strategy drops the
//! oldest exchanges, the summary strategy folds them into a running
//! summary. Implementations live in the `stepweave-memory` crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::token::estimate_tokens;

/// A single recorded exchange: the rendered prompt and the output it
/// produced, in timestamp order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// The prompt as it was sent to the driver
    pub prompt: String,

    /// The output value produced
    pub output: String,

    /// When this exchange was recorded
    pub recorded_at: DateTime<Utc>,
}

impl Exchange {
    pub fn new(prompt: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            output: output.into(),
            recorded_at: Utc::now(),
        }
    }

    /// Render this exchange as prompt text.
    pub fn render(&self) -> String {
        format!("Prompt: {}\nOutput: {}", self.prompt, self.output)
    }

    /// Token cost of the rendered exchange.
    pub fn token_cost(&self) -> usize {
        estimate_tokens(&self.render())
    }
}

/// The core Memory trait.
///
/// Memory is owned exclusively by its Structure and mutated only by the
/// Structure's coordinator, which is why `record` takes `&mut self`.
/// Steps never touch Memory directly.
#[async_trait]
pub trait Memory: Send + Sync {
    /// The strategy name (e.g., "buffer", "summary").
    fn name(&self) -> &str;

    /// Append an exchange, applying the strategy's bounding rule.
    async fn record(&mut self, exchange: Exchange) -> std::result::Result<(), MemoryError>;

    /// Number of retained exchanges.
    fn len(&self) -> usize;

    /// Whether no history is retained at all.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The retained exchanges, oldest first.
    fn entries(&self) -> Vec<Exchange>;

    /// Render the history as a prompt block.
    ///
    /// With a budget, renders the last `n` exchanges for the largest `n`
    /// whose rendering fits within `budget` tokens (linear search; `n`
    /// may reach 0). Without a budget, renders everything.
    fn to_prompt_string(&self, budget: Option<usize>) -> String;
}
