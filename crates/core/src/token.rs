//! Token estimation against a model's context window.
//!
//! Uses a character-based heuristic: ~4 characters per token.
//! This approximation is accurate within ~10% for BPE tokenizers
//! (GPT-3.5, GPT-4, Claude) on English text.

use serde::{Deserialize, Serialize};

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() + 3) / 4
}

/// A tokenizer bound to a model's context window.
///
/// Answers "how many tokens does this text cost?" and "how many tokens
/// remain in the window after this text?". Structures use the remainder
/// as the memory-pruning budget before each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokenizer {
    context_window: usize,
}

impl Tokenizer {
    /// Create a tokenizer for a model with the given context window.
    pub fn new(context_window: usize) -> Self {
        Self { context_window }
    }

    /// The context window size in tokens.
    pub fn context_window(&self) -> usize {
        self.context_window
    }

    /// Count the tokens in a piece of text.
    pub fn count(&self, text: &str) -> usize {
        estimate_tokens(text)
    }

    /// Tokens remaining in the window after the given text.
    pub fn remaining(&self, text: &str) -> usize {
        self.context_window.saturating_sub(self.count(text))
    }

    /// Whether the text fits within the context window.
    pub fn fits(&self, text: &str) -> bool {
        self.count(text) <= self.context_window
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(crate::driver::DEFAULT_CONTEXT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn hundred_chars() {
        let text = "a".repeat(100);
        assert_eq!(estimate_tokens(&text), 25);
    }

    #[test]
    fn remaining_subtracts_cost() {
        let tokenizer = Tokenizer::new(100);
        let text = "a".repeat(40); // 10 tokens
        assert_eq!(tokenizer.remaining(&text), 90);
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let tokenizer = Tokenizer::new(5);
        let text = "a".repeat(100); // 25 tokens
        assert_eq!(tokenizer.remaining(&text), 0);
        assert!(!tokenizer.fits(&text));
    }

    #[test]
    fn fits_at_exact_boundary() {
        let tokenizer = Tokenizer::new(25);
        let text = "a".repeat(100); // exactly 25 tokens
        assert!(tokenizer.fits(&text));
    }
}
