//! Bounded buffer memory — keeps the most recent exchanges, drops the
//! oldest.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use stepweave_core::error::MemoryError;
use stepweave_core::memory::{Exchange, Memory};
use stepweave_core::token::estimate_tokens;

/// Memory that retains at most `buffer_size` exchanges.
///
/// `record` appends, then pops from the front while the length exceeds
/// the bound, so `len() <= buffer_size` holds after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferMemory {
    entries: VecDeque<Exchange>,
    buffer_size: usize,
}

impl BufferMemory {
    /// Create a buffer retaining at most `buffer_size` exchanges.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            buffer_size,
        }
    }

    /// The configured bound.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Render the last `n` retained exchanges, oldest first.
    fn render_last(&self, n: usize) -> String {
        let skip = self.entries.len().saturating_sub(n);
        self.entries
            .iter()
            .skip(skip)
            .map(Exchange::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for BufferMemory {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl Memory for BufferMemory {
    fn name(&self) -> &str {
        "buffer"
    }

    async fn record(&mut self, exchange: Exchange) -> std::result::Result<(), MemoryError> {
        self.entries.push_back(exchange);
        while self.entries.len() > self.buffer_size {
            self.entries.pop_front();
        }
        debug!(
            retained = self.entries.len(),
            bound = self.buffer_size,
            "Buffer memory recorded exchange"
        );
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entries(&self) -> Vec<Exchange> {
        self.entries.iter().cloned().collect()
    }

    fn to_prompt_string(&self, budget: Option<usize>) -> String {
        let mut n = self.entries.len();
        let Some(budget) = budget else {
            return self.render_last(n);
        };
        loop {
            let rendered = self.render_last(n);
            if n == 0 || estimate_tokens(&rendered) <= budget {
                return rendered;
            }
            n -= 1;
        }
    }
}
