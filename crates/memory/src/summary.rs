//! Rolling summary memory — folds old exchanges into a running summary
//! once they age past the keep-recent window, so recent context stays
//! exact while older context degrades gracefully.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use stepweave_core::driver::Driver;
use stepweave_core::error::MemoryError;
use stepweave_core::memory::{Exchange, Memory};
use stepweave_core::token::estimate_tokens;

/// Folds prior exchanges into a running summary.
///
/// Pluggable so tests can use a deterministic implementation while
/// production folds through a language model.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        prior_summary: &str,
        to_fold: &[Exchange],
    ) -> std::result::Result<String, MemoryError>;
}

/// A summarizer that folds exchanges through a [`Driver`].
pub struct DriverSummarizer {
    driver: Arc<dyn Driver>,
}

impl DriverSummarizer {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Summarizer for DriverSummarizer {
    async fn summarize(
        &self,
        prior_summary: &str,
        to_fold: &[Exchange],
    ) -> std::result::Result<String, MemoryError> {
        let folded = to_fold
            .iter()
            .map(Exchange::render)
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Condense the running summary and the exchanges below into a new, \
             shorter running summary. Keep every fact that later steps might need.\n\n\
             Summary so far:\n{prior_summary}\n\nNew exchanges:\n{folded}"
        );

        let artifact = self
            .driver
            .run(&prompt)
            .await
            .map_err(|e| MemoryError::Summarization(e.to_string()))?;
        if artifact.is_error() {
            return Err(MemoryError::Summarization(artifact.text().to_string()));
        }
        Ok(artifact.text().to_string())
    }
}

/// Serializable state of a [`SummaryMemory`] (everything except the
/// summarizer, which is re-attached on restore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarySnapshot {
    pub entries: Vec<Exchange>,
    pub summary: String,
    pub summary_index: usize,
    pub keep_recent: usize,
}

/// Memory that keeps the `keep_recent` most recent exchanges verbatim
/// and folds everything older into `summary`.
///
/// `summary_index` marks the boundary: entries before it are represented
/// only by the summary. The index only ever increases.
pub struct SummaryMemory {
    entries: Vec<Exchange>,
    summary: String,
    summary_index: usize,
    keep_recent: usize,
    summarizer: Arc<dyn Summarizer>,
}

impl SummaryMemory {
    /// Create a summary memory keeping `keep_recent` exchanges verbatim.
    pub fn new(keep_recent: usize, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            entries: Vec::new(),
            summary: String::new(),
            summary_index: 0,
            keep_recent,
            summarizer,
        }
    }

    /// The current running summary.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Index of the first exchange not yet folded into the summary.
    pub fn summary_index(&self) -> usize {
        self.summary_index
    }

    /// Export the serializable state.
    pub fn snapshot(&self) -> SummarySnapshot {
        SummarySnapshot {
            entries: self.entries.clone(),
            summary: self.summary.clone(),
            summary_index: self.summary_index,
            keep_recent: self.keep_recent,
        }
    }

    /// Rebuild from a snapshot, re-attaching a summarizer.
    pub fn from_snapshot(snapshot: SummarySnapshot, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            entries: snapshot.entries,
            summary: snapshot.summary,
            summary_index: snapshot.summary_index,
            keep_recent: snapshot.keep_recent,
            summarizer,
        }
    }

    /// Render the summary block plus the last `n` unsummarized exchanges.
    fn render_tail(&self, n: usize) -> String {
        let mut out = String::new();
        if !self.summary.is_empty() {
            out.push_str("Summary of earlier exchanges:\n");
            out.push_str(&self.summary);
        }
        let tail = &self.entries[self.summary_index..];
        let skip = tail.len().saturating_sub(n);
        for exchange in tail.iter().skip(skip) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&exchange.render());
        }
        out
    }
}

#[async_trait]
impl Memory for SummaryMemory {
    fn name(&self) -> &str {
        "summary"
    }

    async fn record(&mut self, exchange: Exchange) -> std::result::Result<(), MemoryError> {
        self.entries.push(exchange);

        let unsummarized = self.entries.len() - self.summary_index;
        let fold_count = unsummarized.saturating_sub(self.keep_recent);
        if fold_count > 0 {
            let to_fold = &self.entries[self.summary_index..self.summary_index + fold_count];
            self.summary = self.summarizer.summarize(&self.summary, to_fold).await?;
            self.summary_index += fold_count;
            debug!(
                folded = fold_count,
                summary_index = self.summary_index,
                "Summary memory folded exchanges"
            );
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.summary.is_empty()
    }

    fn entries(&self) -> Vec<Exchange> {
        self.entries.clone()
    }

    fn to_prompt_string(&self, budget: Option<usize>) -> String {
        let tail_len = self.entries.len() - self.summary_index;
        let mut n = tail_len;
        let Some(budget) = budget else {
            return self.render_tail(n);
        };
        loop {
            let rendered = self.render_tail(n);
            if n == 0 || estimate_tokens(&rendered) <= budget {
                return rendered;
            }
            n -= 1;
        }
    }
}
