//! Pluggable output rendering for reducer summaries

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::types::Summary;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Receives every summary produced by a run, exactly once each
///
/// Sink drains call this concurrently, one call per summary.
pub trait Renderer: Send + Sync {
    fn render(&self, summary: &Summary) -> PipelineResult<()>;
}

/// Human-readable line for a summary, e.g. `average noun per sentence: 2.667`
pub fn format_summary(summary: &Summary, unit: &str) -> String {
    format!("average {} per {}: {:.3}", summary.key, unit, summary.mean)
}

/// Prints one line per summary to stdout
#[derive(Debug, Clone)]
pub struct ConsoleRenderer {
    unit: String,
}

impl ConsoleRenderer {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }
}

impl Renderer for ConsoleRenderer {
    fn render(&self, summary: &Summary) -> PipelineResult<()> {
        let line = format_summary(summary, &self.unit);
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line).map_err(|source| PipelineError::Render {
            key: summary.key.clone(),
            source,
        })
    }
}

/// Emits each summary as a structured tracing event
#[derive(Debug, Clone, Default)]
pub struct TracingRenderer;

impl Renderer for TracingRenderer {
    fn render(&self, summary: &Summary) -> PipelineResult<()> {
        info!(
            key = %summary.key,
            mean = summary.mean,
            count = summary.count,
            sum = summary.sum,
            "partition summary"
        );
        Ok(())
    }
}

/// Keeps summaries in memory in arrival order
#[derive(Debug, Default)]
pub struct CollectingRenderer {
    summaries: Mutex<Vec<Summary>>,
}

impl CollectingRenderer {
    pub fn summaries(&self) -> Vec<Summary> {
        self.summaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Renderer for CollectingRenderer {
    fn render(&self, summary: &Summary) -> PipelineResult<()> {
        self.summaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(summary.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_summary() {
        let summary = Summary::from_totals("noun", 8, 3);
        assert_eq!(
            format_summary(&summary, "sentence"),
            "average noun per sentence: 2.667"
        );

        let empty = Summary::from_totals("verb", 0, 0);
        assert_eq!(format_summary(&empty, "line"), "average verb per line: NaN");
    }

    #[test]
    fn test_collecting_renderer_keeps_arrival_order() {
        let renderer = CollectingRenderer::default();
        renderer.render(&Summary::from_totals("verb", 7, 3)).unwrap();
        renderer.render(&Summary::from_totals("noun", 8, 3)).unwrap();

        let keys: Vec<_> = renderer.summaries().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["verb", "noun"]);
    }
}
