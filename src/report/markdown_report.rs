//! @ai:module:intent Markdown report generation
//! @ai:module:layer infrastructure
//! @ai:module:public_api MarkdownReporter
//! @ai:module:stateless true

use crate::report::RunSummary;
use anyhow::Result;
use std::fmt::Write as FmtWrite;
use std::path::Path;

/// @ai:intent Renders run summaries as Markdown tables
pub struct MarkdownReporter;

impl MarkdownReporter {
    /// @ai:intent Create a new Markdown reporter
    /// @ai:effects pure
    pub fn new() -> Self {
        Self
    }

    /// @ai:intent Generate the status table
    /// @ai:effects pure
    fn generate_status_table(summary: &RunSummary) -> String {
        let mut output = String::new();

        writeln!(output, "## Execution Status").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "| Status | Count |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Completed | {} |", summary.completed).unwrap();
        writeln!(
            output,
            "| Completed with retries | {} |",
            summary.completed_with_retries
        )
        .unwrap();
        writeln!(output, "| Missing input | {} |", summary.missing_input).unwrap();
        writeln!(output, "| Failed | {} |", summary.failed).unwrap();
        writeln!(output, "| Did not run | {} |", summary.did_not_run).unwrap();
        writeln!(output, "| **Total** | **{}** |", summary.total).unwrap();
        writeln!(output).unwrap();

        writeln!(
            output,
            "**Completion rate:** {:.1}%  ",
            summary.completion_rate()
        )
        .unwrap();
        writeln!(output, "**Exceptions recorded:** {}  ", summary.total_exceptions).unwrap();
        writeln!(
            output,
            "**Execution time:** {:.2}s total, {:.2}s average",
            summary.total_execution_seconds, summary.avg_execution_seconds
        )
        .unwrap();
        writeln!(output).unwrap();

        output
    }

    /// @ai:intent Generate the label distribution table
    /// @ai:effects pure
    fn generate_label_table(labels: &[(String, usize)]) -> String {
        let mut output = String::new();

        writeln!(output, "## Labels").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "| Label | Count |").unwrap();
        writeln!(output, "|-------|-------|").unwrap();
        for (label, count) in labels {
            writeln!(output, "| {} | {} |", label, count).unwrap();
        }
        writeln!(output).unwrap();

        output
    }

    /// @ai:intent Render a full report; the label table is omitted when empty
    /// @ai:effects pure
    pub fn render(&self, title: &str, summary: &RunSummary, labels: &[(String, usize)]) -> String {
        let mut output = String::new();

        writeln!(output, "# {}", title).unwrap();
        writeln!(output).unwrap();
        output.push_str(&Self::generate_status_table(summary));
        if !labels.is_empty() {
            output.push_str(&Self::generate_label_table(labels));
        }

        output
    }

    /// @ai:intent Render and write a report to file
    /// @ai:effects fs:write
    pub fn generate(
        &self,
        title: &str,
        summary: &RunSummary,
        labels: &[(String, usize)],
        output_path: &Path,
    ) -> Result<()> {
        std::fs::write(output_path, self.render(title, summary, labels))?;
        Ok(())
    }
}

impl Default for MarkdownReporter {
    fn default() -> Self {
        Self::new()
    }
}
