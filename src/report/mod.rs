//! @ai:module:intent Summaries and report files for executor runs
//! @ai:module:layer infrastructure
//! @ai:module:public_api RunSummary, ReportGenerator, JsonReporter, MarkdownReporter

pub mod json_report;
pub mod markdown_report;
pub mod summary;

pub use json_report::JsonReporter;
pub use markdown_report::MarkdownReporter;
pub use summary::RunSummary;

use crate::classify::Classification;
use crate::executor::ExecutionDetail;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

/// @ai:intent Combined report generator for classification runs
pub struct ReportGenerator {
    json: JsonReporter,
    markdown: MarkdownReporter,
}

impl ReportGenerator {
    /// @ai:intent Create a new report generator
    /// @ai:effects pure
    pub fn new() -> Self {
        Self {
            json: JsonReporter::new(),
            markdown: MarkdownReporter::new(),
        }
    }

    /// @ai:intent Write classifications.jsonl, summary.json and summary.md into a directory
    /// @ai:effects fs:write
    pub fn generate_all(
        &self,
        title: &str,
        classifications: &[Classification],
        output_dir: &Path,
    ) -> Result<RunSummary> {
        std::fs::create_dir_all(output_dir)?;

        let summary = summarize_classifications(classifications);
        let labels = label_counts(classifications);

        crate::jsonl::write_jsonl(classifications, &output_dir.join("classifications.jsonl"))?;
        self.json.write(&summary, &output_dir.join("summary.json"))?;
        self.markdown
            .generate(title, &summary, &labels, &output_dir.join("summary.md"))?;

        tracing::info!("Reports generated in {}", output_dir.display());
        Ok(summary)
    }
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// @ai:intent Rebuild a run summary from saved classifications
/// @ai:effects pure
pub fn summarize_classifications(classifications: &[Classification]) -> RunSummary {
    let details: Vec<ExecutionDetail> = classifications.iter().map(ExecutionDetail::from).collect();
    RunSummary::from_details(&details)
}

/// @ai:intent Count labels, most frequent first; ties ordered by label
/// @ai:effects pure
pub fn label_counts(classifications: &[Classification]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for label in classifications.iter().filter_map(|c| c.label.as_deref()) {
        *counts.entry(label).or_default() += 1;
    }

    let mut counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(label, count)| (label.to_string(), count))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}
