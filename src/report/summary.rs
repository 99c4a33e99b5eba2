//! @ai:module:intent Aggregate per-item execution details into run summaries
//! @ai:module:layer application
//! @ai:module:public_api RunSummary
//! @ai:module:stateless true

use crate::executor::{ExecutionDetail, ExecutionStatus};
use serde::{Deserialize, Serialize};

/// @ai:intent Counts and timings over one executor run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    /// Completed items that recorded at least one failed attempt
    pub completed_with_retries: usize,
    pub missing_input: usize,
    pub failed: usize,
    pub did_not_run: usize,
    pub total_exceptions: usize,
    pub total_execution_seconds: f64,
    pub avg_execution_seconds: f64,
}

impl RunSummary {
    /// @ai:intent Summarize execution details
    /// @ai:post avg_execution_seconds averages over items that ran at all
    /// @ai:effects pure
    pub fn from_details(details: &[ExecutionDetail]) -> Self {
        let mut summary = Self {
            total: details.len(),
            ..Default::default()
        };

        for detail in details {
            match detail.status {
                ExecutionStatus::Completed => {
                    summary.completed += 1;
                    if !detail.exceptions.is_empty() {
                        summary.completed_with_retries += 1;
                    }
                }
                ExecutionStatus::MissingInput => summary.missing_input += 1,
                ExecutionStatus::Failed => summary.failed += 1,
                ExecutionStatus::DidNotRun | ExecutionStatus::Pending | ExecutionStatus::Running => {
                    summary.did_not_run += 1
                }
            }
            summary.total_exceptions += detail.exceptions.len();
            summary.total_execution_seconds += detail.execution_seconds;
        }

        let ran = summary.total - summary.did_not_run;
        if ran > 0 {
            summary.avg_execution_seconds = summary.total_execution_seconds / ran as f64;
        }

        summary
    }

    /// @ai:intent Share of items that completed, in percent
    /// @ai:effects pure
    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed as f64 / self.total as f64) * 100.0
    }
}
