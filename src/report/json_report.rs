//! @ai:module:intent JSON report generation
//! @ai:module:layer infrastructure
//! @ai:module:public_api JsonReporter
//! @ai:module:stateless true

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// @ai:intent Writes any serializable report as pretty JSON
pub struct JsonReporter;

impl JsonReporter {
    /// @ai:intent Create a new JSON reporter
    /// @ai:effects pure
    pub fn new() -> Self {
        Self
    }

    /// @ai:intent Write a value as pretty JSON
    /// @ai:effects fs:write
    pub fn write<T: Serialize>(&self, value: &T, output_path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(output_path, json)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        Ok(())
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RunSummary;
    use tempfile::TempDir;

    #[test]
    fn test_write_json_report() {
        let reporter = JsonReporter::new();
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("summary.json");

        let summary = RunSummary {
            total: 3,
            completed: 2,
            failed: 1,
            total_exceptions: 1,
            ..Default::default()
        };

        reporter.write(&summary, &output).unwrap();
        assert!(output.exists());

        let content = std::fs::read_to_string(&output).unwrap();
        assert!(content.contains("\"completed\": 2"));

        let parsed: RunSummary = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, summary);
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("missing").join("summary.json");

        let err = JsonReporter::new()
            .write(&RunSummary::default(), &output)
            .unwrap_err();
        assert!(err.to_string().contains("Failed to write"));
    }
}
