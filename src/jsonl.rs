//! @ai:module:intent JSON Lines loading and writing for rows and examples
//! @ai:module:layer infrastructure
//! @ai:module:public_api read_jsonl, write_jsonl
//! @ai:module:stateless true

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// @ai:intent Parse one JSON value per non-blank line
/// @ai:pre path points to a UTF-8 JSON Lines file
/// @ai:effects fs:read
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();

    for (line_index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let record = serde_json::from_str(line).map_err(|e| Error::Parse {
            file: path.to_path_buf(),
            line: line_index + 1,
            message: e.to_string(),
        })?;
        records.push(record);
    }

    tracing::debug!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// @ai:intent Write one JSON value per line
/// @ai:effects fs:write
pub fn write_jsonl<T: Serialize>(records: &[T], path: &Path) -> Result<()> {
    let mut content = String::new();
    for record in records {
        content.push_str(&serde_json::to_string(record)?);
        content.push('\n');
    }
    std::fs::write(path, content)?;
    Ok(())
}
