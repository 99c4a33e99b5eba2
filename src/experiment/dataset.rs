//! @ai:module:intent Dataset examples an experiment task runs over
//! @ai:module:layer domain
//! @ai:module:public_api Example, load_examples
//! @ai:module:stateless true

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

/// @ai:intent One dataset example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: String,
    #[serde(default)]
    pub input: Value,
    /// Reference output, if the dataset has one
    #[serde(default)]
    pub expected: Value,
    #[serde(default)]
    pub metadata: Value,
}

impl Example {
    /// @ai:intent Create an example with no expected output or metadata
    /// @ai:effects pure
    pub fn new(id: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            input,
            expected: Value::Null,
            metadata: Value::Null,
        }
    }

    pub fn with_expected(mut self, expected: Value) -> Self {
        self.expected = expected;
        self
    }
}

/// @ai:intent Load examples from JSON Lines
/// @ai:post example ids are unique
/// @ai:effects fs:read
pub fn load_examples(path: &Path) -> Result<Vec<Example>> {
    let examples: Vec<Example> = crate::jsonl::read_jsonl(path)?;

    let mut seen = HashSet::new();
    for example in &examples {
        if !seen.insert(example.id.as_str()) {
            return Err(Error::InvalidConfig(format!(
                "Duplicate example id '{}' in {}",
                example.id,
                path.display()
            )));
        }
    }

    tracing::info!("Loaded {} examples from {}", examples.len(), path.display());
    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_load_examples_with_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("examples.jsonl");
        std::fs::write(
            &path,
            "{\"id\": \"ex-1\", \"input\": {\"q\": \"2+2\"}, \"expected\": \"4\"}\n{\"id\": \"ex-2\"}\n",
        )
        .unwrap();

        let examples = load_examples(&path).unwrap();

        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].input, json!({"q": "2+2"}));
        assert_eq!(examples[0].expected, json!("4"));
        assert_eq!(examples[1].input, Value::Null);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("examples.jsonl");
        std::fs::write(&path, "{\"id\": \"a\"}\n{\"id\": \"a\"}\n").unwrap();

        assert!(matches!(load_examples(&path), Err(Error::InvalidConfig(_))));
    }
}
