//! @ai:module:intent LLM classification consumer of the executor
//! @ai:module:layer application
//! @ai:module:public_api ClassificationRunner, PromptTemplate, snap_to_rail, load_rows

pub mod rails;
pub mod runner;
pub mod template;

pub use rails::{snap_to_rail, LabelParser, ParsedLabel, NOT_PARSABLE};
pub use runner::{
    Classification, ClassificationOptions, ClassificationRunner, ClassificationStatus,
};
pub use template::{PromptTemplate, Row};

use crate::error::Result;
use std::path::Path;

/// @ai:intent Load classification rows from a JSON Lines file of objects
/// @ai:effects fs:read
pub fn load_rows(path: &Path) -> Result<Vec<Row>> {
    crate::jsonl::read_jsonl(path)
}
