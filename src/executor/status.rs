//! @ai:module:intent Per-item execution status and run result types
//! @ai:module:layer domain
//! @ai:module:public_api ExecutionStatus, ExecutionDetail, WorkItem, RunResult
//! @ai:module:stateless true

use serde::{Deserialize, Serialize};

/// @ai:intent Closed set of per-item outcome states
/// @ai:effects pure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    MissingInput,
    Failed,
    DidNotRun,
}

impl ExecutionStatus {
    /// @ai:intent Convert status to its serialized representation
    /// @ai:effects pure
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::MissingInput => "MISSING_INPUT",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::DidNotRun => "DID_NOT_RUN",
        }
    }

    /// @ai:intent Whether no further transition can happen
    /// @ai:effects pure
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::MissingInput
                | ExecutionStatus::Failed
                | ExecutionStatus::DidNotRun
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// @ai:intent Execution record for a single work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDetail {
    pub status: ExecutionStatus,
    /// One entry per failed attempt, in attempt order
    pub exceptions: Vec<String>,
    /// Wall-clock time summed across attempts
    pub execution_seconds: f64,
}

impl ExecutionDetail {
    /// @ai:intent Create a detail for an item that has not been attempted
    /// @ai:effects pure
    pub fn pending() -> Self {
        Self {
            status: ExecutionStatus::Pending,
            exceptions: Vec::new(),
            execution_seconds: 0.0,
        }
    }
}

impl Default for ExecutionDetail {
    fn default() -> Self {
        Self::pending()
    }
}

/// @ai:intent Input value paired with its submission position
#[derive(Debug, Clone)]
pub struct WorkItem<I> {
    pub index: usize,
    pub input: I,
}

impl<I> WorkItem<I> {
    /// @ai:intent Number inputs in submission order
    /// @ai:effects pure
    pub fn enumerate(inputs: Vec<I>) -> Vec<WorkItem<I>> {
        inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| WorkItem { index, input })
            .collect()
    }
}

/// @ai:intent Results and details aligned 1:1 with the submitted inputs
/// @ai:post results.len() == details.len() == number of inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult<O> {
    pub results: Vec<Option<O>>,
    pub details: Vec<ExecutionDetail>,
}

impl<O> RunResult<O> {
    /// @ai:intent Build a run result from pre-sized slots
    /// @ai:pre results.len() == details.len()
    /// @ai:effects pure
    pub(crate) fn from_slots(results: Vec<Option<O>>, details: Vec<ExecutionDetail>) -> Self {
        debug_assert_eq!(results.len(), details.len());
        Self { results, details }
    }

    /// @ai:intent Empty run result
    /// @ai:effects pure
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            details: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// @ai:intent Status of every item in submission order
    /// @ai:effects pure
    pub fn statuses(&self) -> Vec<ExecutionStatus> {
        self.details.iter().map(|d| d.status).collect()
    }

    /// @ai:intent Iterate over (result, detail) pairs in submission order
    /// @ai:effects pure
    pub fn iter(&self) -> impl Iterator<Item = (&Option<O>, &ExecutionDetail)> {
        self.results.iter().zip(self.details.iter())
    }

    /// @ai:intent Split into the two aligned sequences
    /// @ai:effects pure
    pub fn into_parts(self) -> (Vec<Option<O>>, Vec<ExecutionDetail>) {
        (self.results, self.details)
    }
}
