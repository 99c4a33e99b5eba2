//! @ai:module:intent Experiment task and evaluation consumers of the executor
//! @ai:module:layer application
//! @ai:module:public_api ExperimentRunner, EvaluationRunner, ExperimentTask, Evaluator, RunStore, Example

pub mod dataset;
pub mod runner;
pub mod store;
pub mod task;

pub use dataset::{load_examples, Example};
pub use runner::{BatchOutcome, EvaluationRunner, ExperimentReport, ExperimentRunner};
pub use store::{
    EvaluationRecord, ExperimentRun, HttpRunStore, InMemoryRunStore, RecordOutcome, RunStore,
    StoreError,
};
pub use task::{EvaluationResult, Evaluator, ExactMatch, ExperimentTask, FnEvaluator};
