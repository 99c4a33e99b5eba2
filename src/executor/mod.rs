//! @ai:module:intent Batch task execution with retries, abort and bounded concurrency
//! @ai:module:layer application
//! @ai:module:public_api SyncExecutor, ConcurrentExecutor, ExecutorOptions, ExecutorError, ExecutionStatus, ExecutionDetail, RunResult, StopSignal

mod attempt;
pub mod concurrent;
pub mod error;
pub mod options;
pub mod progress;
pub mod signal;
pub mod status;
pub mod sync;

pub use concurrent::ConcurrentExecutor;
pub use error::ExecutorError;
pub use options::ExecutorOptions;
pub use progress::{Progress, ProgressFn};
pub use signal::StopSignal;
pub use status::{ExecutionDetail, ExecutionStatus, RunResult, WorkItem};
pub use sync::SyncExecutor;
