//! @ai:module:intent evalkit library: batch executor, adaptive rate limiting and its consumers
//! @ai:module:layer application
//! @ai:module:public_api config, executor, rate_limiter, llm, classify, experiment, report

pub mod classify;
pub mod config;
pub mod error;
pub mod executor;
pub mod experiment;
pub mod jsonl;
pub mod llm;
pub mod rate_limiter;
pub mod report;

pub use classify::{Classification, ClassificationRunner, ClassificationStatus, PromptTemplate};
pub use config::EvalkitConfig;
pub use error::{Error, Result};
pub use executor::{
    ConcurrentExecutor, ExecutionDetail, ExecutionStatus, ExecutorError, ExecutorOptions,
    RunResult, StopSignal, SyncExecutor,
};
pub use experiment::{EvaluationRunner, ExperimentRunner, ExperimentTask};
pub use llm::{AnthropicClient, LlmClient, MockLlmClient};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use report::{ReportGenerator, RunSummary};
