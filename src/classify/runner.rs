//! @ai:module:intent Batch LLM classification of rows onto a fixed label set
//! @ai:module:layer application
//! @ai:module:public_api ClassificationRunner, ClassificationOptions, Classification, ClassificationStatus
//! @ai:module:stateless false

use crate::classify::rails::{LabelParser, ParsedLabel, EXPLANATION_INSTRUCTIONS};
use crate::classify::template::{PromptTemplate, Row};
use crate::error::Result;
use crate::executor::{
    ConcurrentExecutor, ExecutionDetail, ExecutionStatus, ExecutorError, ExecutorOptions,
    ProgressFn, RunResult, StopSignal,
};
use crate::llm::LlmClient;
use crate::rate_limiter::RateLimiter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// @ai:intent Per-row outcome of a classification run
///            Superset of the executor statuses that separates clean and retried completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationStatus {
    DidNotRun,
    Completed,
    CompletedWithRetries,
    Failed,
    MissingInput,
}

impl From<&ExecutionDetail> for ClassificationStatus {
    fn from(detail: &ExecutionDetail) -> Self {
        match detail.status {
            ExecutionStatus::Completed if detail.exceptions.is_empty() => Self::Completed,
            ExecutionStatus::Completed => Self::CompletedWithRetries,
            ExecutionStatus::MissingInput => Self::MissingInput,
            ExecutionStatus::Failed => Self::Failed,
            ExecutionStatus::DidNotRun | ExecutionStatus::Pending | ExecutionStatus::Running => {
                Self::DidNotRun
            }
        }
    }
}

impl From<&Classification> for ExecutionDetail {
    fn from(classification: &Classification) -> Self {
        let status = match classification.status {
            ClassificationStatus::Completed | ClassificationStatus::CompletedWithRetries => {
                ExecutionStatus::Completed
            }
            ClassificationStatus::MissingInput => ExecutionStatus::MissingInput,
            ClassificationStatus::Failed => ExecutionStatus::Failed,
            ClassificationStatus::DidNotRun => ExecutionStatus::DidNotRun,
        };

        ExecutionDetail {
            status,
            exceptions: classification.exceptions.clone(),
            execution_seconds: classification.execution_seconds,
        }
    }
}

/// @ai:intent What to ask the model and how to read its answer
#[derive(Debug, Clone, Default)]
pub struct ClassificationOptions {
    pub rails: Vec<String>,
    pub provide_explanation: bool,
    pub system_prompt: Option<String>,
    /// Optional numeric score per rail
    pub scores: HashMap<String, f64>,
}

/// @ai:intent Classification result for one row, aligned with the input rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: Option<String>,
    pub explanation: Option<String>,
    pub score: Option<f64>,
    pub status: ClassificationStatus,
    pub exceptions: Vec<String>,
    pub execution_seconds: f64,
}

/// @ai:intent Renders each row into a prompt, asks the model, snaps the answer to a rail
pub struct ClassificationRunner<C> {
    client: Arc<C>,
    template: Arc<PromptTemplate>,
    parser: Arc<LabelParser>,
    options: ClassificationOptions,
    executor_options: ExecutorOptions,
    rate_limiter: Option<RateLimiter>,
    stop_signal: StopSignal,
    progress: Option<ProgressFn>,
}

impl<C: LlmClient + 'static> ClassificationRunner<C> {
    /// @ai:intent Create a runner with default executor options and no rate limiter
    /// @ai:effects pure
    pub fn new(client: C, template: PromptTemplate, options: ClassificationOptions) -> Self {
        Self {
            client: Arc::new(client),
            template: Arc::new(template),
            parser: Arc::new(LabelParser::new(options.rails.clone())),
            options,
            executor_options: ExecutorOptions::default(),
            rate_limiter: None,
            stop_signal: StopSignal::new(),
            progress: None,
        }
    }

    pub fn with_executor_options(mut self, options: ExecutorOptions) -> Self {
        self.executor_options = options;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn with_stop_signal(mut self, signal: StopSignal) -> Self {
        self.stop_signal = signal;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// @ai:intent Classify every row
    /// @ai:post output[i] belongs to rows[i]
    /// @ai:effects network
    pub async fn run(&self, rows: Vec<Row>) -> Result<Vec<Classification>> {
        tracing::info!(
            "Classifying {} rows onto rails {:?} (concurrency {})",
            rows.len(),
            self.options.rails,
            self.executor_options.concurrency
        );

        let client = self.client.clone();
        let template = self.template.clone();
        let parser = self.parser.clone();
        let system_prompt = self.options.system_prompt.clone();
        let explain = self.options.provide_explanation;

        let generate = move |row: Row| {
            let client = client.clone();
            let template = template.clone();
            let parser = parser.clone();
            let system_prompt = system_prompt.clone();

            async move {
                let mut prompt = template.render(&row)?;
                if explain {
                    prompt.push_str(EXPLANATION_INSTRUCTIONS);
                }

                let response = client.complete(&prompt, system_prompt.as_deref()).await?;
                Ok::<ParsedLabel, ExecutorError>(parser.parse(&response.content, explain))
            }
        };

        let run = match &self.rate_limiter {
            Some(limiter) => {
                let limiter = limiter.clone().with_stop_signal(self.stop_signal.clone());
                self.execute(limiter.wrap(generate), rows).await?
            }
            None => self.execute(generate, rows).await?,
        };

        Ok(self.collect(run))
    }

    async fn execute<F, Fut>(&self, generate: F, rows: Vec<Row>) -> Result<RunResult<ParsedLabel>>
    where
        F: Fn(Row) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<ParsedLabel, ExecutorError>> + Send + 'static,
    {
        let mut executor = ConcurrentExecutor::new(generate, self.executor_options.clone())
            .with_stop_signal(self.stop_signal.clone());
        if let Some(progress) = &self.progress {
            executor = executor.with_progress(progress.clone());
        }
        executor.run(rows).await
    }

    fn collect(&self, run: RunResult<ParsedLabel>) -> Vec<Classification> {
        let (results, details) = run.into_parts();

        results
            .into_iter()
            .zip(details)
            .map(|(parsed, detail)| {
                let status = ClassificationStatus::from(&detail);
                let (label, explanation) = match parsed {
                    Some(parsed) => (Some(parsed.label), parsed.explanation),
                    None => (None, None),
                };
                let score = label
                    .as_ref()
                    .and_then(|label| self.options.scores.get(label).copied());

                Classification {
                    label,
                    explanation,
                    score,
                    status,
                    exceptions: detail.exceptions,
                    execution_seconds: detail.execution_seconds,
                }
            })
            .collect()
    }
}
