//! @ai:module:intent Experiment task runs and evaluator runs on top of the concurrent executor
//! @ai:module:layer application
//! @ai:module:public_api ExperimentRunner, EvaluationRunner, BatchOutcome, ExperimentReport
//! @ai:module:stateless false

use crate::error::{Error, Result};
use crate::executor::{
    ConcurrentExecutor, ExecutionDetail, ExecutorError, ExecutorOptions, RunResult, StopSignal,
};
use crate::experiment::dataset::Example;
use crate::experiment::store::{EvaluationRecord, ExperimentRun, RecordOutcome, RunStore};
use crate::experiment::task::{Evaluator, ExperimentTask};
use crate::rate_limiter::RateLimiter;
use crate::report::RunSummary;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

/// Records produced by one phase plus the per-item details of the executor run
#[derive(Debug, Clone)]
pub struct BatchOutcome<T> {
    pub records: Vec<T>,
    pub details: Vec<ExecutionDetail>,
}

impl<T> BatchOutcome<T> {
    fn from_run(run: RunResult<Option<T>>) -> Self {
        let (results, details) = run.into_parts();
        Self {
            records: results.into_iter().flatten().flatten().collect(),
            details,
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_details(&self.details)
    }
}

/// @ai:intent Everything an experiment produced
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub experiment_id: String,
    pub runs: Vec<ExperimentRun>,
    pub evaluations: Vec<EvaluationRecord>,
    pub run_summary: RunSummary,
    pub evaluation_summary: RunSummary,
}

/// Shared (example id, repetition) keys already persisted in this process
type RunCache = Arc<Mutex<HashSet<(String, u32)>>>;

/// @ai:intent Runs a task over every (example, repetition) pair and persists each run once
pub struct ExperimentRunner<S> {
    store: Arc<S>,
    experiment_id: String,
    repetitions: u32,
    executor_options: ExecutorOptions,
    rate_limiter: Option<RateLimiter>,
    stop_signal: StopSignal,
    cache: RunCache,
}

impl<S: RunStore + 'static> ExperimentRunner<S> {
    /// @ai:intent Create a runner with one repetition and default executor options
    /// @ai:effects pure
    pub fn new(store: S, experiment_id: impl Into<String>) -> Self {
        Self {
            store: Arc::new(store),
            experiment_id: experiment_id.into(),
            repetitions: 1,
            executor_options: ExecutorOptions::default(),
            rate_limiter: None,
            stop_signal: StopSignal::new(),
            cache: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
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

    pub fn store(&self) -> &S {
        &self.store
    }

    /// @ai:intent Run the task over all examples and repetitions
    /// @ai:pre repetitions >= 1
    /// @ai:post cached or already-recorded runs are absent from records
    /// @ai:effects network, state:write
    pub async fn run(&self, examples: &[Example], task: ExperimentTask) -> Result<BatchOutcome<ExperimentRun>> {
        if self.repetitions == 0 {
            return Err(Error::InvalidConfig("repetitions must be at least 1".to_string()));
        }

        let inputs: Vec<(Example, u32)> = examples
            .iter()
            .flat_map(|example| (1..=self.repetitions).map(move |rep| (example.clone(), rep)))
            .collect();

        tracing::info!(
            "Running experiment {} over {} examples x {} repetitions",
            self.experiment_id,
            examples.len(),
            self.repetitions
        );

        let context = TaskContext {
            store: self.store.clone(),
            experiment_id: self.experiment_id.clone(),
            cache: self.cache.clone(),
            task,
        };

        let generate = move |(example, repetition): (Example, u32)| {
            context.clone().run_task(example, repetition)
        };

        let run = match &self.rate_limiter {
            Some(limiter) => {
                let limiter = limiter.clone().with_stop_signal(self.stop_signal.clone());
                self.execute(limiter.wrap(generate), inputs).await?
            }
            None => self.execute(generate, inputs).await?,
        };

        let outcome = BatchOutcome::from_run(run);
        tracing::info!(
            "Experiment {}: {} runs recorded",
            self.experiment_id,
            outcome.records.len()
        );
        Ok(outcome)
    }

    async fn execute<I, O, F, Fut>(&self, generate: F, inputs: Vec<I>) -> Result<RunResult<O>>
    where
        I: Clone + Send + 'static,
        O: Clone + Send + Sync + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, ExecutorError>> + Send + 'static,
    {
        ConcurrentExecutor::new(generate, self.executor_options.clone())
            .with_stop_signal(self.stop_signal.clone())
            .run(inputs)
            .await
    }

    /// @ai:intent Evaluation runner sharing this runner's store, policy and stop signal
    /// @ai:effects pure
    pub fn evaluation_runner(&self) -> EvaluationRunner<S> {
        EvaluationRunner {
            store: self.store.clone(),
            executor_options: self.executor_options.clone(),
            rate_limiter: self.rate_limiter.clone(),
            stop_signal: self.stop_signal.clone(),
        }
    }

    /// @ai:intent Run the task, then every evaluator on every recorded run
    /// @ai:effects network, state:write
    pub async fn run_experiment(
        &self,
        examples: &[Example],
        task: ExperimentTask,
        evaluators: &[Arc<dyn Evaluator>],
    ) -> Result<ExperimentReport> {
        let runs = self.run(examples, task).await?;
        let evaluations = self
            .evaluation_runner()
            .run(&runs.records, examples, evaluators)
            .await?;

        Ok(ExperimentReport {
            experiment_id: self.experiment_id.clone(),
            run_summary: runs.summary(),
            evaluation_summary: evaluations.summary(),
            runs: runs.records,
            evaluations: evaluations.records,
        })
    }
}

struct TaskContext<S> {
    store: Arc<S>,
    experiment_id: String,
    cache: RunCache,
    task: ExperimentTask,
}

impl<S> Clone for TaskContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            experiment_id: self.experiment_id.clone(),
            cache: self.cache.clone(),
            task: self.task.clone(),
        }
    }
}

impl<S: RunStore> TaskContext<S> {
    /// @ai:intent Run and persist one repetition unless it was already recorded
    /// @ai:post Ok(None) for cache hits and runs the store already has
    /// @ai:effects network, state:write
    async fn run_task(
        self,
        example: Example,
        repetition: u32,
    ) -> std::result::Result<Option<ExperimentRun>, ExecutorError> {
        let key = (example.id.clone(), repetition);
        if self.cache.lock().contains(&key) {
            tracing::debug!("Skipping {}#{}: already recorded", example.id, repetition);
            return Ok(None);
        }

        let span = tracing::info_span!(
            "experiment_task",
            example_id = %example.id,
            repetition
        );

        let start_time = Utc::now();
        let outcome = self.task.call(example.clone()).instrument(span.clone()).await;
        let end_time = Utc::now();

        let (output, error) = match outcome {
            Ok(output) => (Some(output), None),
            Err(e) => {
                span.in_scope(|| tracing::warn!("Task failed on {}: {:#}", example.id, e));
                (None, Some(format!("{:#}", e)))
            }
        };

        let run = ExperimentRun {
            id: format!("{}:{}:{}", self.experiment_id, example.id, repetition),
            experiment_id: self.experiment_id.clone(),
            dataset_example_id: example.id.clone(),
            repetition_number: repetition,
            start_time,
            end_time,
            output,
            error,
        };

        let outcome = self.store.record_run(&run).await?;
        self.cache.lock().insert(key);

        match outcome {
            RecordOutcome::Recorded => Ok(Some(run)),
            RecordOutcome::AlreadyRecorded => {
                tracing::debug!("Run {} was already recorded", run.id);
                Ok(None)
            }
        }
    }
}

/// @ai:intent Runs every evaluator over every run and persists the verdicts
pub struct EvaluationRunner<S> {
    store: Arc<S>,
    executor_options: ExecutorOptions,
    rate_limiter: Option<RateLimiter>,
    stop_signal: StopSignal,
}

type EvaluationInput = (ExperimentRun, Example, Arc<dyn Evaluator>);

impl<S: RunStore + 'static> EvaluationRunner<S> {
    /// @ai:intent Create a standalone evaluation runner
    /// @ai:effects pure
    pub fn new(store: Arc<S>, executor_options: ExecutorOptions) -> Self {
        Self {
            store,
            executor_options,
            rate_limiter: None,
            stop_signal: StopSignal::new(),
        }
    }

    /// @ai:intent Evaluate each (run, evaluator) pair
    /// @ai:post persistence failures never fail an item
    /// @ai:effects network
    pub async fn run(
        &self,
        runs: &[ExperimentRun],
        examples: &[Example],
        evaluators: &[Arc<dyn Evaluator>],
    ) -> Result<BatchOutcome<EvaluationRecord>> {
        let by_id: HashMap<&str, &Example> = examples.iter().map(|e| (e.id.as_str(), e)).collect();

        let mut inputs: Vec<EvaluationInput> = Vec::new();
        for run in runs {
            let Some(example) = by_id.get(run.dataset_example_id.as_str()) else {
                tracing::warn!("Run {} references unknown example {}", run.id, run.dataset_example_id);
                continue;
            };
            for evaluator in evaluators {
                inputs.push((run.clone(), (*example).clone(), evaluator.clone()));
            }
        }

        tracing::info!("Running {} evaluations", inputs.len());

        let store = self.store.clone();
        let generate = move |(run, example, evaluator): EvaluationInput| {
            evaluate_one(store.clone(), run, example, evaluator)
        };

        let options = self.executor_options.clone();
        let run = match &self.rate_limiter {
            Some(limiter) => {
                let limiter = limiter.clone().with_stop_signal(self.stop_signal.clone());
                ConcurrentExecutor::new(limiter.wrap(generate), options)
                    .with_stop_signal(self.stop_signal.clone())
                    .run(inputs)
                    .await?
            }
            None => {
                ConcurrentExecutor::new(generate, options)
                    .with_stop_signal(self.stop_signal.clone())
                    .run(inputs)
                    .await?
            }
        };

        Ok(BatchOutcome::from_run(run))
    }
}

/// @ai:intent Run one evaluator and persist its verdict; store errors are only logged
/// @ai:effects network
async fn evaluate_one<S: RunStore>(
    store: Arc<S>,
    run: ExperimentRun,
    example: Example,
    evaluator: Arc<dyn Evaluator>,
) -> std::result::Result<Option<EvaluationRecord>, ExecutorError> {
    let span = tracing::info_span!(
        "evaluation",
        evaluator = evaluator.name(),
        run_id = %run.id
    );

    let start_time = Utc::now();
    let outcome = evaluator.evaluate(&run, &example).instrument(span.clone()).await;
    let end_time = Utc::now();

    let mut record = EvaluationRecord {
        experiment_run_id: run.id.clone(),
        name: evaluator.name().to_string(),
        label: None,
        score: None,
        explanation: None,
        error: None,
        start_time,
        end_time,
    };

    match outcome {
        Ok(result) => {
            record.label = result.label;
            record.score = result.score;
            record.explanation = result.explanation;
        }
        Err(e) => {
            span.in_scope(|| tracing::warn!("Evaluator {} failed: {:#}", record.name, e));
            record.error = Some(format!("{:#}", e));
        }
    }

    if let Err(e) = store.record_evaluation(&record).await {
        span.in_scope(|| tracing::warn!("Failed to persist evaluation {}: {}", record.name, e));
    }

    Ok(Some(record))
}
