//! @ai:module:intent User task and evaluator callables with uniform signatures
//! @ai:module:layer domain
//! @ai:module:public_api ExperimentTask, Evaluator, EvaluationResult, FnEvaluator, ExactMatch
//! @ai:module:stateless true

use crate::experiment::dataset::Example;
use crate::experiment::store::ExperimentRun;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

pub type TaskFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// @ai:intent Task callable adapted to take a whole example
#[derive(Clone)]
pub struct ExperimentTask {
    inner: Arc<dyn Fn(Example) -> TaskFuture + Send + Sync>,
}

impl ExperimentTask {
    /// @ai:intent Adapt a callable that takes the whole example
    /// @ai:effects pure
    pub fn from_example<F, Fut>(f: F) -> Self
    where
        F: Fn(Example) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |example| f(example).boxed()),
        }
    }

    /// @ai:intent Adapt a callable that only needs the example input
    /// @ai:effects pure
    pub fn from_input<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::from_example(move |example: Example| f(example.input))
    }

    pub fn call(&self, example: Example) -> TaskFuture {
        (self.inner)(example)
    }
}

/// @ai:intent Verdict produced by an evaluator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationResult {
    pub score: Option<f64>,
    pub label: Option<String>,
    pub explanation: Option<String>,
}

/// @ai:intent Scores one experiment run against its example
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    /// @ai:intent Evaluate a run; errors are recorded on the evaluation, not retried
    fn evaluate<'a>(
        &'a self,
        run: &'a ExperimentRun,
        example: &'a Example,
    ) -> BoxFuture<'a, anyhow::Result<EvaluationResult>>;
}

type EvaluateFn = dyn Fn(&ExperimentRun, &Example) -> anyhow::Result<EvaluationResult> + Send + Sync;

/// @ai:intent Evaluator built from a synchronous closure
pub struct FnEvaluator {
    name: String,
    f: Box<EvaluateFn>,
}

impl FnEvaluator {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ExperimentRun, &Example) -> anyhow::Result<EvaluationResult> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

impl Evaluator for FnEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate<'a>(
        &'a self,
        run: &'a ExperimentRun,
        example: &'a Example,
    ) -> BoxFuture<'a, anyhow::Result<EvaluationResult>> {
        let result = (self.f)(run, example);
        async move { result }.boxed()
    }
}

/// @ai:intent Scores 1.0 when the run output equals the example's expected value
pub struct ExactMatch;

impl Evaluator for ExactMatch {
    fn name(&self) -> &str {
        "exact_match"
    }

    fn evaluate<'a>(
        &'a self,
        run: &'a ExperimentRun,
        example: &'a Example,
    ) -> BoxFuture<'a, anyhow::Result<EvaluationResult>> {
        async move {
            let output = run
                .output
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("run has no output"))?;
            let matched = *output == example.expected;

            Ok(EvaluationResult {
                score: Some(if matched { 1.0 } else { 0.0 }),
                label: Some(if matched { "match" } else { "mismatch" }.to_string()),
                explanation: None,
            })
        }
        .boxed()
    }
}
