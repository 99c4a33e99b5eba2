//! @ai:module:intent Persistence of experiment runs and evaluations
//! @ai:module:layer infrastructure
//! @ai:module:public_api RunStore, HttpRunStore, InMemoryRunStore, ExperimentRun, EvaluationRecord, RecordOutcome, StoreError
//! @ai:module:stateless false

use crate::config::StoreConfig;
use crate::executor::ExecutorError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// @ai:intent Failure persisting a record
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to send request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Store rejected record ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<StoreError> for ExecutorError {
    fn from(err: StoreError) -> Self {
        ExecutorError::failed(err.to_string())
    }
}

/// @ai:intent Result of a persist call; a duplicate is not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    AlreadyRecorded,
}

/// @ai:intent One task invocation for one example repetition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRun {
    pub id: String,
    pub experiment_id: String,
    pub dataset_example_id: String,
    pub repetition_number: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub output: Option<Value>,
    /// Task error text; the run is still recorded
    pub error: Option<String>,
}

impl ExperimentRun {
    pub fn key(&self) -> (String, u32) {
        (self.dataset_example_id.clone(), self.repetition_number)
    }
}

/// @ai:intent One evaluator verdict on one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub experiment_run_id: String,
    pub name: String,
    pub label: Option<String>,
    pub score: Option<f64>,
    pub explanation: Option<String>,
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// @ai:intent Remote or local sink for runs and evaluations
pub trait RunStore: Send + Sync {
    /// @ai:intent Persist a run; AlreadyRecorded when the store has it
    fn record_run(
        &self,
        run: &ExperimentRun,
    ) -> impl Future<Output = Result<RecordOutcome, StoreError>> + Send;

    /// @ai:intent Persist an evaluation
    fn record_evaluation(
        &self,
        evaluation: &EvaluationRecord,
    ) -> impl Future<Output = Result<RecordOutcome, StoreError>> + Send;
}

/// @ai:intent REST client for the experiment store
pub struct HttpRunStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRunStore {
    /// @ai:intent Create a store client from configuration
    /// @ai:effects pure
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// @ai:intent POST a JSON body; 409 means the record already exists
    /// @ai:effects network
    async fn post<T: Serialize + Sync>(&self, url: String, body: &T) -> Result<RecordOutcome, StoreError> {
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::CONFLICT {
            tracing::debug!("Record already present at {}", url);
            return Ok(RecordOutcome::AlreadyRecorded);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(RecordOutcome::Recorded)
    }
}

impl RunStore for HttpRunStore {
    async fn record_run(&self, run: &ExperimentRun) -> Result<RecordOutcome, StoreError> {
        let url = format!("{}/v1/experiments/{}/runs", self.base_url, run.experiment_id);
        self.post(url, run).await
    }

    async fn record_evaluation(
        &self,
        evaluation: &EvaluationRecord,
    ) -> Result<RecordOutcome, StoreError> {
        let url = format!("{}/v1/experiment_evaluations", self.base_url);
        self.post(url, evaluation).await
    }
}

/// @ai:intent Store kept in memory for dry runs and tests
///            Runs are unique per (example, repetition), evaluations per (run, name)
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: Mutex<Vec<ExperimentRun>>,
    evaluations: Mutex<Vec<EvaluationRecord>>,
    keys: Mutex<HashSet<String>>,
    pending_failures: Mutex<u32>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// @ai:intent Make the next `count` record calls fail with a 503
    /// @ai:effects state:write
    pub fn fail_next(self, count: u32) -> Self {
        *self.pending_failures.lock() = count;
        self
    }

    pub fn runs(&self) -> Vec<ExperimentRun> {
        self.runs.lock().clone()
    }

    pub fn evaluations(&self) -> Vec<EvaluationRecord> {
        self.evaluations.lock().clone()
    }

    fn take_failure(&self) -> Result<(), StoreError> {
        let mut pending = self.pending_failures.lock();
        if *pending > 0 {
            *pending -= 1;
            return Err(StoreError::Rejected {
                status: 503,
                body: "store unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn claim(&self, key: String) -> bool {
        self.keys.lock().insert(key)
    }
}

impl RunStore for InMemoryRunStore {
    async fn record_run(&self, run: &ExperimentRun) -> Result<RecordOutcome, StoreError> {
        self.take_failure()?;

        let key = format!("run:{}:{}", run.dataset_example_id, run.repetition_number);
        if !self.claim(key) {
            return Ok(RecordOutcome::AlreadyRecorded);
        }

        self.runs.lock().push(run.clone());
        Ok(RecordOutcome::Recorded)
    }

    async fn record_evaluation(
        &self,
        evaluation: &EvaluationRecord,
    ) -> Result<RecordOutcome, StoreError> {
        self.take_failure()?;

        let key = format!("eval:{}:{}", evaluation.experiment_run_id, evaluation.name);
        if !self.claim(key) {
            return Ok(RecordOutcome::AlreadyRecorded);
        }

        self.evaluations.lock().push(evaluation.clone());
        Ok(RecordOutcome::Recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(example_id: &str, repetition: u32) -> ExperimentRun {
        let now = Utc::now();
        ExperimentRun {
            id: format!("exp:{example_id}:{repetition}"),
            experiment_id: "exp".to_string(),
            dataset_example_id: example_id.to_string(),
            repetition_number: repetition,
            start_time: now,
            end_time: now,
            output: Some(json!("ok")),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_in_memory_store_detects_duplicates() {
        let store = InMemoryRunStore::new();

        assert_eq!(store.record_run(&run("a", 1)).await.unwrap(), RecordOutcome::Recorded);
        assert_eq!(store.record_run(&run("a", 2)).await.unwrap(), RecordOutcome::Recorded);
        assert_eq!(
            store.record_run(&run("a", 1)).await.unwrap(),
            RecordOutcome::AlreadyRecorded
        );
        assert_eq!(store.runs().len(), 2);
    }

    #[tokio::test]
    async fn test_in_memory_store_scripted_failures() {
        let store = InMemoryRunStore::new().fail_next(1);

        let err = store.record_run(&run("a", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 503, .. }));
        assert_eq!(store.record_run(&run("a", 1)).await.unwrap(), RecordOutcome::Recorded);
    }

    #[test]
    fn test_store_error_is_transient_for_executor() {
        let err: ExecutorError = StoreError::Rejected {
            status: 500,
            body: "boom".to_string(),
        }
        .into();
        assert!(!err.is_missing_input());
        assert!(err.rate_limit_kind().is_none());
    }

    #[test]
    fn test_http_store_trims_base_url() {
        let store = HttpRunStore::new(&StoreConfig {
            base_url: "http://localhost:6006/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(store.base_url, "http://localhost:6006");
    }
}
