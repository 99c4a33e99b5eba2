//! @ai:module:intent Per-item attempt state machine shared by both executors
//! @ai:module:layer domain
//! @ai:module:public_api ItemRun, Step
//! @ai:module:stateless false

use crate::executor::error::ExecutorError;
use crate::executor::status::{ExecutionDetail, ExecutionStatus};
use std::any::Any;
use std::time::Instant;

/// @ai:intent What the executor loop does after an attempt finishes
#[derive(Debug)]
pub(crate) enum Step<O> {
    /// Attempts remain; invoke again
    Retry,
    /// Terminal state reached; value for the result slot
    Done(Option<O>),
}

/// @ai:intent Tracks one item's attempts, exceptions and elapsed time
/// @ai:invariant attempt <= max_attempts
pub(crate) struct ItemRun {
    index: usize,
    max_attempts: u32,
    attempt: u32,
    detail: ExecutionDetail,
    attempt_started: Option<Instant>,
}

impl ItemRun {
    /// @ai:intent Start tracking an item in PENDING state
    /// @ai:pre max_attempts >= 1
    /// @ai:effects pure
    pub(crate) fn new(index: usize, max_attempts: u32) -> Self {
        Self {
            index,
            max_attempts: max_attempts.max(1),
            attempt: 0,
            detail: ExecutionDetail::pending(),
            attempt_started: None,
        }
    }

    pub(crate) fn status(&self) -> ExecutionStatus {
        self.detail.status
    }

    /// @ai:intent Transition to RUNNING and start the attempt clock
    /// @ai:pre status is PENDING or RUNNING with attempts remaining
    /// @ai:effects time
    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.detail.status = ExecutionStatus::Running;
        self.attempt_started = Some(Instant::now());
        self.attempt
    }

    fn stop_clock(&mut self) {
        if let Some(started) = self.attempt_started.take() {
            self.detail.execution_seconds += started.elapsed().as_secs_f64();
        }
    }

    /// @ai:intent Apply an attempt outcome and decide whether to retry
    /// @ai:post MISSING_INPUT never consumes further attempts
    /// @ai:effects state:write, io
    pub(crate) fn finish_attempt<O: Clone>(
        &mut self,
        outcome: Result<O, ExecutorError>,
        fallback: &Option<O>,
    ) -> Step<O> {
        self.stop_clock();

        match outcome {
            Ok(value) => {
                self.detail.status = ExecutionStatus::Completed;
                Step::Done(Some(value))
            }
            Err(err) if err.is_missing_input() => {
                tracing::warn!("Missing input for item {}: {}", self.index, err);
                self.detail.exceptions.push(err.to_string());
                self.detail.status = ExecutionStatus::MissingInput;
                Step::Done(fallback.clone())
            }
            Err(err) => {
                tracing::warn!(
                    "Exception in worker on attempt {}: {} (item {})",
                    self.attempt,
                    err,
                    self.index
                );
                self.detail.exceptions.push(err.to_string());

                if self.attempt < self.max_attempts {
                    return Step::Retry;
                }

                tracing::warn!("Retries exhausted after {} attempts", self.max_attempts);
                self.detail.status = ExecutionStatus::Failed;
                Step::Done(fallback.clone())
            }
        }
    }

    /// @ai:intent End a started item early because the batch is stopping
    /// @ai:pre at least one attempt has failed and attempts remain
    /// @ai:effects state:write, io
    pub(crate) fn abort<O: Clone>(&mut self, fallback: &Option<O>) -> Option<O> {
        tracing::info!(
            "Item {} stopped after {} of {} attempts: batch is stopping",
            self.index,
            self.attempt,
            self.max_attempts
        );
        self.detail.status = ExecutionStatus::Failed;
        fallback.clone()
    }

    pub(crate) fn into_detail(self) -> ExecutionDetail {
        self.detail
    }
}

/// @ai:intent Convert a caught panic payload into a failed-attempt error
/// @ai:effects pure
pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> ExecutorError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    ExecutorError::failed(format!("generation function panicked: {}", message))
}

/// @ai:intent Turn every never-started slot into DID_NOT_RUN
/// @ai:effects pure
pub(crate) fn finalize_unstarted(details: &mut [ExecutionDetail]) {
    for detail in details.iter_mut() {
        if !detail.status.is_terminal() {
            *detail = ExecutionDetail {
                status: ExecutionStatus::DidNotRun,
                exceptions: Vec::new(),
                execution_seconds: 0.0,
            };
        }
    }
}
