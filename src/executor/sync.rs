//! @ai:module:intent Sequential executor for blocking generation functions
//! @ai:module:layer application
//! @ai:module:public_api SyncExecutor
//! @ai:module:stateless true

use crate::error::Result;
use crate::executor::attempt::{finalize_unstarted, panic_error, ItemRun, Step};
use crate::executor::error::ExecutorError;
use crate::executor::options::ExecutorOptions;
use crate::executor::progress::{ProgressFn, ProgressTracker};
use crate::executor::signal::StopSignal;
use crate::executor::status::{ExecutionDetail, ExecutionStatus, RunResult, WorkItem};
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;

/// @ai:intent Runs a generation function over inputs one at a time, in submission order
///            Side effects of different items never interleave
pub struct SyncExecutor<I, O, F> {
    generation_fn: F,
    options: ExecutorOptions,
    fallback_return_value: Option<O>,
    stop_signal: StopSignal,
    progress: Option<ProgressFn>,
    _input: PhantomData<fn(I)>,
}

impl<I, O, F> SyncExecutor<I, O, F>
where
    I: Clone,
    O: Clone,
    F: Fn(I) -> std::result::Result<O, ExecutorError>,
{
    /// @ai:intent Create a sync executor; concurrency and timeout are ignored
    /// @ai:effects pure
    pub fn new(generation_fn: F, options: ExecutorOptions) -> Self {
        Self {
            generation_fn,
            options,
            fallback_return_value: None,
            stop_signal: StopSignal::new(),
            progress: None,
            _input: PhantomData,
        }
    }

    /// @ai:intent Value placed in the result slot of items that do not complete
    /// @ai:effects pure
    pub fn with_fallback(mut self, value: O) -> Self {
        self.fallback_return_value = Some(value);
        self
    }

    /// @ai:intent Share an externally controlled stop signal
    /// @ai:effects pure
    pub fn with_stop_signal(mut self, signal: StopSignal) -> Self {
        self.stop_signal = signal;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// @ai:intent Execute every input sequentially
    /// @ai:post result lengths equal inputs.len(), even after an abort
    /// @ai:effects io (whatever generation_fn does)
    pub fn run(&self, inputs: Vec<I>) -> Result<RunResult<O>> {
        self.options.validate()?;

        let total = inputs.len();
        let mut results: Vec<Option<O>> = vec![self.fallback_return_value.clone(); total];
        let mut details: Vec<ExecutionDetail> = vec![ExecutionDetail::pending(); total];

        if total == 0 {
            return Ok(RunResult::empty());
        }

        let tracker = ProgressTracker::new(self.progress.clone(), total);

        for item in WorkItem::enumerate(inputs) {
            if self.stop_signal.is_stopped() {
                break;
            }

            let index = item.index;
            let Some((result, detail)) = self.run_item(item) else {
                break;
            };
            let failed = detail.status == ExecutionStatus::Failed;

            tracker.item_finished(index, detail.status);
            results[index] = result;
            details[index] = detail;

            if failed && self.options.exit_on_error {
                tracing::warn!("Item {} failed; exit_on_error is set, stopping batch", index);
                self.stop_signal.stop();
            }
        }

        finalize_unstarted(&mut details);
        Ok(RunResult::from_slots(results, details))
    }

    /// @ai:intent Drive one item through its attempt loop; panics count as failed attempts
    /// @ai:post None when the batch stopped before the first attempt
    /// @ai:effects io
    fn run_item(&self, item: WorkItem<I>) -> Option<(Option<O>, ExecutionDetail)> {
        let mut run = ItemRun::new(item.index, self.options.max_attempts());

        loop {
            if self.stop_signal.is_stopped() {
                if run.status() == ExecutionStatus::Pending {
                    return None;
                }
                let result = run.abort(&self.fallback_return_value);
                return Some((result, run.into_detail()));
            }

            run.begin_attempt();
            let input = item.input.clone();
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| (self.generation_fn)(input)))
                .unwrap_or_else(|payload| Err(panic_error(payload)));

            match run.finish_attempt(outcome, &self.fallback_return_value) {
                Step::Retry => continue,
                Step::Done(result) => return Some((result, run.into_detail())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[test]
    fn test_empty_input_does_not_call_generation_fn() {
        let calls = RefCell::new(0);
        let executor = SyncExecutor::new(
            |_: i32| {
                *calls.borrow_mut() += 1;
                Ok::<i32, ExecutorError>(1)
            },
            ExecutorOptions::default(),
        );

        let run = executor.run(Vec::<i32>::new()).unwrap();
        assert!(run.results.is_empty());
        assert!(run.details.is_empty());
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn test_results_follow_input_order() {
        let executor = SyncExecutor::new(|x: i32| Ok(x * 10), ExecutorOptions::default());

        let run = executor.run(vec![1, 2, 3]).unwrap();
        assert_eq!(run.results, vec![Some(10), Some(20), Some(30)]);
        assert!(run
            .statuses()
            .iter()
            .all(|s| *s == ExecutionStatus::Completed));
    }

    #[test]
    fn test_retry_budget_is_max_retries_plus_one() {
        let calls = RefCell::new(0);
        let executor = SyncExecutor::new(
            |_: &str| {
                *calls.borrow_mut() += 1;
                Err::<String, _>(ExecutorError::failed("transient"))
            },
            ExecutorOptions::default().with_max_retries(3),
        );

        let run = executor.run(vec!["row"]).unwrap();
        assert_eq!(*calls.borrow(), 4);
        assert_eq!(run.details[0].status, ExecutionStatus::Failed);
        assert_eq!(run.details[0].exceptions.len(), 4);
        assert_eq!(run.results[0], None);
    }

    #[test]
    fn test_missing_input_is_not_retried() {
        let calls = RefCell::new(0);
        let executor = SyncExecutor::new(
            |_: i32| {
                *calls.borrow_mut() += 1;
                Err::<i32, _>(ExecutorError::missing_input("template field 'text' absent"))
            },
            ExecutorOptions::default().with_max_retries(4),
        )
        .with_fallback(-1);

        let run = executor.run(vec![0]).unwrap();
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(run.details[0].status, ExecutionStatus::MissingInput);
        assert_eq!(run.details[0].exceptions.len(), 1);
        assert_eq!(run.results[0], Some(-1));
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let attempts = RefCell::new(HashMap::new());
        let executor = SyncExecutor::new(
            |x: i32| {
                let mut attempts = attempts.borrow_mut();
                let n = attempts.entry(x).or_insert(0);
                *n += 1;
                if *n < 3 {
                    Err(ExecutorError::failed(format!("attempt {}", n)))
                } else {
                    Ok(x)
                }
            },
            ExecutorOptions::default().with_max_retries(5),
        );

        let run = executor.run(vec![42]).unwrap();
        assert_eq!(run.results[0], Some(42));
        assert_eq!(run.details[0].status, ExecutionStatus::Completed);
        assert_eq!(
            run.details[0].exceptions,
            vec!["attempt 1".to_string(), "attempt 2".to_string()]
        );
    }

    #[test]
    fn test_exit_on_error_marks_remaining_items_did_not_run() {
        let log = RefCell::new(Vec::new());
        let executor = SyncExecutor::new(
            |row: usize| {
                log.borrow_mut().push(row);
                if row == 3 {
                    Err(ExecutorError::failed("row 3 has no input"))
                } else {
                    Ok(format!("label-{}", row))
                }
            },
            ExecutorOptions::default()
                .with_max_retries(1)
                .with_exit_on_error(true),
        );

        let run = executor.run(vec![1, 2, 3, 4]).unwrap();

        assert_eq!(
            run.statuses(),
            vec![
                ExecutionStatus::Completed,
                ExecutionStatus::Completed,
                ExecutionStatus::Failed,
                ExecutionStatus::DidNotRun,
            ]
        );
        assert_eq!(*log.borrow(), vec![1, 2, 3, 3]);
        assert_eq!(run.len(), 4);
        assert!(run.details[3].exceptions.is_empty());
        assert_eq!(run.details[3].execution_seconds, 0.0);
        assert_eq!(run.results[3], None);
    }

    #[test]
    fn test_failures_do_not_stop_batch_without_exit_on_error() {
        let executor = SyncExecutor::new(
            |x: i32| {
                if x % 2 == 0 {
                    Err(ExecutorError::failed("even"))
                } else {
                    Ok(x)
                }
            },
            ExecutorOptions::default(),
        )
        .with_fallback(0);

        let run = executor.run(vec![1, 2, 3, 4]).unwrap();
        assert_eq!(run.results, vec![Some(1), Some(0), Some(3), Some(0)]);
    }

    #[test]
    fn test_preset_stop_signal_runs_nothing() {
        let signal = StopSignal::new();
        signal.stop();
        let executor = SyncExecutor::new(|x: i32| Ok(x), ExecutorOptions::default())
            .with_stop_signal(signal);

        let run = executor.run(vec![1, 2]).unwrap();
        assert_eq!(
            run.statuses(),
            vec![ExecutionStatus::DidNotRun, ExecutionStatus::DidNotRun]
        );
    }

    #[test]
    fn test_panicking_row_fails_and_batch_continues() {
        let calls = RefCell::new(0);
        let executor = SyncExecutor::new(
            |x: i32| {
                *calls.borrow_mut() += 1;
                if x == 1 {
                    panic!("row {} is malformed", x);
                }
                Ok(x + 100)
            },
            ExecutorOptions::default().with_max_retries(1),
        );

        let run = executor.run(vec![0, 1, 2]).unwrap();

        assert_eq!(
            run.statuses(),
            vec![
                ExecutionStatus::Completed,
                ExecutionStatus::Failed,
                ExecutionStatus::Completed,
            ]
        );
        assert_eq!(*calls.borrow(), 4);
        assert_eq!(
            run.details[1].exceptions,
            vec![
                "generation function panicked: row 1 is malformed".to_string(),
                "generation function panicked: row 1 is malformed".to_string(),
            ]
        );
        assert_eq!(run.results, vec![Some(100), None, Some(102)]);
    }

    #[test]
    fn test_stop_before_first_attempt_leaves_item_unstarted() {
        let signal = StopSignal::new();
        let executor = SyncExecutor::new(|x: i32| Ok(x), ExecutorOptions::default())
            .with_stop_signal(signal.clone());
        signal.stop();

        assert!(executor.run_item(WorkItem { index: 0, input: 3 }).is_none());
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let executor = SyncExecutor::new(
            |x: i32| Ok(x),
            ExecutorOptions::default().with_concurrency(0),
        );
        assert!(executor.run(vec![1]).is_err());
    }
}
