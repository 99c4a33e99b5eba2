//! @ai:module:intent Bounded worker-pool executor for async generation functions
//! @ai:module:layer application
//! @ai:module:public_api ConcurrentExecutor
//! @ai:module:stateless true

use crate::error::Result;
use crate::executor::attempt::{finalize_unstarted, panic_error, ItemRun, Step};
use crate::executor::error::ExecutorError;
use crate::executor::options::ExecutorOptions;
use crate::executor::progress::{ProgressFn, ProgressTracker};
use crate::executor::signal::StopSignal;
use crate::executor::status::{ExecutionDetail, ExecutionStatus, RunResult, WorkItem};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

type Finished<O> = (usize, Option<O>, ExecutionDetail);

/// @ai:intent Runs up to `concurrency` items at once from a shared FIFO queue
///            Output slots are indexed by submission position, not completion order
pub struct ConcurrentExecutor<I, O, F> {
    generation_fn: Arc<F>,
    options: ExecutorOptions,
    fallback_return_value: Option<O>,
    stop_signal: StopSignal,
    progress: Option<ProgressFn>,
    _input: PhantomData<fn(I)>,
}

impl<I, O, F, Fut> ConcurrentExecutor<I, O, F>
where
    I: Clone + Send + 'static,
    O: Clone + Send + Sync + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<O, ExecutorError>> + Send + 'static,
{
    /// @ai:intent Create a concurrent executor
    /// @ai:effects pure
    pub fn new(generation_fn: F, options: ExecutorOptions) -> Self {
        Self {
            generation_fn: Arc::new(generation_fn),
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

    /// @ai:intent Share an externally controlled stop signal (e.g. Ctrl-C)
    /// @ai:effects pure
    pub fn with_stop_signal(mut self, signal: StopSignal) -> Self {
        self.stop_signal = signal;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// @ai:intent Execute every input on a fixed pool of workers
    /// @ai:post result lengths equal inputs.len(); results[i] belongs to inputs[i]
    /// @ai:effects io (whatever generation_fn does), spawns tokio tasks
    pub async fn run(&self, inputs: Vec<I>) -> Result<RunResult<O>> {
        self.options.validate()?;

        let total = inputs.len();
        if total == 0 {
            return Ok(RunResult::empty());
        }

        let mut results: Vec<Option<O>> = vec![self.fallback_return_value.clone(); total];
        let mut details: Vec<ExecutionDetail> = vec![ExecutionDetail::pending(); total];

        let queue = Arc::new(Mutex::new(VecDeque::from(WorkItem::enumerate(inputs))));
        let tracker = Arc::new(ProgressTracker::new(self.progress.clone(), total));
        let (sender, mut receiver) = mpsc::unbounded_channel::<Finished<O>>();

        let worker_count = self.options.concurrency.min(total);
        tracing::debug!("Starting {} workers for {} items", worker_count, total);

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let worker = Worker {
                id: worker_id,
                generation_fn: self.generation_fn.clone(),
                queue: queue.clone(),
                stop_signal: self.stop_signal.clone(),
                fallback_return_value: self.fallback_return_value.clone(),
                max_attempts: self.options.max_attempts(),
                timeout: self.options.timeout(),
                exit_on_error: self.options.exit_on_error,
                tracker: tracker.clone(),
                sender: sender.clone(),
            };
            workers.spawn(worker.run());
        }
        drop(sender);

        while let Some((index, result, detail)) = receiver.recv().await {
            results[index] = result;
            details[index] = detail;
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Executor worker ended abnormally: {}", e);
            }
        }

        finalize_unstarted(&mut details);
        Ok(RunResult::from_slots(results, details))
    }
}

/// @ai:intent One pool member; pulls items until the queue drains or the batch stops
struct Worker<I, O, F> {
    id: usize,
    generation_fn: Arc<F>,
    queue: Arc<Mutex<VecDeque<WorkItem<I>>>>,
    stop_signal: StopSignal,
    fallback_return_value: Option<O>,
    max_attempts: u32,
    timeout: Option<Duration>,
    exit_on_error: bool,
    tracker: Arc<ProgressTracker>,
    sender: mpsc::UnboundedSender<Finished<O>>,
}

impl<I, O, F, Fut> Worker<I, O, F>
where
    I: Clone + Send + 'static,
    O: Clone + Send + Sync + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<O, ExecutorError>> + Send + 'static,
{
    /// @ai:intent Process items until none remain or the stop signal is set
    /// @ai:effects io, state:write
    async fn run(self) {
        loop {
            if self.stop_signal.is_stopped() {
                tracing::debug!("Worker {} observed stop signal", self.id);
                break;
            }

            let next = self.queue.lock().pop_front();
            let Some(item) = next else {
                break;
            };

            let index = item.index;
            let Some((result, detail)) = self.run_item(item).await else {
                tracing::debug!("Worker {} stopped before item {} started", self.id, index);
                break;
            };
            let failed = detail.status == ExecutionStatus::Failed;
            self.tracker.item_finished(index, detail.status);

            if failed && self.exit_on_error {
                tracing::warn!("Item {} failed; exit_on_error is set, stopping batch", index);
                self.stop_signal.stop();
            }

            if self.sender.send((index, result, detail)).is_err() {
                break;
            }
        }
    }

    /// @ai:intent Drive one item through its attempt loop
    /// @ai:post None when the batch stopped before the first attempt; the slot stays unstarted
    /// @ai:effects io
    async fn run_item(&self, item: WorkItem<I>) -> Option<(Option<O>, ExecutionDetail)> {
        let mut run = ItemRun::new(item.index, self.max_attempts);

        loop {
            if self.stop_signal.is_stopped() {
                if run.status() == ExecutionStatus::Pending {
                    return None;
                }
                let result = run.abort(&self.fallback_return_value);
                return Some((result, run.into_detail()));
            }

            run.begin_attempt();
            let outcome = self.attempt(item.input.clone()).await;

            match run.finish_attempt(outcome, &self.fallback_return_value) {
                Step::Retry => continue,
                Step::Done(result) => return Some((result, run.into_detail())),
            }
        }
    }

    /// @ai:intent Invoke the generation function once, bounded by the timeout
    ///            Panics become failed attempts instead of killing the worker
    /// @ai:effects io, time
    async fn attempt(&self, input: I) -> std::result::Result<O, ExecutorError> {
        // The closure itself may panic before handing back a future
        let future = std::panic::catch_unwind(AssertUnwindSafe(|| (self.generation_fn)(input)))
            .map_err(panic_error)?;
        let call = AssertUnwindSafe(future).catch_unwind();

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(ExecutorError::Timeout(limit)),
            },
            None => call.await,
        };

        outcome.unwrap_or_else(|payload| Err(panic_error(payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_empty_input_does_not_call_generation_fn() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let executor = ConcurrentExecutor::new(
            move |x: i32| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(x) }
            },
            ExecutorOptions::default(),
        );

        let run = executor.run(Vec::new()).await.unwrap();
        assert!(run.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_results_align_with_inputs_despite_completion_order() {
        let completion_order = Arc::new(Mutex::new(Vec::new()));
        let order = completion_order.clone();
        let executor = ConcurrentExecutor::new(
            move |x: u64| {
                let order = order.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis((6 - x) * 15)).await;
                    order.lock().push(x);
                    Ok(x * 2)
                }
            },
            ExecutorOptions::default().with_concurrency(6),
        );

        let run = executor.run(vec![0, 1, 2, 3, 4, 5]).await.unwrap();

        assert_eq!(
            run.results,
            vec![Some(0), Some(2), Some(4), Some(6), Some(8), Some(10)]
        );
        assert_eq!(completion_order.lock().first(), Some(&5));
        assert_eq!(run.len(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_exceeds_concurrency_bound() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (current, max_seen) = (in_flight.clone(), peak.clone());

        let executor = ConcurrentExecutor::new(
            move |x: usize| {
                let current = current.clone();
                let max_seen = max_seen.clone();
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(x)
                }
            },
            ExecutorOptions::default().with_concurrency(3),
        );

        let run = executor.run((0..15).collect()).await.unwrap();

        assert_eq!(run.len(), 15);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_budget_is_max_retries_plus_one() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let executor = ConcurrentExecutor::new(
            move |_: i32| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(ExecutorError::failed("transient")) }
            },
            ExecutorOptions::default().with_max_retries(2),
        );

        let run = executor.run(vec![1]).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(run.details[0].status, ExecutionStatus::Failed);
        assert_eq!(run.details[0].exceptions.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_input_short_circuits() {
        let executor = ConcurrentExecutor::new(
            |_: i32| async { Err::<String, _>(ExecutorError::missing_input("no 'text' column")) },
            ExecutorOptions::default().with_max_retries(4),
        )
        .with_fallback("n/a".to_string());

        let run = executor.run(vec![1, 2]).await.unwrap();
        for detail in &run.details {
            assert_eq!(detail.status, ExecutionStatus::MissingInput);
            assert_eq!(detail.exceptions.len(), 1);
        }
        assert_eq!(run.results[1], Some("n/a".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let executor = ConcurrentExecutor::new(
            move |x: i32| {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                    Ok(x)
                }
            },
            ExecutorOptions::default()
                .with_max_retries(1)
                .with_timeout(Duration::from_millis(50)),
        );

        let run = executor.run(vec![9]).await.unwrap();
        assert_eq!(run.results[0], Some(9));
        assert_eq!(run.details[0].status, ExecutionStatus::Completed);
        assert_eq!(run.details[0].exceptions.len(), 1);
        assert!(run.details[0].exceptions[0].contains("timed out"));
    }

    #[tokio::test]
    async fn test_exit_on_error_with_single_worker() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let log = started.clone();
        let executor = ConcurrentExecutor::new(
            move |x: i32| {
                log.lock().push(x);
                async move {
                    if x == 1 {
                        Err(ExecutorError::failed("bad row"))
                    } else {
                        Ok(x)
                    }
                }
            },
            ExecutorOptions::default()
                .with_concurrency(1)
                .with_exit_on_error(true),
        );

        let run = executor.run(vec![0, 1, 2, 3]).await.unwrap();

        assert_eq!(
            run.statuses(),
            vec![
                ExecutionStatus::Completed,
                ExecutionStatus::Failed,
                ExecutionStatus::DidNotRun,
                ExecutionStatus::DidNotRun,
            ]
        );
        assert_eq!(*started.lock(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_exit_on_error_lets_in_flight_items_finish() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let log = started.clone();
        let executor = ConcurrentExecutor::new(
            move |x: i32| {
                log.lock().push(x);
                async move {
                    match x {
                        0 => {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Err(ExecutorError::failed("fails fast"))
                        }
                        1 => {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok(x)
                        }
                        _ => Ok(x),
                    }
                }
            },
            ExecutorOptions::default()
                .with_concurrency(2)
                .with_exit_on_error(true),
        );

        let run = executor.run(vec![0, 1, 2, 3, 4]).await.unwrap();

        assert_eq!(
            run.statuses(),
            vec![
                ExecutionStatus::Failed,
                ExecutionStatus::Completed,
                ExecutionStatus::DidNotRun,
                ExecutionStatus::DidNotRun,
                ExecutionStatus::DidNotRun,
            ]
        );
        let mut started = started.lock().clone();
        started.sort();
        assert_eq!(started, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_stop_signal_between_attempts_fails_item() {
        let signal = StopSignal::new();
        let trigger = signal.clone();
        let executor = ConcurrentExecutor::new(
            move |_: i32| {
                trigger.stop();
                async { Err::<i32, _>(ExecutorError::failed("flaky")) }
            },
            ExecutorOptions::default().with_max_retries(5),
        )
        .with_stop_signal(signal);

        let run = executor.run(vec![1]).await.unwrap();
        assert_eq!(run.details[0].status, ExecutionStatus::Failed);
        assert_eq!(run.details[0].exceptions.len(), 1);
    }

    #[tokio::test]
    async fn test_panic_is_recorded_as_failed_attempt() {
        let executor = ConcurrentExecutor::new(
            |x: i32| async move {
                if x == 0 {
                    panic!("kaboom");
                }
                Ok(x)
            },
            ExecutorOptions::default(),
        );

        let run = executor.run(vec![0, 1]).await.unwrap();
        assert_eq!(run.details[0].status, ExecutionStatus::Failed);
        assert!(run.details[0].exceptions[0].contains("kaboom"));
        assert_eq!(run.results[1], Some(1));
    }

    #[tokio::test]
    async fn test_panic_before_future_is_created_keeps_worker_alive() {
        let executor = ConcurrentExecutor::new(
            |x: i32| {
                if x == 0 {
                    panic!("bad row before any await");
                }
                async move { Ok::<i32, ExecutorError>(x * 10) }
            },
            ExecutorOptions::default()
                .with_concurrency(1)
                .with_max_retries(1),
        );

        let run = executor.run(vec![0, 1, 2]).await.unwrap();

        assert_eq!(
            run.statuses(),
            vec![
                ExecutionStatus::Failed,
                ExecutionStatus::Completed,
                ExecutionStatus::Completed,
            ]
        );
        assert_eq!(run.details[0].exceptions.len(), 2);
        assert!(run.details[0].exceptions[0].contains("bad row before any await"));
        assert_eq!(run.results, vec![None, Some(10), Some(20)]);
    }

    #[tokio::test]
    async fn test_stop_before_first_attempt_leaves_item_unstarted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let generation_fn = Arc::new(move |x: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<i32, ExecutorError>(x) }
        });

        let signal = StopSignal::new();
        signal.stop();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Finished<i32>>();
        let worker = Worker {
            id: 0,
            generation_fn,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            stop_signal: signal,
            fallback_return_value: None,
            max_attempts: 3,
            timeout: None,
            exit_on_error: false,
            tracker: Arc::new(ProgressTracker::new(None, 1)),
            sender,
        };

        let finished = worker.run_item(WorkItem { index: 0, input: 5 }).await;
        assert!(finished.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        drop(worker);
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_external_stop_before_start_yields_did_not_run() {
        let signal = StopSignal::new();
        signal.stop();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let executor = ConcurrentExecutor::new(
            move |x: i32| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(x) }
            },
            ExecutorOptions::default().with_concurrency(2),
        )
        .with_stop_signal(signal);

        let run = executor.run(vec![1, 2, 3]).await.unwrap();

        assert_eq!(run.statuses(), vec![ExecutionStatus::DidNotRun; 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
