//! @ai:module:intent Minimal progress reporting for batch runs
//! @ai:module:layer infrastructure
//! @ai:module:public_api Progress, ProgressFn

use crate::executor::status::ExecutionStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// @ai:intent Snapshot emitted when an item reaches a terminal state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub index: usize,
    pub status: ExecutionStatus,
    pub finished: usize,
    pub total: usize,
}

pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// @ai:intent Counts finished items and forwards them to an optional callback
pub(crate) struct ProgressTracker {
    callback: Option<ProgressFn>,
    finished: AtomicUsize,
    total: usize,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Option<ProgressFn>, total: usize) -> Self {
        Self {
            callback,
            finished: AtomicUsize::new(0),
            total,
        }
    }

    /// @ai:intent Record one finished item
    /// @ai:effects state:write
    pub(crate) fn item_finished(&self, index: usize, status: ExecutionStatus) {
        let finished = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("[{}/{}] item {} {}", finished, self.total, index, status);

        if let Some(callback) = &self.callback {
            callback(Progress {
                index,
                status,
                finished,
                total: self.total,
            });
        }
    }
}
