//! Task model shared by classifiers and generators: the per-turn
//! lifecycle state machine and its derived predicates.

pub mod classifier;
pub mod generator;

pub use classifier::ClassifierTask;
pub use generator::{ApplyOutcome, GenRequest, GeneratorTask};

use tokio::sync::oneshot;

/// System default acceptance score for classifications without their own
/// threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Retries allowed after the initial generator invocation; 4 operations
/// total before the task is skipped.
pub const MAX_RETRIES: u32 = 3;

/// Per-turn lifecycle state. Transitions only move forward:
/// not-started -> started -> (ready -> processed) | skipped.
#[derive(Debug, Default)]
pub struct TaskState<R> {
    pub skipped: bool,
    pub processed: bool,
    pub result: Option<R>,
    pub inflight: Option<oneshot::Receiver<R>>,
}

impl<R: Default> TaskState<R> {
    pub fn reset(&mut self) {
        self.skipped = false;
        self.processed = false;
        self.result = None;
        self.inflight = None;
    }

    pub fn is_done(&self) -> bool {
        self.skipped || self.processed
    }

    /// A result is available and its effects have not been applied yet.
    pub fn is_ready(&self) -> bool {
        self.result.is_some() && !self.is_done()
    }

    pub fn is_started(&self) -> bool {
        self.skipped || self.inflight.is_some() || self.result.is_some() || self.processed
    }

    /// Move a completed in-flight operation into the result slot. A
    /// dropped sender (panicked operation) resolves to the failure
    /// sentinel `R::default()`.
    pub fn poll(&mut self) {
        let Some(rx) = self.inflight.as_mut() else {
            return;
        };
        match rx.try_recv() {
            Ok(value) => {
                self.result = Some(value);
                self.inflight = None;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                self.result = Some(R::default());
                self.inflight = None;
            }
        }
    }
}
