use thiserror::Error;

/// Scheduler errors for phase execution. Graph-shape problems are caught
/// at config load, so the only runtime failure is a stalled phase.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("phase stalled: {pending} task(s) can neither start nor finish")]
    Stalled { pending: usize },
}
