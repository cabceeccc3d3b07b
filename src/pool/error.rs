//! Run-control errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned synchronously by pool control operations.
///
/// None of these change any task state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("a run is already in progress on this pool")]
    ConcurrentRun,

    #[error("cannot submit tasks once a run has started")]
    RunInProgress,

    #[error("this pool has already completed its run")]
    AlreadyFinished,

    #[error("max workers must be at least 1")]
    InvalidWorkerCount,

    #[error("another submitted task already writes {}", .0.display())]
    DuplicateOutput(PathBuf),
}
