use thiserror::Error;

/// Failure observed by a caller waiting on a [`CircuitValue`](crate::value::CircuitValue).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum SolveError {
    /// The evaluation was aborted before it produced a value, either by
    /// [`CircuitSolver::stop`](crate::solver::CircuitSolver::stop) or by
    /// [`CircuitValue::abort`](crate::value::CircuitValue::abort).
    #[error("circuit evaluation was aborted")]
    Aborted,
}

/// Work refused by a [`WorkerPool`](crate::pool::WorkerPool).
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool has been shut down")]
    Shutdown,
    #[error("failed to spawn a worker thread")]
    Spawn(#[from] std::io::Error),
}
