//! Circuit solvers.
//!
//! [`ParallelSolver`] evaluates every submitted circuit on one shared
//! [`WorkerPool`], created on the first [`solve`](CircuitSolver::solve) call.
//!
//! # Examples
//!
//! ```
//! use circuit_solver::node::{Circuit, Node};
//! use circuit_solver::solver::{CircuitSolver, ParallelSolver};
//!
//! let solver = ParallelSolver::new();
//! let circuit = Circuit::new(Node::or([Node::leaf(false), Node::leaf(true)]));
//! assert_eq!(solver.solve(&circuit).get(), Ok(true));
//! solver.stop();
//! ```

use std::mem;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;

use crate::node::Circuit;
use crate::pool::WorkerPool;
use crate::tree::EvaluationTree;
use crate::value::CircuitValue;

/// Something that can evaluate circuits asynchronously.
pub trait CircuitSolver {
    /// Start evaluating `circuit` and return a handle to its value.
    ///
    /// Never blocks on the evaluation itself. After [`stop`](Self::stop) the
    /// returned handle is already aborted.
    fn solve(&self, circuit: &Circuit) -> CircuitValue;

    /// Abort all pending evaluations and refuse new ones. Idempotent.
    fn stop(&self);
}

/// Worker pool settings for a [`ParallelSolver`].
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// How long an idle worker waits for a job before exiting (default: 1 s)
    pub keep_alive: Duration,
    /// Name prefix for worker threads (default: "circuit-worker")
    pub thread_name: String,
    /// Stack size of worker threads, if not the platform default
    pub stack_size: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(1),
            thread_name: "circuit-worker".to_string(),
            stack_size: None,
        }
    }
}

impl SolverConfig {
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }
}

struct SolverState {
    pool: Option<WorkerPool>,
    /// Handles that may still be pending.
    values: Vec<CircuitValue>,
    stopped: bool,
}

pub struct ParallelSolver {
    config: SolverConfig,
    state: Mutex<SolverState>,
}

impl ParallelSolver {
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default())
    }

    pub fn with_config(config: SolverConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SolverState {
                pool: None,
                values: Vec::new(),
                stopped: false,
            }),
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The shared pool, once the first circuit has been submitted.
    pub fn pool(&self) -> Option<WorkerPool> {
        self.state.lock().pool.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

impl Default for ParallelSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitSolver for ParallelSolver {
    fn solve(&self, circuit: &Circuit) -> CircuitValue {
        let mut state = self.state.lock();
        if state.stopped {
            debug!("solver is stopped, refusing circuit");
            return CircuitValue::aborted();
        }
        state.values.retain(CircuitValue::is_pending);

        let pool = state
            .pool
            .get_or_insert_with(|| {
                debug!("starting worker pool");
                WorkerPool::new(&self.config)
            })
            .clone();
        let value = CircuitValue::pending();
        state.values.push(value.clone());

        debug!(
            "solving circuit of size {} ({} in flight)",
            circuit.root().size(),
            state.values.len()
        );
        if let Err(e) = EvaluationTree::start(circuit.root().clone(), &pool, &value) {
            debug!("could not start evaluation: {}", e);
            value.abort();
        }
        value
    }

    fn stop(&self) {
        let (pool, values) = {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            (state.pool.clone(), mem::take(&mut state.values))
        };
        debug!("stopping solver, aborting {} evaluations", values.len());
        if let Some(pool) = pool {
            pool.shutdown_now();
        }
        for value in values {
            value.abort();
        }
    }
}
