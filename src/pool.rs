//! Elastic worker pool.
//!
//! Evaluation tasks block while waiting for their children, so a fixed-size pool
//! could deadlock with every worker waiting on work still sitting in the queue.
//! This pool instead spawns a new worker whenever queued jobs outnumber idle
//! workers, and lets a worker retire after it has been idle for `keep_alive`.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::PoolError;
use crate::solver::SolverConfig;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct State {
    queue: VecDeque<Job>,
    workers: usize,
    idle: usize,
    spawned: usize,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    /// Signalled when a job is queued or the pool shuts down.
    available: Condvar,
    /// Signalled when a worker exits.
    retired: Condvar,
    keep_alive: Duration,
    thread_name: String,
    stack_size: Option<usize>,
}

/// Handle to a shared pool of worker threads. Cheap to clone.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    pub fn new(config: &SolverConfig) -> Self {
        let shared = Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                workers: 0,
                idle: 0,
                spawned: 0,
                shutdown: false,
            }),
            available: Condvar::new(),
            retired: Condvar::new(),
            keep_alive: config.keep_alive,
            thread_name: config.thread_name.clone(),
            stack_size: config.stack_size,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Queue a job, spawning a worker for it if no idle worker can take it.
    ///
    /// On error the job is dropped without running.
    pub fn execute<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(PoolError::Shutdown);
        }
        state.queue.push_back(Box::new(job));
        if state.queue.len() <= state.idle {
            self.shared.available.notify_one();
            return Ok(());
        }
        match self.spawn_worker(&mut state) {
            Ok(()) => Ok(()),
            Err(e) if state.workers > 0 => {
                // Queued anyway: a busy worker will pick it up eventually.
                warn!("Could not spawn worker, job stays queued: {}", e);
                Ok(())
            }
            Err(e) => {
                let job = state.queue.pop_back();
                drop(state);
                drop(job);
                Err(e)
            }
        }
    }

    fn spawn_worker(&self, state: &mut MutexGuard<'_, State>) -> Result<(), PoolError> {
        let id = state.spawned;
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", self.shared.thread_name, id));
        if let Some(size) = self.shared.stack_size {
            builder = builder.stack_size(size);
        }
        let shared = self.shared.clone();
        builder.spawn(move || work(shared))?;
        state.spawned += 1;
        state.workers += 1;
        debug!("spawned worker {} ({} alive)", id, state.workers);
        Ok(())
    }

    /// Stop accepting work and drop every queued job.
    ///
    /// Jobs already running are left to finish; idle workers exit immediately.
    /// Returns the number of dropped jobs.
    pub fn shutdown_now(&self) -> usize {
        let dropped: Vec<Job> = {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.available.notify_all();
            state.queue.drain(..).collect()
        };
        debug!("pool shut down, {} queued jobs dropped", dropped.len());
        // Dropping jobs may run their cleanup, which must not happen under the pool lock.
        let count = dropped.len();
        drop(dropped);
        count
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Number of live worker threads.
    pub fn workers(&self) -> usize {
        self.shared.state.lock().workers
    }

    /// Block until every worker has exited, or `timeout` elapses.
    ///
    /// Returns `true` if no workers remain.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state.lock();
        while state.workers > 0 {
            match deadline {
                Some(deadline) => {
                    if self.shared.retired.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.shared.retired.wait(&mut state),
            }
        }
        state.workers == 0
    }
}

fn work(shared: Arc<Shared>) {
    let mut state = shared.state.lock();
    loop {
        if let Some(job) = state.queue.pop_front() {
            MutexGuard::unlocked(&mut state, || {
                if let Err(cause) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    error!("job panicked: {:?}", cause);
                }
            });
            continue;
        }
        if state.shutdown {
            break;
        }
        state.idle += 1;
        let timed_out = shared.available.wait_for(&mut state, shared.keep_alive).timed_out();
        state.idle -= 1;
        if timed_out && state.queue.is_empty() {
            debug!("worker idle for {:?}, retiring", shared.keep_alive);
            break;
        }
    }
    state.workers -= 1;
    shared.retired.notify_all();
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    use test_log::test;

    use super::*;

    fn pool_with_keep_alive(keep_alive: Duration) -> WorkerPool {
        WorkerPool::new(&SolverConfig::default().with_keep_alive(keep_alive))
    }

    #[test]
    fn test_runs_jobs() {
        let pool = pool_with_keep_alive(Duration::from_secs(1));
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        for _ in 0..10 {
            let counter = counter.clone();
            let tx = tx.clone();
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                tx.send(()).unwrap();
            })
            .unwrap();
        }
        for _ in 0..10 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_grows_for_blocking_jobs() {
        // Each job blocks until the next one runs; a fixed pool of one would deadlock.
        let pool = pool_with_keep_alive(Duration::from_secs(1));
        let (tx, rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();
        pool.execute(move || {
            rx.recv().unwrap();
            done_tx.send(()).unwrap();
        })
        .unwrap();
        pool.execute(move || tx.send(()).unwrap()).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(pool.workers() >= 1);
    }

    #[test]
    fn test_idle_workers_retire() {
        let pool = pool_with_keep_alive(Duration::from_millis(20));
        pool.execute(|| {}).unwrap();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(pool.workers(), 0);
    }

    #[test]
    fn test_shutdown_rejects_and_drops() {
        let pool = pool_with_keep_alive(Duration::from_secs(10));
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();
        pool.execute(move || {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(pool.shutdown_now(), 0);
        assert!(pool.is_shutdown());
        assert!(matches!(pool.execute(|| {}), Err(PoolError::Shutdown)));

        drop(gate_tx);
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_panicking_job_keeps_worker() {
        let pool = pool_with_keep_alive(Duration::from_secs(1));
        pool.execute(|| panic!("boom")).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.execute(move || tx.send(42).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }
}
