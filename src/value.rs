//! Result handle returned by [`CircuitSolver::solve`](crate::solver::CircuitSolver::solve).

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::SolveError;
use crate::task::Task;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum State {
    Pending,
    Resolved(bool),
    Aborted,
}

impl State {
    fn outcome(self) -> Option<Result<bool, SolveError>> {
        match self {
            State::Pending => None,
            State::Resolved(value) => Some(Ok(value)),
            State::Aborted => Some(Err(SolveError::Aborted)),
        }
    }
}

struct Inner {
    state: Mutex<State>,
    ready: Condvar,
    /// Root of the evaluation feeding this handle, cancelled on abort.
    root: OnceLock<Weak<Task>>,
}

/// Single-assignment value of a circuit, resolved at most once.
///
/// Clones share the same underlying slot.
#[derive(Clone)]
pub struct CircuitValue {
    inner: Arc<Inner>,
}

impl CircuitValue {
    pub(crate) fn pending() -> Self {
        Self::with_state(State::Pending)
    }

    pub(crate) fn resolved(value: bool) -> Self {
        Self::with_state(State::Resolved(value))
    }

    pub(crate) fn aborted() -> Self {
        Self::with_state(State::Aborted)
    }

    fn with_state(state: State) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                ready: Condvar::new(),
                root: OnceLock::new(),
            }),
        }
    }

    /// Block until the value is known.
    ///
    /// # Errors
    ///
    /// Returns [`SolveError::Aborted`] if the evaluation was aborted.
    pub fn get(&self) -> Result<bool, SolveError> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(outcome) = state.outcome() {
                return outcome;
            }
            self.inner.ready.wait(&mut state);
        }
    }

    /// Like [`get`](Self::get), but gives up after `timeout`, returning `None`.
    pub fn get_timeout(&self, timeout: Duration) -> Option<Result<bool, SolveError>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.get());
        };
        let mut state = self.inner.state.lock();
        loop {
            if let Some(outcome) = state.outcome() {
                return Some(outcome);
            }
            if self.inner.ready.wait_until(&mut state, deadline).timed_out() {
                return state.outcome();
            }
        }
    }

    /// Non-blocking [`get`](Self::get): `None` while pending.
    pub fn try_get(&self) -> Option<Result<bool, SolveError>> {
        self.inner.state.lock().outcome()
    }

    pub fn is_pending(&self) -> bool {
        *self.inner.state.lock() == State::Pending
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.inner.state.lock(), State::Resolved(_))
    }

    pub fn is_aborted(&self) -> bool {
        *self.inner.state.lock() == State::Aborted
    }

    /// Deliver the value. Has no effect once the handle is resolved or aborted.
    pub(crate) fn resolve(&self, value: bool) -> bool {
        self.transition(State::Resolved(value))
    }

    /// Abort a pending handle and cancel the evaluation behind it.
    ///
    /// A handle that already holds a value keeps it.
    pub fn abort(&self) {
        if self.transition(State::Aborted) {
            if let Some(root) = self.inner.root.get().and_then(Weak::upgrade) {
                root.cancel_subtree();
            }
        }
    }

    /// Link the handle to the root task computing it.
    pub(crate) fn attach(&self, root: &Arc<Task>) {
        let attached = self.inner.root.set(Arc::downgrade(root)).is_ok();
        debug_assert!(attached, "circuit value is already attached to a root task");
        // Aborted before the link existed.
        if self.is_aborted() {
            root.cancel_subtree();
        }
    }

    fn transition(&self, next: State) -> bool {
        let mut state = self.inner.state.lock();
        if *state != State::Pending {
            return false;
        }
        *state = next;
        self.inner.ready.notify_all();
        true
    }
}

impl Debug for CircuitValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CircuitValue")
            .field(&*self.inner.state.lock())
            .finish()
    }
}
