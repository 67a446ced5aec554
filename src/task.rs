//! Evaluation task: one per circuit node per solve.
//!
//! A task runs as a single job on the [`WorkerPool`]. A gate task spawns one child
//! task per input and then waits for completion signals, feeding each child's
//! value into its [`Progress`] until the gate's value is decided. Leaves wait out
//! their simulated latency and publish their value.
//!
//! ```text
//! Unstarted -> Initializing -> Waiting ... -> Resolved(value)
//!                                          \-> Cancelled
//! ```
//!
//! Either terminal state cancels the subtrees of all children that are still
//! running. Cancellation is cooperative: it sets the stop flag and wakes the
//! task's mailbox, so a blocked wait returns promptly.
//!
//! Ownership runs strictly from parent to children; the back-reference to the
//! parent is a [`Weak`] used only to report completion.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};

use crate::decision::Progress;
use crate::error::PoolError;
use crate::node::{Leaf, NodeRef};
use crate::pool::WorkerPool;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TaskState {
    Unstarted,
    Initializing,
    Waiting,
    Resolved(bool),
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Resolved(_) | TaskState::Cancelled)
    }
}

struct Mailbox {
    state: TaskState,
    /// Children that have resolved, with their values, in arrival order.
    finished: VecDeque<(usize, bool)>,
}

pub struct Task {
    node: NodeRef,
    index: usize,
    parent: Weak<Task>,
    pool: WorkerPool,
    /// Set once, when the task is cancelled or finishes.
    stop: AtomicBool,
    mailbox: Mutex<Mailbox>,
    wakeup: Condvar,
    children: OnceLock<Box<[Arc<Task>]>>,
}

enum Init {
    Leaf(Leaf),
    Decided(bool),
    Spawned(Progress),
    Stopped,
}

impl Task {
    pub(crate) fn new(
        node: NodeRef,
        index: usize,
        parent: Weak<Task>,
        pool: WorkerPool,
    ) -> Arc<Self> {
        Arc::new(Self {
            node,
            index,
            parent,
            pool,
            stop: AtomicBool::new(false),
            mailbox: Mutex::new(Mailbox {
                state: TaskState::Unstarted,
                finished: VecDeque::new(),
            }),
            wakeup: Condvar::new(),
            children: OnceLock::new(),
        })
    }

    /// Submit this task to its pool.
    ///
    /// If the job is dropped without running, the task settles as cancelled.
    pub(crate) fn schedule(self: &Arc<Self>) -> Result<(), PoolError> {
        let job = Scheduled(Some(self.clone()));
        self.pool.execute(move || job.run())
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn state(&self) -> TaskState {
        self.mailbox.lock().state
    }

    /// Value of a resolved task.
    pub fn value(&self) -> Option<bool> {
        match self.state() {
            TaskState::Resolved(value) => Some(value),
            _ => None,
        }
    }

    /// Whether the task was cancelled or has finished.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Child tasks, once initialization has spawned them.
    pub fn children(&self) -> Option<&[Arc<Task>]> {
        self.children.get().map(|c| &c[..])
    }

    /// Block until the task reaches a terminal state.
    pub fn wait(&self) -> TaskState {
        let mut mailbox = self.mailbox.lock();
        while !mailbox.state.is_terminal() {
            self.wakeup.wait(&mut mailbox);
        }
        mailbox.state
    }

    /// Ask the task to stop. Idempotent.
    pub fn cancel(&self) {
        if self
            .stop
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            // Taking the lock orders this wakeup after any concurrent flag check.
            let _mailbox = self.mailbox.lock();
            self.wakeup.notify_all();
        }
    }

    /// Cancel this task and, recursively, every child not already stopped.
    pub fn cancel_subtree(&self) {
        self.cancel();
        if let Some(children) = self.children() {
            for child in children.iter().filter(|c| !c.is_stopped()) {
                child.cancel_subtree();
            }
        }
    }

    fn run(self: &Arc<Self>) {
        let outcome = self.evaluate();
        self.finish(outcome);
    }

    fn evaluate(self: &Arc<Self>) -> Option<bool> {
        if self.is_stopped() {
            return None;
        }
        self.set_state(TaskState::Initializing);
        let mut progress = match self.initialize() {
            Init::Leaf(leaf) => return self.read_leaf(leaf),
            Init::Decided(value) => return Some(value),
            Init::Stopped => return None,
            Init::Spawned(progress) => progress,
        };
        loop {
            let (index, value) = self.next_finished()?;
            let step = progress.observe(index, value);
            if let Some(prune) = step.prune {
                self.prune(prune);
            }
            if step.value.is_some() {
                return step.value;
            }
        }
    }

    fn initialize(self: &Arc<Self>) -> Init {
        let Some(progress) = Progress::for_node(&self.node) else {
            return match self.node.as_leaf() {
                Some(leaf) => Init::Leaf(*leaf),
                None => unreachable!("only leaves have no decision progress"),
            };
        };
        if let Some(value) = progress.decide_upfront() {
            trace!("{} decided without evaluating inputs", self.node.node_type());
            return Init::Decided(value);
        }

        let parent = Arc::downgrade(self);
        let children: Box<[Arc<Task>]> = self
            .node
            .inputs()
            .iter()
            .enumerate()
            .map(|(i, input)| Task::new(input.clone(), i, parent.clone(), self.pool.clone()))
            .collect();
        let children = self.children.get_or_init(|| children);

        // Published before this check, so a concurrent `cancel_subtree` either
        // sees the children or is seen here.
        if self.is_stopped() {
            children.iter().for_each(|c| c.abandon());
            return Init::Stopped;
        }
        for (i, child) in children.iter().enumerate() {
            if let Err(e) = child.schedule() {
                let gate = self.node.node_type();
                match e {
                    PoolError::Shutdown => debug!("pool shut down before input {} of {}", i, gate),
                    PoolError::Spawn(_) => warn!("failed to schedule input {} of {}: {}", i, gate, e),
                }
                children[i + 1..].iter().for_each(|c| c.abandon());
                return Init::Stopped;
            }
        }
        Init::Spawned(progress)
    }

    fn read_leaf(&self, leaf: Leaf) -> Option<bool> {
        if let Some(delay) = leaf.delay() {
            if !self.sleep(delay) {
                return None;
            }
        }
        Some(leaf.peek())
    }

    /// Sleep for `delay` unless stopped first. Returns `false` if stopped.
    fn sleep(&self, delay: Duration) -> bool {
        // No representable deadline: wait until cancelled.
        let deadline = Instant::now().checked_add(delay);
        let mut mailbox = self.mailbox.lock();
        while !self.is_stopped() {
            match deadline {
                Some(deadline) => {
                    if self.wakeup.wait_until(&mut mailbox, deadline).timed_out() {
                        return !self.is_stopped();
                    }
                }
                None => self.wakeup.wait(&mut mailbox),
            }
        }
        false
    }

    /// Block for the next child completion. `None` if stopped while waiting.
    fn next_finished(&self) -> Option<(usize, bool)> {
        let mut mailbox = self.mailbox.lock();
        mailbox.state = TaskState::Waiting;
        loop {
            if self.is_stopped() {
                return None;
            }
            if let Some(signal) = mailbox.finished.pop_front() {
                return Some(signal);
            }
            self.wakeup.wait(&mut mailbox);
        }
    }

    /// Called by a child once it has resolved.
    fn report(&self, index: usize, value: bool) {
        let mut mailbox = self.mailbox.lock();
        mailbox.finished.push_back((index, value));
        self.wakeup.notify_all();
    }

    fn prune(&self, index: usize) {
        if let Some(child) = self.children().and_then(|c| c.get(index)) {
            if !child.is_stopped() {
                trace!("pruning input {} of {}", index, self.node.node_type());
                child.cancel_subtree();
            }
        }
    }

    fn finish(&self, outcome: Option<bool>) {
        let state = match outcome {
            Some(value) => TaskState::Resolved(value),
            None => TaskState::Cancelled,
        };
        self.settle(state);
        trace!("{} {:?}", self.node.node_type(), state);
        if let Some(value) = outcome {
            if let Some(parent) = self.parent.upgrade() {
                parent.report(self.index, value);
            }
        }
        self.stop.store(true, Ordering::SeqCst);
        if let Some(children) = self.children() {
            for child in children.iter().filter(|c| !c.is_stopped()) {
                child.cancel_subtree();
            }
        }
    }

    /// Give up on a task whose job will never run, or whose run was cut short.
    fn abandon(&self) {
        self.cancel_subtree();
        self.settle(TaskState::Cancelled);
    }

    fn set_state(&self, state: TaskState) {
        self.mailbox.lock().state = state;
    }

    /// Enter a terminal state unless already in one.
    fn settle(&self, state: TaskState) -> bool {
        let mut mailbox = self.mailbox.lock();
        if mailbox.state.is_terminal() {
            return false;
        }
        mailbox.state = state;
        mailbox.finished.clear();
        self.wakeup.notify_all();
        true
    }
}

/// A task handed to the pool; settles the task as cancelled if dropped unrun
/// or if its run unwinds.
struct Scheduled(Option<Arc<Task>>);

impl Scheduled {
    fn run(mut self) {
        if let Some(task) = &self.0 {
            task.run();
        }
        self.0 = None;
    }
}

impl Drop for Scheduled {
    fn drop(&mut self) {
        if let Some(task) = self.0.take() {
            task.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::node::Node;
    use crate::solver::SolverConfig;

    const SLOW: Duration = Duration::from_secs(30);
    const PATIENCE: Duration = Duration::from_secs(10);

    fn pool() -> WorkerPool {
        WorkerPool::new(&SolverConfig::default())
    }

    fn start(node: Node, pool: &WorkerPool) -> Arc<Task> {
        let task = Task::new(Arc::new(node), 0, Weak::new(), pool.clone());
        task.schedule().unwrap();
        task
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + PATIENCE;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_leaf() {
        let pool = pool();
        let task = start(Node::leaf(true), &pool);
        assert_eq!(task.wait(), TaskState::Resolved(true));
        assert!(task.is_stopped());
        assert!(task.children().is_none());
    }

    #[test]
    fn test_nested_gates() {
        let pool = pool();
        let circuit = Node::or([
            Node::and([Node::leaf(true), Node::leaf(false)]),
            Node::not(Node::leaf(true)),
        ]);
        let task = start(circuit, &pool);
        assert_eq!(task.wait(), TaskState::Resolved(false));
    }

    #[test]
    fn test_and_short_circuits_slow_input() {
        let pool = pool();
        let started = Instant::now();
        let task = start(Node::and([Node::leaf(false), Node::sleepy(true, SLOW)]), &pool);
        assert_eq!(task.wait(), TaskState::Resolved(false));
        assert!(started.elapsed() < SLOW);

        let slow = task.children().unwrap()[1].clone();
        assert_eq!(slow.wait(), TaskState::Cancelled);
    }

    #[test]
    fn test_or_short_circuits_slow_input() {
        let pool = pool();
        let task = start(Node::or([Node::sleepy(false, SLOW), Node::leaf(true)]), &pool);
        assert_eq!(task.wait(), TaskState::Resolved(true));
    }

    #[test]
    fn test_gt_ignores_third_input() {
        let pool = pool();
        let inputs = [Node::leaf(true), Node::sleepy(false, SLOW), Node::leaf(true)];
        let task = start(Node::gt(1, inputs), &pool);
        assert_eq!(task.wait(), TaskState::Resolved(true));
    }

    #[test]
    fn test_upfront_decision_spawns_nothing() {
        let pool = pool();
        let lt = start(Node::lt(0, [Node::leaf(false), Node::leaf(false)]), &pool);
        assert_eq!(lt.wait(), TaskState::Resolved(false));
        assert!(lt.children().is_none());

        let gt = start(Node::gt(2, [Node::leaf(true), Node::leaf(true)]), &pool);
        assert_eq!(gt.wait(), TaskState::Resolved(false));
        assert!(gt.children().is_none());
    }

    #[test]
    fn test_ite_cancels_unneeded_branch() {
        let pool = pool();
        let circuit = Node::ite(Node::leaf(false), Node::sleepy(true, SLOW), Node::leaf(true));
        let task = start(circuit, &pool);
        assert_eq!(task.wait(), TaskState::Resolved(true));

        let then = task.children().unwrap()[1].clone();
        assert_eq!(then.wait(), TaskState::Cancelled);
    }

    #[test]
    fn test_ite_equal_branches_cancel_condition() {
        let pool = pool();
        let circuit = Node::ite(Node::sleepy(true, SLOW), Node::leaf(false), Node::leaf(false));
        let task = start(circuit, &pool);
        assert_eq!(task.wait(), TaskState::Resolved(false));

        let cond = task.children().unwrap()[0].clone();
        assert_eq!(cond.wait(), TaskState::Cancelled);
    }

    #[test]
    fn test_cancel_subtree_interrupts_waits() {
        let pool = pool();
        let circuit = Node::and([
            Node::sleepy(true, SLOW),
            Node::or([Node::sleepy(false, SLOW), Node::sleepy(false, SLOW)]),
        ]);
        let task = start(circuit, &pool);
        assert!(wait_until(|| task.children().is_some()));
        let or = task.children().unwrap()[1].clone();
        assert!(wait_until(|| or.children().is_some()));

        task.cancel_subtree();
        assert_eq!(task.wait(), TaskState::Cancelled);
        assert_eq!(or.wait(), TaskState::Cancelled);
        for leaf in or.children().unwrap() {
            assert_eq!(leaf.wait(), TaskState::Cancelled);
        }
    }

    #[test]
    fn test_cancel_before_start() {
        let pool = pool();
        let task = Task::new(Arc::new(Node::leaf(true)), 0, Weak::new(), pool.clone());
        task.cancel();
        task.cancel();
        task.schedule().unwrap();
        assert_eq!(task.wait(), TaskState::Cancelled);
    }

    #[test]
    fn test_dropped_job_settles_cancelled() {
        let pool = pool();
        pool.shutdown_now();
        let task = Task::new(Arc::new(Node::leaf(true)), 0, Weak::new(), pool.clone());
        assert!(task.schedule().is_err());
        assert_eq!(task.wait(), TaskState::Cancelled);
    }

    #[test]
    fn test_gate_on_shut_down_pool_abandons_inputs() {
        let pool = pool();
        pool.shutdown_now();
        let gate = Node::or([Node::leaf(true), Node::leaf(false), Node::leaf(true)]);
        let task = Task::new(Arc::new(gate), 0, Weak::new(), pool.clone());
        assert!(matches!(task.initialize(), Init::Stopped));
        for child in task.children().unwrap() {
            assert_eq!(child.wait(), TaskState::Cancelled);
        }
    }

    #[test]
    fn test_unwinding_job_settles_cancelled() {
        let pool = pool();
        let task = Task::new(Arc::new(Node::leaf(true)), 0, Weak::new(), pool.clone());
        let job = Scheduled(Some(task.clone()));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _job = job;
            panic!("job failed mid-run");
        }));
        assert!(result.is_err());
        assert_eq!(task.wait(), TaskState::Cancelled);
        assert!(task.is_stopped());
    }

    #[test]
    fn test_unbounded_latency_is_cancellable() {
        let pool = pool();
        let task = start(Node::and([Node::sleepy(true, Duration::MAX), Node::leaf(true)]), &pool);
        assert!(wait_until(|| task.children().is_some()));
        let leaf = task.children().unwrap()[0].clone();
        assert!(wait_until(|| leaf.state() == TaskState::Initializing));

        task.cancel_subtree();
        assert_eq!(task.wait(), TaskState::Cancelled);
        assert_eq!(leaf.wait(), TaskState::Cancelled);
    }
}
