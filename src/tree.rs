//! One evaluation of one circuit.

use std::sync::{Arc, Weak};

use log::trace;

use crate::error::PoolError;
use crate::node::NodeRef;
use crate::pool::WorkerPool;
use crate::task::{Task, TaskState};
use crate::value::CircuitValue;

/// Root task of an in-flight evaluation, wired to the handle it resolves.
pub struct EvaluationTree {
    root: Arc<Task>,
}

impl EvaluationTree {
    /// Schedule the root task and a delivery job that hands its value to `value`.
    ///
    /// On error nothing is left running and the caller should abort `value`.
    pub fn start(
        root: NodeRef,
        pool: &WorkerPool,
        value: &CircuitValue,
    ) -> Result<Self, PoolError> {
        let root = Task::new(root, 0, Weak::new(), pool.clone());
        value.attach(&root);
        root.schedule()?;

        let delivery = {
            let root = root.clone();
            let value = value.clone();
            move || match root.wait() {
                TaskState::Resolved(v) => {
                    if value.resolve(v) {
                        trace!("circuit resolved to {}", v);
                    }
                }
                state => trace!("circuit evaluation ended as {:?}", state),
            }
        };
        if let Err(e) = pool.execute(delivery) {
            root.cancel_subtree();
            return Err(e);
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Arc<Task> {
        &self.root
    }
}
