//! Single-threaded reference solver.
//!
//! Evaluates every input of every gate, reading each leaf with its full latency,
//! and only returns once the value is known. Useful as an oracle for
//! [`ParallelSolver`](crate::solver::ParallelSolver).

use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::node::{Circuit, NaryType, Node, ThresholdType};
use crate::solver::CircuitSolver;
use crate::value::CircuitValue;

#[derive(Debug, Default)]
pub struct SequentialSolver {
    stopped: AtomicBool,
}

impl SequentialSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CircuitSolver for SequentialSolver {
    /// Evaluate `circuit` on the calling thread. The returned handle is never pending.
    fn solve(&self, circuit: &Circuit) -> CircuitValue {
        if self.stopped.load(Ordering::SeqCst) {
            return CircuitValue::aborted();
        }
        CircuitValue::resolved(evaluate(circuit.root()))
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!("sequential solver stopped");
        }
    }
}

/// Value of `node`, evaluating all of its inputs.
pub fn evaluate(node: &Node) -> bool {
    let values = || node.inputs().iter().map(|input| evaluate(input));
    match node {
        Node::Leaf(leaf) => leaf.value(),
        Node::Not([a]) => !evaluate(a),
        Node::Nary(NaryType::And, _) => values().fold(true, |acc, v| acc & v),
        Node::Nary(NaryType::Or, _) => values().fold(false, |acc, v| acc | v),
        Node::Threshold(ThresholdType::Gt, k, _) => values().filter(|&v| v).count() > *k,
        Node::Threshold(ThresholdType::Lt, k, _) => values().filter(|&v| v).count() < *k,
        Node::Ite([cond, then, else_]) => {
            let (cond, then, else_) = (evaluate(cond), evaluate(then), evaluate(else_));
            if cond {
                then
            } else {
                else_
            }
        }
    }
}
