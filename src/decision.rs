//! Per-gate early decision rules.
//!
//! A gate observes its children one at a time, in whatever order they finish.
//! Every rule here is a function of the cumulative tally of observed values (or,
//! for `IF`, of which slot each value fills), never of the arrival order, so any
//! interleaving of child completions yields the same decision.

use crate::node::{NaryType, Node, ThresholdType};

/// Counting rule of a non-`IF` gate.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Rule {
    Not,
    And,
    Or,
    Gt(usize),
    Lt(usize),
}

/// Outcome of observing one more child.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct Step {
    /// The gate's value, once determined.
    pub value: Option<bool>,
    /// A child whose result is no longer needed.
    pub prune: Option<usize>,
}

impl Step {
    fn decided(value: Option<bool>) -> Self {
        Self { value, prune: None }
    }
}

/// Running state of a gate's decision.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Progress {
    Count {
        rule: Rule,
        total: usize,
        trues: usize,
        falses: usize,
    },
    /// Slots for condition, then-branch, else-branch.
    Branch { slots: [Option<bool>; 3] },
}

impl Progress {
    /// Fresh progress for a gate, or `None` for a leaf.
    pub fn for_node(node: &Node) -> Option<Self> {
        let total = node.inputs().len();
        let rule = match node {
            Node::Leaf(_) => return None,
            Node::Ite(_) => return Some(Progress::Branch { slots: [None; 3] }),
            Node::Not(_) => Rule::Not,
            Node::Nary(NaryType::And, _) => Rule::And,
            Node::Nary(NaryType::Or, _) => Rule::Or,
            Node::Threshold(ThresholdType::Gt, k, _) => Rule::Gt(*k),
            Node::Threshold(ThresholdType::Lt, k, _) => Rule::Lt(*k),
        };
        Some(Progress::Count {
            rule,
            total,
            trues: 0,
            falses: 0,
        })
    }

    /// Decision reachable before any child is evaluated.
    ///
    /// This is the general rule applied to an empty tally, which yields exactly
    /// `LT(0) = false`, `LT(k > n) = true` and `GT(k >= n) = false`.
    pub fn decide_upfront(&self) -> Option<bool> {
        match *self {
            Progress::Count {
                rule,
                total,
                trues,
                falses,
            } => decide(rule, total, trues, falses),
            Progress::Branch { .. } => None,
        }
    }

    /// Record that the child at `index` finished with `value`.
    pub fn observe(&mut self, index: usize, value: bool) -> Step {
        match self {
            Progress::Count {
                rule,
                total,
                trues,
                falses,
            } => {
                if value {
                    *trues += 1;
                } else {
                    *falses += 1;
                }
                Step::decided(decide(*rule, *total, *trues, *falses))
            }
            Progress::Branch { slots } => {
                slots[index] = Some(value);
                decide_ite(slots)
            }
        }
    }
}

fn decide(rule: Rule, total: usize, trues: usize, falses: usize) -> Option<bool> {
    match rule {
        Rule::Not => match (trues, falses) {
            (0, 0) => None,
            _ => Some(trues == 0),
        },
        Rule::And => {
            if falses > 0 {
                Some(false)
            } else if trues == total {
                Some(true)
            } else {
                None
            }
        }
        Rule::Or => {
            if trues > 0 {
                Some(true)
            } else if falses == total {
                Some(false)
            } else {
                None
            }
        }
        // True-count can only grow, up to `total - falses`.
        Rule::Gt(k) => {
            if trues > k {
                Some(true)
            } else if falses + k >= total {
                Some(false)
            } else {
                None
            }
        }
        Rule::Lt(k) => {
            if trues >= k {
                Some(false)
            } else if falses + k > total {
                Some(true)
            } else {
                None
            }
        }
    }
}

fn decide_ite(slots: &[Option<bool>; 3]) -> Step {
    let [cond, then, else_] = *slots;
    match cond {
        Some(true) => Step {
            value: then,
            prune: Some(2),
        },
        Some(false) => Step {
            value: else_,
            prune: Some(1),
        },
        None => match (then, else_) {
            (Some(a), Some(b)) if a == b => Step {
                value: Some(a),
                prune: Some(0),
            },
            _ => Step::default(),
        },
    }
}
