//! Circuit model: an immutable tree of leaves and gates.
//!
//! Children are held behind [`Arc`], so evaluation tasks running on other threads
//! can keep a subtree alive without copying it.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Shared reference to a circuit node.
pub type NodeRef = Arc<Node>;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NodeType {
    Leaf,
    And,
    Or,
    Not,
    Gt,
    Lt,
    If,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NaryType {
    And,
    Or,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ThresholdType {
    /// True iff more than `threshold` inputs are true.
    Gt,
    /// True iff fewer than `threshold` inputs are true.
    Lt,
}

/// A literal boolean value with an optional simulated evaluation latency.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Leaf {
    value: bool,
    delay: Option<Duration>,
}

impl Leaf {
    pub fn new(value: bool) -> Self {
        Self { value, delay: None }
    }

    /// A leaf whose value takes `delay` to read.
    pub fn sleepy(value: bool, delay: Duration) -> Self {
        Self {
            value,
            delay: Some(delay),
        }
    }

    /// Read the value, sleeping for the simulated latency first.
    pub fn value(&self) -> bool {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.value
    }

    /// Read the value without incurring the latency.
    ///
    /// Evaluation tasks use this after waiting out [`Leaf::delay`] themselves,
    /// so that the wait can be interrupted.
    pub fn peek(&self) -> bool {
        self.value
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }
}

#[derive(Debug)]
pub enum Node {
    Leaf(Leaf),
    Not([NodeRef; 1]),
    Nary(NaryType, Box<[NodeRef]>),
    Threshold(ThresholdType, usize, Box<[NodeRef]>),
    /// Condition, then-branch, else-branch.
    Ite([NodeRef; 3]),
}

// Constructors
impl Node {
    pub fn leaf(value: bool) -> Node {
        Node::Leaf(Leaf::new(value))
    }

    pub fn sleepy(value: bool, delay: Duration) -> Node {
        Node::Leaf(Leaf::sleepy(value, delay))
    }

    pub fn not(a: Node) -> Node {
        Node::Not([Arc::new(a)])
    }

    /// # Panics
    ///
    /// Panics if fewer than 2 inputs are given.
    pub fn and(inputs: impl IntoIterator<Item = Node>) -> Node {
        Node::Nary(NaryType::And, Self::collect_inputs(inputs))
    }

    /// # Panics
    ///
    /// Panics if fewer than 2 inputs are given.
    pub fn or(inputs: impl IntoIterator<Item = Node>) -> Node {
        Node::Nary(NaryType::Or, Self::collect_inputs(inputs))
    }

    /// # Panics
    ///
    /// Panics if fewer than 2 inputs are given.
    pub fn gt(threshold: usize, inputs: impl IntoIterator<Item = Node>) -> Node {
        Node::Threshold(ThresholdType::Gt, threshold, Self::collect_inputs(inputs))
    }

    /// # Panics
    ///
    /// Panics if fewer than 2 inputs are given.
    pub fn lt(threshold: usize, inputs: impl IntoIterator<Item = Node>) -> Node {
        Node::Threshold(ThresholdType::Lt, threshold, Self::collect_inputs(inputs))
    }

    pub fn ite(cond: Node, then: Node, else_: Node) -> Node {
        Node::Ite([Arc::new(cond), Arc::new(then), Arc::new(else_)])
    }

    fn collect_inputs(inputs: impl IntoIterator<Item = Node>) -> Box<[NodeRef]> {
        let inputs: Box<[NodeRef]> = inputs.into_iter().map(Arc::new).collect();
        assert!(
            inputs.len() >= 2,
            "Gate requires at least 2 inputs, got {}",
            inputs.len()
        );
        inputs
    }
}

// Getters
impl Node {
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Leaf(_) => NodeType::Leaf,
            Node::Not(_) => NodeType::Not,
            Node::Nary(NaryType::And, _) => NodeType::And,
            Node::Nary(NaryType::Or, _) => NodeType::Or,
            Node::Threshold(ThresholdType::Gt, _, _) => NodeType::Gt,
            Node::Threshold(ThresholdType::Lt, _, _) => NodeType::Lt,
            Node::Ite(_) => NodeType::If,
        }
    }

    /// Ordered children. Empty for leaves.
    pub fn inputs(&self) -> &[NodeRef] {
        match self {
            Node::Leaf(_) => &[],
            Node::Not(inputs) => inputs,
            Node::Nary(_, inputs) => inputs,
            Node::Threshold(_, _, inputs) => inputs,
            Node::Ite(inputs) => inputs,
        }
    }

    /// Threshold of a `GT`/`LT` gate.
    pub fn threshold(&self) -> Option<usize> {
        match self {
            Node::Threshold(_, threshold, _) => Some(*threshold),
            _ => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Number of nodes in the subtree rooted here.
    pub fn size(&self) -> usize {
        1 + self.inputs().iter().map(|n| n.size()).sum::<usize>()
    }

    /// Length of the longest root-to-leaf path, counting edges.
    pub fn depth(&self) -> usize {
        self.inputs()
            .iter()
            .map(|n| n.depth() + 1)
            .max()
            .unwrap_or(0)
    }
}

impl Display for NodeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeType::Leaf => "LEAF",
            NodeType::And => "AND",
            NodeType::Or => "OR",
            NodeType::Not => "NOT",
            NodeType::Gt => "GT",
            NodeType::Lt => "LT",
            NodeType::If => "IF",
        };
        write!(f, "{}", name)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Node::Leaf(leaf) = self {
            return write!(f, "{}", leaf.value);
        }
        write!(f, "{}", self.node_type())?;
        if let Some(threshold) = self.threshold() {
            write!(f, "[{}]", threshold)?;
        }
        write!(f, "(")?;
        for (i, input) in self.inputs().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", input)?;
        }
        write!(f, ")")
    }
}

/// A whole circuit submitted for evaluation.
#[derive(Debug, Clone)]
pub struct Circuit {
    root: NodeRef,
}

impl Circuit {
    pub fn new(root: Node) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }
}

impl From<Node> for Circuit {
    fn from(root: Node) -> Self {
        Circuit::new(root)
    }
}

impl Display for Circuit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root)
    }
}
