//! # circuit-solver: concurrent evaluation of boolean circuits
//!
//! A **circuit** is a tree of gates (`AND`, `OR`, `NOT`, `GT`, `LT`, `IF`) over boolean leaves,
//! where reading a leaf may take time.
//! The [`ParallelSolver`][crate::solver::ParallelSolver] evaluates every node as its own task on a
//! shared pool of worker threads, so slow leaves are read concurrently.
//!
//! ## Short-circuiting
//!
//! A gate decides as soon as the values seen so far fix its output, regardless of the order
//! in which its inputs finish:
//!
//! - `AND` is `false` on the first `false` input, `OR` is `true` on the first `true`.
//! - `GT[k]` is `true` once more than `k` inputs are `true`, and `false` once too few inputs remain.
//! - `LT[k]` mirrors `GT[k]`; `LT[0]`, `LT[k > n]` and `GT[k >= n]` are decided without evaluating anything.
//! - `IF` follows the condition once it is known, and skips the condition when both branches agree.
//!
//! Inputs whose value is no longer needed are cancelled together with their whole subtree.
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use circuit_solver::node::{Circuit, Node};
//! use circuit_solver::solver::{CircuitSolver, ParallelSolver};
//!
//! let solver = ParallelSolver::new();
//!
//! // The slow leaf is never waited for: the first input already decides the AND.
//! let circuit = Circuit::new(Node::and([
//!     Node::leaf(false),
//!     Node::sleepy(true, Duration::from_secs(60)),
//! ]));
//! let value = solver.solve(&circuit);
//! assert_eq!(value.get(), Ok(false));
//!
//! // Aborts everything still in flight; later solves are aborted immediately.
//! solver.stop();
//! assert!(solver.solve(&circuit).get().is_err());
//! ```
//!
//! ## Core Components
//!
//! - **[`node`]**: the circuit model.
//! - **[`solver`]**: the [`CircuitSolver`][crate::solver::CircuitSolver] trait and the parallel solver.
//! - **[`value`]**: the result handle returned by `solve`.
//! - **[`task`]** and **[`decision`]**: per-node evaluation and the early decision rules.
//! - **[`sequential`]** and **[`generate`]**: a reference solver and random workloads for testing.

pub mod decision;
pub mod error;
pub mod generate;
pub mod node;
pub mod pool;
pub mod sequential;
pub mod solver;
pub mod task;
pub mod tree;
pub mod value;
