//! Random circuit workloads.
//!
//! Depth drops by a random step at every gate, and once the node budget is
//! spent every remaining position becomes a leaf, so the node limit is soft:
//! siblings of the node that hit it are still generated, as leaves.

use std::time::Duration;

use rand::Rng;

use crate::node::{Circuit, Node};

/// Parameters of [`random_circuit`].
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Probability that a leaf has a simulated latency (default: 0.8)
    pub sleepy_chance: f64,
    /// Probability that a leaf is `true` (default: 0.5)
    pub true_leaf_chance: f64,
    /// Depth budget of the root (default: 20)
    pub max_depth: usize,
    /// Largest depth step between a gate and its inputs (default: 3)
    pub max_depth_variation: usize,
    /// Upper bound of a sleepy leaf's latency (default: 100 ms)
    pub max_sleep: Duration,
    /// Largest input count of AND, OR, GT and LT gates (default: 16)
    pub max_args: usize,
    /// Soft cap on the number of nodes (default: 1000)
    pub node_limit: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sleepy_chance: 0.8,
            true_leaf_chance: 0.5,
            max_depth: 20,
            max_depth_variation: 3,
            max_sleep: Duration::from_millis(100),
            max_args: 16,
            node_limit: 1000,
        }
    }
}

impl GeneratorConfig {
    pub fn with_sleepy_chance(mut self, chance: f64) -> Self {
        self.sleepy_chance = chance;
        self
    }

    pub fn with_true_leaf_chance(mut self, chance: f64) -> Self {
        self.true_leaf_chance = chance;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    pub fn with_max_args(mut self, max_args: usize) -> Self {
        self.max_args = max_args;
        self
    }

    pub fn with_node_limit(mut self, node_limit: usize) -> Self {
        self.node_limit = node_limit;
        self
    }
}

/// Build a random circuit.
///
/// Gate kinds are drawn uniformly. A `GT`/`LT` threshold is drawn up to the
/// sampled argument bound rather than the actual input count, so thresholds
/// past the input count (the immediate shortcuts) show up regularly.
///
/// # Panics
///
/// Panics if `config.max_args < 2` or a chance lies outside `[0, 1]`.
pub fn random_circuit<R: Rng>(rng: &mut R, config: &GeneratorConfig) -> Circuit {
    assert!(config.max_args >= 2, "max_args must be at least 2");
    let mut count = 0;
    Circuit::new(random_node(rng, config, config.max_depth, &mut count))
}

fn random_node<R: Rng>(
    rng: &mut R,
    config: &GeneratorConfig,
    depth: usize,
    count: &mut usize,
) -> Node {
    *count += 1;
    if depth == 0 || *count >= config.node_limit {
        return random_leaf(rng, config);
    }

    let step = rng.random_range(1..=config.max_depth_variation.max(1));
    let depth = depth.saturating_sub(step);
    let max_args = rng.random_range(2..=config.max_args);
    let threshold = rng.random_range(0..=max_args);
    let kind = rng.random_range(0..6);

    let mut inputs = |min: usize, max: usize| -> Vec<Node> {
        let n = rng.random_range(min..=max);
        (0..n).map(|_| random_node(rng, config, depth, count)).collect()
    };
    match kind {
        0 => Node::gt(threshold, inputs(2, max_args)),
        1 => Node::lt(threshold, inputs(2, max_args)),
        2 => Node::and(inputs(2, max_args)),
        3 => Node::or(inputs(2, max_args)),
        4 => {
            let [a]: [Node; 1] = take(inputs(1, 1));
            Node::not(a)
        }
        _ => {
            let [cond, then, else_]: [Node; 3] = take(inputs(3, 3));
            Node::ite(cond, then, else_)
        }
    }
}

fn take<const N: usize>(inputs: Vec<Node>) -> [Node; N] {
    match inputs.try_into() {
        Ok(array) => array,
        Err(inputs) => unreachable!("expected {} inputs, got {}", N, inputs.len()),
    }
}

fn random_leaf<R: Rng>(rng: &mut R, config: &GeneratorConfig) -> Node {
    let value = rng.random_bool(config.true_leaf_chance);
    if rng.random_bool(config.sleepy_chance) {
        Node::sleepy(value, rng.random_range(Duration::ZERO..=config.max_sleep))
    } else {
        Node::leaf(value)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use test_log::test;

    use super::*;
    use crate::node::NodeType;

    fn leaves(node: &Node) -> Vec<&Node> {
        if node.is_leaf() {
            vec![node]
        } else {
            node.inputs().iter().flat_map(|n| leaves(n)).collect()
        }
    }

    #[test]
    fn test_respects_depth() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let config = GeneratorConfig::default().with_max_depth(5);
        for _ in 0..20 {
            let circuit = random_circuit(&mut rng, &config);
            assert!(circuit.root().depth() <= 5);
        }
    }

    #[test]
    fn test_node_limit_is_soft() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let config = GeneratorConfig::default().with_node_limit(50);
        for _ in 0..20 {
            let circuit = random_circuit(&mut rng, &config);
            // Past the limit each remaining slot is a leaf; a single gate adds at most max_args.
            assert!(circuit.root().size() <= 50 * (config.max_args + 1));
        }
    }

    #[test]
    fn test_leaf_settings() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let config = GeneratorConfig::default()
            .with_sleepy_chance(0.0)
            .with_true_leaf_chance(1.0)
            .with_max_depth(4);
        let circuit = random_circuit(&mut rng, &config);
        for leaf in leaves(circuit.root()) {
            let leaf = leaf.as_leaf().unwrap();
            assert!(leaf.peek());
            assert_eq!(leaf.delay(), None);
        }

        let config = config
            .with_sleepy_chance(1.0)
            .with_max_sleep(Duration::from_millis(3));
        let circuit = random_circuit(&mut rng, &config);
        for leaf in leaves(circuit.root()) {
            let delay = leaf.as_leaf().unwrap().delay().unwrap();
            assert!(delay <= Duration::from_millis(3));
        }
    }

    #[test]
    fn test_long_max_sleep_is_not_truncated() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let max_sleep = Duration::from_secs(u64::MAX / 2);
        let config = GeneratorConfig::default()
            .with_sleepy_chance(1.0)
            .with_max_depth(3)
            .with_max_sleep(max_sleep);
        let circuit = random_circuit(&mut rng, &config);
        let delays: Vec<_> = leaves(circuit.root())
            .into_iter()
            .map(|leaf| leaf.as_leaf().unwrap().delay().unwrap())
            .collect();
        assert!(delays.iter().all(|&d| d <= max_sleep));
        // A delay counted in u64 milliseconds would never exceed this.
        assert!(delays.iter().any(|&d| d > Duration::from_millis(u64::MAX)));
    }

    #[test]
    fn test_zero_depth_is_a_leaf() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let config = GeneratorConfig::default().with_max_depth(0);
        let circuit = random_circuit(&mut rng, &config);
        assert_eq!(circuit.root().node_type(), NodeType::Leaf);
    }

    #[test]
    fn test_same_seed_same_circuit() {
        let config = GeneratorConfig::default().with_max_depth(6).with_max_args(4);
        let a = random_circuit(&mut ChaCha8Rng::seed_from_u64(9), &config);
        let b = random_circuit(&mut ChaCha8Rng::seed_from_u64(9), &config);
        assert_eq!(a.to_string(), b.to_string());
    }
}
