//! Random selection of bootstrap targets.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tern_core::{BootstrapNode, seed_nodes};

/// Number of nodes contacted per bootstrap attempt.
pub const NODES_PER_ATTEMPT: usize = 3;

/// Picks bootstrap targets as a uniform random permutation of the candidates.
#[derive(Debug, Clone)]
pub struct BootstrapSelector {
    candidates: Vec<BootstrapNode>,
    rng: StdRng,
}

impl BootstrapSelector {
    /// Selector over `candidates`, seeded from the OS.
    #[must_use]
    pub fn new(candidates: Vec<BootstrapNode>) -> Self {
        Self {
            candidates,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Selector with a deterministic seed.
    #[must_use]
    pub fn with_seed(candidates: Vec<BootstrapNode>, seed: u64) -> Self {
        Self {
            candidates,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Candidate list this selector draws from.
    #[must_use]
    pub fn candidates(&self) -> &[BootstrapNode] {
        &self.candidates
    }

    /// Draw up to [`NODES_PER_ATTEMPT`] distinct nodes in random order.
    pub fn select(&mut self) -> Vec<BootstrapNode> {
        let mut nodes = self.candidates.clone();
        nodes.shuffle(&mut self.rng);
        nodes.truncate(NODES_PER_ATTEMPT);
        nodes
    }
}

impl Default for BootstrapSelector {
    fn default() -> Self {
        Self::new(seed_nodes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use tern_core::SEED_NODES;

    fn node(index: u8) -> BootstrapNode {
        let key = SEED_NODES[0].2;
        BootstrapNode::parse(&format!("node{index}.example"), 33445, key).expect("node")
    }

    #[test]
    fn selects_three_distinct_nodes() {
        let mut selector = BootstrapSelector::with_seed((0..8).map(node).collect(), 7);
        for _ in 0..100 {
            let picked = selector.select();
            assert_eq!(picked.len(), NODES_PER_ATTEMPT);
            let hosts: HashSet<_> = picked.iter().map(|node| node.host.clone()).collect();
            assert_eq!(hosts.len(), NODES_PER_ATTEMPT);
        }
    }

    #[test]
    fn returns_all_nodes_when_fewer_than_three() {
        let mut selector = BootstrapSelector::with_seed(vec![node(1), node(2)], 1);
        let picked = selector.select();
        assert_eq!(picked.len(), 2);

        let mut empty = BootstrapSelector::with_seed(Vec::new(), 1);
        assert!(empty.select().is_empty());
    }

    #[test]
    fn permutations_are_uniform() {
        const TRIALS: usize = 6_000;
        let mut selector = BootstrapSelector::with_seed(seed_nodes(), 0x5eed);
        let mut counts: HashMap<Vec<String>, usize> = HashMap::new();
        for _ in 0..TRIALS {
            let order = selector
                .select()
                .into_iter()
                .map(|node| node.host)
                .collect::<Vec<_>>();
            *counts.entry(order).or_default() += 1;
        }

        assert_eq!(counts.len(), 6, "every permutation of three nodes appears");
        let expected = TRIALS / 6;
        for (order, count) in counts {
            let deviation = count.abs_diff(expected);
            assert!(
                deviation < expected / 7,
                "permutation {order:?} drawn {count} times, expected about {expected}"
            );
        }
    }
}
