//! Randomized workload harness.
//!
//! Drives a `BTree` over `SimulatedStorage` with seeded random puts and
//! gets, mirrors every write into a `std::collections::BTreeMap`, and
//! compares the two. The tree is periodically reopened from its store and
//! checked with `check_tree`.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::invariants::{InvariantViolation, check_tree};
use super::storage::SimulatedStorage;
use crate::storage::btree::{BTree, BTreeError};

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Keys are drawn from `-key_range..key_range`.
    pub key_range: i32,
    /// Probability that an operation is a `get` rather than a `put`.
    pub get_ratio: f64,
    /// Reopen the tree from its store every this many operations (0 = never).
    pub reopen_every: u64,
    /// Maximum generated value length in bytes.
    pub max_value_len: usize,
}

impl SimulatorConfig {
    /// Create a new simulator config with the given seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            seed,
            key_range: 1000,
            get_ratio: 0.3,
            reopen_every: 100,
            max_value_len: 32,
        }
    }

    /// Set the key range.
    #[must_use]
    pub const fn with_key_range(mut self, key_range: i32) -> Self {
        self.key_range = key_range;
        self
    }

    /// Set how often the tree is reopened.
    #[must_use]
    pub const fn with_reopen_every(mut self, reopen_every: u64) -> Self {
        self.reopen_every = reopen_every;
        self
    }
}

/// Results from a simulation run.
#[derive(Debug, Default)]
pub struct SimulationResult {
    /// The seed used for this simulation.
    pub seed: u64,
    /// Number of puts issued.
    pub puts: u64,
    /// Number of gets issued.
    pub gets: u64,
    /// Number of times the tree was reopened from its store.
    pub reopens: u64,
    /// Reads that disagreed with the model: (key, expected, actual).
    pub mismatches: Vec<(i32, Option<String>, Option<String>)>,
    /// Invariant violations detected.
    pub invariant_violations: Vec<InvariantViolation>,
    /// Final tree height.
    pub height: u32,
}

impl SimulationResult {
    /// Check if the simulation passed (no mismatches or violations).
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::is_empty() is not const-stable
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty() && self.invariant_violations.is_empty()
    }
}

/// The main simulator harness.
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,
    model: BTreeMap<i32, String>,
}

impl Simulator {
    /// Create a new simulator.
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            model: BTreeMap::new(),
        }
    }

    fn random_value(&mut self) -> String {
        let len = self.rng.random_range(0..=self.config.max_value_len);
        (0..len)
            .map(|_| char::from(self.rng.random_range(b'a'..=b'z')))
            .collect()
    }

    /// Run `operations` random operations.
    ///
    /// Errors only on storage or format failures, which cannot happen with
    /// a fault-free store.
    pub fn run(&mut self, operations: u64) -> Result<SimulationResult, BTreeError> {
        let mut result = SimulationResult {
            seed: self.config.seed,
            ..SimulationResult::default()
        };
        let mut tree = BTree::new(SimulatedStorage::new(self.config.seed))?;

        for op in 1..=operations {
            let key = self
                .rng
                .random_range(-self.config.key_range..self.config.key_range);

            if self.rng.random::<f64>() < self.config.get_ratio {
                result.gets += 1;
                let actual = tree.get(key)?;
                let expected = self.model.get(&key).cloned();
                if actual != expected {
                    result.mismatches.push((key, expected, actual));
                }
            } else {
                result.puts += 1;
                let value = self.random_value();
                tree.put(key, &value)?;
                self.model.insert(key, value);
            }

            if self.config.reopen_every > 0 && op % self.config.reopen_every == 0 {
                result.reopens += 1;
                tree = BTree::new(tree.into_storage())?;
                result.invariant_violations.extend(check_tree(&mut tree)?);
            }
        }

        for (&key, expected) in &self.model {
            let actual = tree.get(key)?;
            if actual.as_ref() != Some(expected) {
                result
                    .mismatches
                    .push((key, Some(expected.clone()), actual));
            }
        }
        if tree.len() as usize != self.model.len() {
            result.invariant_violations.push(InvariantViolation {
                offset: Some(tree.root_offset()),
                height: tree.height(),
                message: format!(
                    "tree holds {} keys, model holds {}",
                    tree.len(),
                    self.model.len()
                ),
            });
        }
        result.invariant_violations.extend(check_tree(&mut tree)?);
        result.height = tree.height();

        tracing::debug!(
            seed = result.seed,
            puts = result.puts,
            gets = result.gets,
            reopens = result.reopens,
            height = result.height,
            "simulation finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_passes() {
        let mut sim = Simulator::new(SimulatorConfig::new(12345));
        let result = sim.run(2000).expect("run");

        assert!(result.passed(), "failed: {result:?}");
        assert_eq!(result.puts + result.gets, 2000);
        assert_eq!(result.reopens, 20);
        assert!(result.height > 0);
    }

    #[test]
    fn test_simulation_with_dense_keys() {
        // A narrow key range exercises replacement of existing keys
        let config = SimulatorConfig::new(7).with_key_range(20).with_reopen_every(13);
        let mut sim = Simulator::new(config);
        let result = sim.run(1000).expect("run");

        assert!(result.passed(), "failed: {result:?}");
    }

    #[test]
    fn test_many_seeds() {
        for seed in 0..10 {
            let config = SimulatorConfig::new(seed).with_key_range(300);
            let mut sim = Simulator::new(config);
            let result = sim.run(500).expect("run");
            assert!(result.passed(), "seed {seed} failed: {result:?}");
        }
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let run = |seed| {
            let mut sim = Simulator::new(SimulatorConfig::new(seed));
            let result = sim.run(300).expect("run");
            (result.puts, result.gets, result.height)
        };
        assert_eq!(run(99), run(99));
    }
}
