//! Deterministic simulation testing infrastructure.
//!
//! - In-memory storage with seeded fault injection
//! - Structural invariant checking
//! - A randomized put/get/reopen workload checked against an in-memory model
//!
//! Given the same seed, a run is identical.
//!
//! # Usage
//!
//! ```
//! use pagetree::simulation::{Simulator, SimulatorConfig};
//!
//! let mut sim = Simulator::new(SimulatorConfig::new(12345).with_key_range(50));
//! let result = sim.run(200).expect("run");
//!
//! assert!(result.passed());
//! ```

mod invariants;
mod simulator;
mod storage;

pub use invariants::{InvariantViolation, check_tree};
pub use simulator::{SimulationResult, Simulator, SimulatorConfig};
pub use storage::{FaultConfig, SimulatedStorage, SimulatedStorageStats};
