// Layers, bottom up:
//  - storage: pages, the `Storage` trait and its file implementation
//  - storage::btree: node codec, tree header, and the B-tree engine
//  - simulation: in-memory fault-injecting storage, invariant checks and
//    a randomized workload used by the tests
//  - config: environment configuration for the command-line tool

pub mod config;
pub mod simulation;
pub mod storage;

pub use storage::btree::{BTree, BTreeError};
pub use storage::{FileStorage, Storage, StorageError};
