//! Disk-based B-tree mapping `i32` keys to string values.
//!
//! # Structure
//!
//! - Leaf nodes (height 0): entries carry a key and a value
//! - Internal nodes: entries carry a key and the offset of a child page
//!
//! A node holds at most `MAX_ENTRIES - 1` entries once an insert completes;
//! reaching `MAX_ENTRIES` splits it. When the root splits, a new root is
//! written at a fresh offset and the header is pointed at it.
//!
//! # Usage
//!
//! ```
//! use pagetree::simulation::SimulatedStorage;
//! use pagetree::storage::btree::{BTree, MAX_ENTRIES};
//!
//! let mut tree = BTree::new(SimulatedStorage::new(0)).expect("create tree");
//! for key in 0..MAX_ENTRIES as i32 {
//!     tree.put(key, "value").expect("put");
//! }
//!
//! assert_eq!(tree.height(), 1);
//! assert_eq!(tree.get(2).expect("get").as_deref(), Some("value"));
//! assert_eq!(tree.get(99).expect("get"), None);
//! ```

mod header;
mod node;
mod tree;

pub use header::{HEADER_SIZE, HEADER_SIZE_U64, HeaderError, TreeHeader};
pub use node::{Entry, MAX_ENTRIES, MAX_VALUE_SIZE, Node, NodeError};
pub use tree::{BTree, BTreeError, Insertion};
