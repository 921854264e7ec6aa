//! Single-file storage for the B-tree.
//!
//! # File Format
//!
//! All integers are big-endian.
//!
//! - Bytes 0-15: tree header (key count, height, root page offset)
//! - Bytes 16..: 4KB node pages, appended in allocation order
//!
//! Pages are never freed or reused, so the file only grows.
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//!
//! use pagetree::storage::FileStorage;
//! use pagetree::storage::btree::BTree;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = FileStorage::open(Path::new("names.bin"))?;
//! let mut tree = BTree::new(storage)?;
//!
//! tree.put(10, "Rafael")?;
//! assert_eq!(tree.get(10)?.as_deref(), Some("Rafael"));
//!
//! tree.sync()?;
//! # Ok(())
//! # }
//! ```

pub mod btree;
mod file;
mod io;
mod page;

pub use file::FileStorage;
pub use io::{Storage, StorageError};
pub use page::{PAGE_SIZE, PAGE_SIZE_U64, Page, PageOffset};
