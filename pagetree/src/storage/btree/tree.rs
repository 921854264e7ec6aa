//! B-tree engine.
//!
//! The tree maps `i32` keys to string values. Nodes are loaded lazily: the
//! root is read when the tree is opened, and each child the first time a
//! lookup or insert passes through it. Loaded nodes stay cached on their
//! parent entry for the lifetime of the tree.
//!
//! Every `put` rewrites the header, so a reopened store sees the latest
//! count, height and root offset. Nothing is journaled: a failure halfway
//! through a `put` can leave the store inconsistent.

use crate::storage::btree::header::{HeaderError, TreeHeader};
use crate::storage::btree::node::{Entry, MAX_VALUE_SIZE, Node, NodeError};
use crate::storage::io::{Storage, StorageError};
use crate::storage::page::PageOffset;

/// Result of inserting into a subtree.
#[derive(Debug)]
pub enum Insertion {
    /// The key already existed; its value was replaced.
    Replaced,
    /// A new key was added and the node did not split.
    Inserted,
    /// A new key was added and the node split. Holds the unsaved sibling
    /// with the upper half of the entries.
    Split(Node),
}

/// A B-tree backed by a random-access store.
pub struct BTree<S: Storage> {
    storage: S,
    root: Node,
    header: TreeHeader,
}

impl<S: Storage> BTree<S> {
    /// Open the tree stored in `storage`, or create one if it is empty.
    pub fn new(mut storage: S) -> Result<Self, BTreeError> {
        if storage.is_empty()? {
            Self::create(storage)
        } else {
            Self::open(storage)
        }
    }

    /// Initialize an empty store: header first, then an empty leaf root.
    fn create(mut storage: S) -> Result<Self, BTreeError> {
        let mut header = TreeHeader::new();
        header.write_to(&mut storage)?;

        let mut root = Node::new();
        let root_offset = root.save(&mut storage)?;
        if root_offset != header.root_offset {
            header.root_offset = root_offset;
            header.write_to(&mut storage)?;
        }

        tracing::debug!(root_offset, "created empty tree");
        Ok(Self {
            storage,
            root,
            header,
        })
    }

    /// Load the header and root page from a non-empty store.
    fn open(mut storage: S) -> Result<Self, BTreeError> {
        let header = TreeHeader::read_from(&mut storage)?;
        let root = Node::load(&mut storage, header.root_offset)?;

        tracing::debug!(
            count = header.count,
            height = header.height,
            root_offset = header.root_offset,
            "opened tree"
        );
        Ok(Self {
            storage,
            root,
            header,
        })
    }

    /// Number of distinct keys in the tree.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.header.count
    }

    /// Whether the tree holds no keys.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.header.count == 0
    }

    /// Number of internal levels above the leaves.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.header.height
    }

    /// Offset of the current root page.
    #[must_use]
    pub const fn root_offset(&self) -> PageOffset {
        self.header.root_offset
    }

    /// The in-memory root node.
    #[must_use]
    pub const fn root(&self) -> &Node {
        &self.root
    }

    /// Get a reference to the backing store.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Get mutable access to the backing store.
    pub const fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Give the backing store back to the caller.
    #[must_use]
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Sync all pending writes to the backing store.
    pub fn sync(&mut self) -> Result<(), BTreeError> {
        self.storage.sync()?;
        Ok(())
    }

    /// Split borrows of the store and the root, for walks that load nodes.
    pub const fn parts_mut(&mut self) -> (&mut S, &mut Node, TreeHeader) {
        (&mut self.storage, &mut self.root, self.header)
    }

    /// Look up the value stored for `key`.
    pub fn get(&mut self, key: i32) -> Result<Option<String>, BTreeError> {
        Self::search(&mut self.storage, &mut self.root, key, self.header.height)
    }

    /// Insert `value` under `key`, replacing any existing value.
    ///
    /// Values longer than `MAX_VALUE_SIZE` bytes are rejected before any
    /// I/O happens.
    pub fn put(&mut self, key: i32, value: &str) -> Result<(), BTreeError> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(BTreeError::InvalidArgument(format!(
                "value is {} bytes (max {MAX_VALUE_SIZE})",
                value.len()
            )));
        }

        let insertion = Self::insert(
            &mut self.storage,
            &mut self.root,
            key,
            value,
            self.header.height,
        )?;

        match insertion {
            Insertion::Replaced => {}
            Insertion::Inserted => self.header.count += 1,
            Insertion::Split(sibling) => {
                self.header.count += 1;
                self.promote_root(sibling)?;
            }
        }

        self.header.write_to(&mut self.storage)?;
        Ok(())
    }

    fn search(
        storage: &mut S,
        node: &mut Node,
        key: i32,
        height: u32,
    ) -> Result<Option<String>, BTreeError> {
        if height == 0 {
            return Ok(node.get(key).map(|entry| entry.leaf_value().to_owned()));
        }

        let index = covering_index(node, key)?;
        let child = entry_at(node, index)?.resolve(storage)?;
        Self::search(storage, child, key, height - 1)
    }

    fn insert(
        storage: &mut S,
        node: &mut Node,
        key: i32,
        value: &str,
        height: u32,
    ) -> Result<Insertion, BTreeError> {
        let (index, entry) = if height == 0 {
            match node.find_index(key) {
                Ok(index) => {
                    entry_at(node, index)?.value = Some(value.to_owned());
                    node.save(storage)?;
                    return Ok(Insertion::Replaced);
                }
                Err(index) => (index, Entry::leaf(key, value.to_owned())),
            }
        } else {
            let index = covering_index(node, key)?;

            let child = entry_at(node, index)?.resolve(storage)?;
            let mut sibling = match Self::insert(storage, child, key, value, height - 1)? {
                Insertion::Split(sibling) => sibling,
                other => return Ok(other),
            };

            // Splits are only saved by the caller, so the new entry can point
            // at a real offset.
            let sibling_offset = sibling.save(storage)?;
            let sibling_key = first_key(&sibling)?;
            (
                index + 1,
                Entry::internal(sibling_key, sibling_offset, Some(sibling)),
            )
        };

        node.insert_entry(index, entry);

        if node.is_full() {
            let sibling = node.split();
            node.save(storage)?;
            tracing::debug!(
                offset = node.offset(),
                height,
                separator = sibling.first_key(),
                "split node"
            );
            return Ok(Insertion::Split(sibling));
        }

        node.save(storage)?;
        Ok(Insertion::Inserted)
    }

    /// Grow the tree by one level after the root split.
    ///
    /// The new root is written at a fresh offset and the header is pointed
    /// at it; the old root keeps its page.
    fn promote_root(&mut self, mut sibling: Node) -> Result<(), BTreeError> {
        let old_offset = self.root.offset().ok_or_else(|| {
            BTreeError::InvalidState("cannot promote a root that was never saved".to_string())
        })?;
        let old_key = first_key(&self.root)?;

        let sibling_offset = sibling.save(&mut self.storage)?;
        let sibling_key = first_key(&sibling)?;

        let mut new_root = Node::with_entries(vec![
            Entry::internal(old_key, old_offset, None),
            Entry::internal(sibling_key, sibling_offset, Some(sibling)),
        ]);
        let new_root_offset = new_root.save(&mut self.storage)?;

        let old_root = std::mem::replace(&mut self.root, new_root);
        if let Some(entry) = self.root.entry_mut(0) {
            entry.set_child(old_root);
        }
        self.header.root_offset = new_root_offset;
        self.header.height += 1;

        tracing::debug!(
            root_offset = new_root_offset,
            height = self.header.height,
            "promoted new root"
        );
        Ok(())
    }
}

fn covering_index(node: &Node, key: i32) -> Result<usize, BTreeError> {
    node.covering_index(key).ok_or_else(|| {
        BTreeError::InvalidState(format!(
            "internal node at {:?} has no entries",
            node.offset()
        ))
    })
}

fn entry_at(node: &mut Node, index: usize) -> Result<&mut Entry, BTreeError> {
    let offset = node.offset();
    node.entry_mut(index).ok_or_else(|| {
        BTreeError::InvalidState(format!("node at {offset:?} has no entry {index}"))
    })
}

fn first_key(node: &Node) -> Result<i32, BTreeError> {
    node.first_key().ok_or_else(|| {
        BTreeError::InvalidState(format!("node at {:?} has no entries", node.offset()))
    })
}

/// Errors that can occur during B-tree operations.
#[derive(Debug)]
pub enum BTreeError {
    /// Backing store I/O error.
    Storage(StorageError),
    /// Node page could not be encoded or decoded.
    Node(NodeError),
    /// Tree header could not be encoded or decoded.
    Header(HeaderError),
    /// Caller passed an unacceptable argument.
    InvalidArgument(String),
    /// Tree structure is inconsistent; signals corruption or a bug.
    InvalidState(String),
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::Header(e) => write!(f, "header error: {e}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::Header(e) => Some(e),
            Self::InvalidArgument(_) | Self::InvalidState(_) => None,
        }
    }
}

impl From<StorageError> for BTreeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<NodeError> for BTreeError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

impl From<HeaderError> for BTreeError {
    fn from(e: HeaderError) -> Self {
        Self::Header(e)
    }
}
