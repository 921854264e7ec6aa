//! B-tree node and entry types, and their page serialization.
//!
//! Node page layout (big-endian, zero-padded to `PAGE_SIZE`):
//! - `entry_count`: 4 bytes (i32)
//! - `entry_count` entries, each:
//!   - `key`: 4 bytes (i32)
//!   - `value_len`: 4 bytes (i32, 0 = no value)
//!   - `value`: `value_len` bytes of UTF-8
//!   - `child_offset`: 8 bytes (i64, -1 = no child)
//!
//! Whether a node is a leaf or internal is not stored: it follows from the
//! height at which the tree reaches it.

// Entry counts and value lengths are bounded by PAGE_SIZE before encoding.
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use crate::storage::btree::tree::BTreeError;
use crate::storage::io::Storage;
use crate::storage::page::{PAGE_SIZE, Page, PageOffset};

/// Maximum number of entries a node can hold before it must split.
pub const MAX_ENTRIES: usize = 4;

/// Size of the entry count prefix.
const COUNT_SIZE: usize = 4;

/// Fixed per-entry overhead: key (4) + value length (4) + child offset (8).
const ENTRY_OVERHEAD: usize = 16;

/// Largest value (in bytes) that always fits: a page must hold `MAX_ENTRIES`
/// entries between an insert and the split that follows it.
pub const MAX_VALUE_SIZE: usize = (PAGE_SIZE - COUNT_SIZE - MAX_ENTRIES * ENTRY_OVERHEAD) / MAX_ENTRIES;

/// On-disk encoding of "no child".
const NO_CHILD: i64 = -1;

/// A single slot in a node.
///
/// Leaf entries carry a value; internal entries carry the offset of a child
/// page, plus the child itself once it has been loaded.
#[derive(Debug)]
pub struct Entry {
    pub key: i32,
    pub value: Option<String>,
    pub child_offset: Option<PageOffset>,
    child: Option<Box<Node>>,
}

impl Entry {
    /// Create a leaf entry.
    #[must_use]
    pub const fn leaf(key: i32, value: String) -> Self {
        Self {
            key,
            value: Some(value),
            child_offset: None,
            child: None,
        }
    }

    /// Create an internal entry pointing at the page at `child_offset`.
    ///
    /// `child` is the in-memory copy of that page, if the caller has one.
    #[must_use]
    pub fn internal(key: i32, child_offset: PageOffset, child: Option<Node>) -> Self {
        Self {
            key,
            value: None,
            child_offset: Some(child_offset),
            child: child.map(Box::new),
        }
    }

    /// The value of a leaf entry.
    ///
    /// The page format cannot tell an empty string from a missing value, and
    /// every leaf entry has a value, so a missing one reads as `""`.
    #[must_use]
    pub fn leaf_value(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }

    /// The cached child node, if it has been loaded.
    #[must_use]
    pub fn child(&self) -> Option<&Node> {
        self.child.as_deref()
    }

    /// Whether the child has been loaded into memory.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.child.is_some()
    }

    /// Attach an in-memory child node to this entry.
    pub fn set_child(&mut self, child: Node) {
        self.child = Some(Box::new(child));
    }

    /// Get the child node, loading it from `storage` on first access.
    pub fn resolve<S: Storage>(&mut self, storage: &mut S) -> Result<&mut Node, BTreeError> {
        let child = match &mut self.child {
            Some(child) => child,
            slot => {
                let offset = self.child_offset.ok_or_else(|| {
                    BTreeError::InvalidState(format!(
                        "entry with key {} has no child offset to load",
                        self.key
                    ))
                })?;
                slot.insert(Box::new(Node::load(storage, offset)?))
            }
        };
        Ok(&mut **child)
    }

    /// Serialized size of this entry.
    fn encoded_len(&self) -> usize {
        ENTRY_OVERHEAD + self.value.as_ref().map_or(0, String::len)
    }
}

/// A B-tree node: up to `MAX_ENTRIES` entries sorted by key.
#[derive(Debug, Default)]
pub struct Node {
    entries: Vec<Entry>,
    /// Where this node lives in the store. `None` until the first save.
    offset: Option<PageOffset>,
}

impl Node {
    /// Create a new empty node with no assigned offset.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(MAX_ENTRIES),
            offset: None,
        }
    }

    /// Create an unsaved node holding `entries`, which must be sorted.
    #[must_use]
    pub const fn with_entries(entries: Vec<Entry>) -> Self {
        Self {
            entries,
            offset: None,
        }
    }

    /// Entries in key order.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Mutable access to the entry at `index`, if there is one.
    pub fn entry_mut(&mut self, index: usize) -> Option<&mut Entry> {
        self.entries.get_mut(index)
    }

    /// Number of entries.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the node has no entries.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::is_empty() is not const-stable
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if the node has reached capacity and must split.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_ENTRIES
    }

    /// The offset assigned at first save.
    #[must_use]
    pub const fn offset(&self) -> Option<PageOffset> {
        self.offset
    }

    /// Key of the first entry.
    #[must_use]
    pub fn first_key(&self) -> Option<i32> {
        self.entries.first().map(|e| e.key)
    }

    /// Find the index of `key`, or where it would be inserted.
    pub fn find_index(&self, key: i32) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.cmp(&key))
    }

    /// Get the leaf entry for `key`.
    #[must_use]
    pub fn get(&self, key: i32) -> Option<&Entry> {
        self.find_index(key).ok().map(|i| &self.entries[i])
    }

    /// Find the entry of an internal node whose child covers `key`.
    ///
    /// That is the last entry, or the first entry whose successor's key is
    /// greater than `key`. The first entry's own key is never compared, so
    /// keys below it still route to the first child.
    #[must_use]
    pub fn covering_index(&self, key: i32) -> Option<usize> {
        let last = self.entries.len().checked_sub(1)?;
        Some(
            self.entries[1..]
                .iter()
                .position(|next| key < next.key)
                .unwrap_or(last),
        )
    }

    /// Insert an entry at `index`, shifting later entries right.
    pub fn insert_entry(&mut self, index: usize, entry: Entry) {
        self.entries.insert(index, entry);
    }

    /// Split the node, returning a new node holding the upper half.
    ///
    /// The new node has no offset; the caller saves it.
    #[must_use]
    pub fn split(&mut self) -> Self {
        let right_entries = self.entries.split_off(MAX_ENTRIES / 2);
        Self::with_entries(right_entries)
    }

    /// Serialized size of this node before padding.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        COUNT_SIZE + self.entries.iter().map(Entry::encoded_len).sum::<usize>()
    }

    /// Read a node from a page.
    ///
    /// The result has no offset and no resolved children.
    pub fn from_page(page: &Page) -> Result<Self, NodeError> {
        let raw_count = page.read_i32(0).ok_or(NodeError::Truncated { offset: 0 })?;
        let entry_count = usize::try_from(raw_count)
            .ok()
            .filter(|&n| n <= MAX_ENTRIES)
            .ok_or(NodeError::InvalidEntryCount(raw_count))?;

        let mut entries = Vec::with_capacity(MAX_ENTRIES);
        let mut offset = COUNT_SIZE;

        for _ in 0..entry_count {
            // Read key
            let key = page
                .read_i32(offset)
                .ok_or(NodeError::Truncated { offset })?;
            offset += 4;

            // Read value length
            let raw_len = page
                .read_i32(offset)
                .ok_or(NodeError::Truncated { offset })?;
            let value_len =
                usize::try_from(raw_len).map_err(|_| NodeError::InvalidValueLength(raw_len))?;
            offset += 4;

            // Read value
            let value = if value_len == 0 {
                None
            } else {
                let bytes = page
                    .read_bytes(offset, value_len)
                    .ok_or(NodeError::Truncated { offset })?;
                let value = String::from_utf8(bytes.to_vec()).map_err(NodeError::InvalidUtf8)?;
                Some(value)
            };
            offset += value_len;

            // Read child offset
            let raw_child = page
                .read_i64(offset)
                .ok_or(NodeError::Truncated { offset })?;
            let child_offset = match raw_child {
                NO_CHILD => None,
                _ => Some(
                    PageOffset::try_from(raw_child)
                        .map_err(|_| NodeError::InvalidChildOffset(raw_child))?,
                ),
            };
            offset += 8;

            entries.push(Entry {
                key,
                value,
                child_offset,
                child: None,
            });
        }

        Ok(Self {
            entries,
            offset: None,
        })
    }

    /// Write the node to a page.
    ///
    /// The page is expected to be zeroed; bytes past the node content are
    /// left untouched.
    pub fn write_to_page(&self, page: &mut Page) -> Result<(), NodeError> {
        let size = self.encoded_len();
        if size > PAGE_SIZE {
            return Err(NodeError::PageOverflow { size });
        }

        page.write_i32(0, self.entries.len() as i32);
        let mut offset = COUNT_SIZE;

        for entry in &self.entries {
            page.write_i32(offset, entry.key);
            offset += 4;

            let value = entry.value.as_deref().unwrap_or_default();
            page.write_i32(offset, value.len() as i32);
            offset += 4;
            page.write_bytes(offset, value.as_bytes());
            offset += value.len();

            let raw_child = match entry.child_offset {
                Some(child_offset) => i64::try_from(child_offset)
                    .map_err(|_| NodeError::ChildOffsetOutOfRange(child_offset))?,
                None => NO_CHILD,
            };
            page.write_i64(offset, raw_child);
            offset += 8;
        }

        Ok(())
    }

    /// Load the node stored at `offset`.
    ///
    /// The loaded node remembers `offset`, so saving it again overwrites the
    /// same page. Children are not loaded.
    pub fn load<S: Storage>(storage: &mut S, offset: PageOffset) -> Result<Self, BTreeError> {
        let mut page = Page::new();
        storage.read_exact_at(offset, page.as_bytes_mut())?;

        let mut node = Self::from_page(&page)?;
        node.offset = Some(offset);

        tracing::trace!(offset, entries = node.entries.len(), "loaded node");
        Ok(node)
    }

    /// Persist the node and return its offset.
    ///
    /// The first save appends at the current end of the store; later saves
    /// of the same node overwrite that page in place.
    pub fn save<S: Storage>(&mut self, storage: &mut S) -> Result<PageOffset, BTreeError> {
        let mut page = Page::new();
        self.write_to_page(&mut page)?;

        let offset = match self.offset {
            Some(offset) => offset,
            None => storage.len()?,
        };
        storage.write_all_at(offset, page.as_bytes())?;
        self.offset = Some(offset);

        tracing::trace!(offset, entries = self.entries.len(), "saved node");
        Ok(offset)
    }
}

/// Errors that can occur when decoding or encoding B-tree nodes.
#[derive(Debug)]
pub enum NodeError {
    /// A field extends past the end of the page.
    Truncated { offset: usize },
    /// Entry count is negative or above `MAX_ENTRIES`.
    InvalidEntryCount(i32),
    /// Negative value length.
    InvalidValueLength(i32),
    /// Value bytes are not UTF-8.
    InvalidUtf8(std::string::FromUtf8Error),
    /// Negative child offset other than the "no child" marker.
    InvalidChildOffset(i64),
    /// Child offset does not fit the on-disk i64.
    ChildOffsetOutOfRange(PageOffset),
    /// Encoded node does not fit in a page.
    PageOverflow { size: usize },
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { offset } => {
                write!(f, "node truncated: field at byte {offset} runs past the page")
            }
            Self::InvalidEntryCount(count) => {
                write!(f, "invalid entry count: {count} (max {MAX_ENTRIES})")
            }
            Self::InvalidValueLength(len) => write!(f, "invalid value length: {len}"),
            Self::InvalidUtf8(e) => write!(f, "value is not valid UTF-8: {e}"),
            Self::InvalidChildOffset(offset) => write!(f, "invalid child offset: {offset}"),
            Self::ChildOffsetOutOfRange(offset) => {
                write!(f, "child offset {offset} does not fit in 64 signed bits")
            }
            Self::PageOverflow { size } => {
                write!(f, "node needs {size} bytes (page size {PAGE_SIZE})")
            }
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidUtf8(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulatedStorage;

    fn leaf_with_keys(keys: &[i32]) -> Node {
        let entries = keys
            .iter()
            .map(|&k| Entry::leaf(k, format!("value{k}")))
            .collect();
        Node::with_entries(entries)
    }

    #[test]
    fn test_page_layout_is_big_endian() {
        let node = Node::with_entries(vec![Entry::leaf(7, "ab".to_string())]);
        let mut page = Page::new();
        node.write_to_page(&mut page).expect("write");

        let expected: &[u8] = &[
            0, 0, 0, 1, // entry count
            0, 0, 0, 7, // key
            0, 0, 0, 2, // value length
            b'a', b'b', // value
            0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // no child
        ];
        assert_eq!(page.read_bytes(0, expected.len()), Some(expected));
        assert!(page.as_bytes()[expected.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_leaf_node_roundtrip() {
        let node = leaf_with_keys(&[-5, 1, 300]);
        let mut page = Page::new();
        node.write_to_page(&mut page).expect("write");

        let restored = Node::from_page(&page).expect("should parse");
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.get(-5).map(Entry::leaf_value), Some("value-5"));
        assert_eq!(restored.get(300).map(Entry::leaf_value), Some("value300"));
        assert!(restored.entries().iter().all(|e| e.child_offset.is_none()));
        assert_eq!(restored.offset(), None);
    }

    #[test]
    fn test_internal_node_roundtrip() {
        let node = Node::with_entries(vec![
            Entry::internal(1, 16, None),
            Entry::internal(10, 4112, None),
        ]);
        let mut page = Page::new();
        node.write_to_page(&mut page).expect("write");

        let restored = Node::from_page(&page).expect("should parse");
        assert_eq!(restored.entries()[0].child_offset, Some(16));
        assert_eq!(restored.entries()[1].child_offset, Some(4112));
        assert!(restored.entries().iter().all(|e| e.value.is_none()));
        assert!(restored.entries().iter().all(|e| !e.is_resolved()));
    }

    #[test]
    fn test_empty_value_reads_back_as_empty_string() {
        let node = Node::with_entries(vec![Entry::leaf(1, String::new())]);
        let mut page = Page::new();
        node.write_to_page(&mut page).expect("write");

        let restored = Node::from_page(&page).expect("should parse");
        assert!(restored.entries()[0].value.is_none());
        assert_eq!(restored.entries()[0].leaf_value(), "");
    }

    #[test]
    fn test_find_index() {
        let node = leaf_with_keys(&[10, 20, 30]);
        assert_eq!(node.find_index(20), Ok(1));
        assert_eq!(node.find_index(5), Err(0));
        assert_eq!(node.find_index(25), Err(2));
        assert_eq!(node.find_index(35), Err(3));
    }

    #[test]
    fn test_covering_index() {
        let node = Node::with_entries(vec![
            Entry::internal(10, 100, None),
            Entry::internal(20, 200, None),
            Entry::internal(30, 300, None),
        ]);

        // Below the first key still routes to the first child
        assert_eq!(node.covering_index(5), Some(0));
        assert_eq!(node.covering_index(10), Some(0));
        assert_eq!(node.covering_index(19), Some(0));
        // Equal to a separator goes right
        assert_eq!(node.covering_index(20), Some(1));
        assert_eq!(node.covering_index(29), Some(1));
        // Last range is open-ended
        assert_eq!(node.covering_index(30), Some(2));
        assert_eq!(node.covering_index(i32::MAX), Some(2));

        assert_eq!(Node::new().covering_index(1), None);
    }

    #[test]
    fn test_entry_mut_out_of_range_is_none() {
        let mut node = leaf_with_keys(&[1, 2]);
        node.entry_mut(1).expect("second entry").value = Some("changed".to_string());
        assert_eq!(node.entries()[1].leaf_value(), "changed");
        assert!(node.entry_mut(2).is_none());
        assert!(Node::new().entry_mut(0).is_none());
    }

    #[test]
    fn test_split_moves_upper_half() {
        let mut node = leaf_with_keys(&[1, 2, 3, 4]);
        assert!(node.is_full());

        let right = node.split();
        assert_eq!(node.len(), MAX_ENTRIES / 2);
        assert_eq!(right.len(), MAX_ENTRIES / 2);
        assert_eq!(node.first_key(), Some(1));
        assert_eq!(right.first_key(), Some(3));
        assert_eq!(right.offset(), None);
    }

    #[test]
    fn test_invalid_entry_count() {
        let mut page = Page::new();
        page.write_i32(0, 5);
        assert!(matches!(
            Node::from_page(&page),
            Err(NodeError::InvalidEntryCount(5))
        ));

        page.write_i32(0, -1);
        assert!(matches!(
            Node::from_page(&page),
            Err(NodeError::InvalidEntryCount(-1))
        ));
    }

    #[test]
    fn test_value_past_end_of_page() {
        let mut page = Page::new();
        page.write_i32(0, 1);
        page.write_i32(4, 1);
        page.write_i32(8, 5000);
        assert!(matches!(
            Node::from_page(&page),
            Err(NodeError::Truncated { offset: 12 })
        ));
    }

    #[test]
    fn test_invalid_child_offset() {
        let mut page = Page::new();
        page.write_i32(0, 1);
        page.write_i32(4, 1);
        page.write_i32(8, 0);
        page.write_i64(12, -7);
        assert!(matches!(
            Node::from_page(&page),
            Err(NodeError::InvalidChildOffset(-7))
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut page = Page::new();
        page.write_i32(0, 1);
        page.write_i32(4, 1);
        page.write_i32(8, 2);
        page.write_bytes(12, &[0xC3, 0x28]);
        page.write_i64(14, -1);
        assert!(matches!(
            Node::from_page(&page),
            Err(NodeError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_full_node_of_max_values_fits() {
        let value = "x".repeat(MAX_VALUE_SIZE);
        let node = Node::with_entries(
            (0..MAX_ENTRIES as i32)
                .map(|k| Entry::leaf(k, value.clone()))
                .collect(),
        );
        assert!(node.encoded_len() <= PAGE_SIZE);

        let mut page = Page::new();
        node.write_to_page(&mut page).expect("max values should fit");
    }

    #[test]
    fn test_oversized_node_is_rejected() {
        let node = Node::with_entries(vec![Entry::leaf(1, "x".repeat(PAGE_SIZE))]);
        let mut page = Page::new();
        assert!(matches!(
            node.write_to_page(&mut page),
            Err(NodeError::PageOverflow { .. })
        ));
    }

    #[test]
    fn test_save_appends_then_overwrites() {
        let mut storage = SimulatedStorage::new(1);
        storage.write_all_at(0, &[0u8; 16]).expect("reserve header");

        let mut node = leaf_with_keys(&[1]);
        let offset = node.save(&mut storage).expect("first save");
        assert_eq!(offset, 16);
        assert_eq!(node.offset(), Some(16));
        let len_after_first = storage.len().expect("len");
        assert_eq!(len_after_first, 16 + PAGE_SIZE as u64);

        node.insert_entry(1, Entry::leaf(2, "two".to_string()));
        let second = node.save(&mut storage).expect("second save");
        assert_eq!(second, offset);
        assert_eq!(storage.len().expect("len"), len_after_first);

        let loaded = Node::load(&mut storage, offset).expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.offset(), Some(offset));

        let mut other = leaf_with_keys(&[3]);
        assert_eq!(other.save(&mut storage).expect("save other"), len_after_first);
    }

    #[test]
    fn test_load_truncated_page_is_io_error() {
        let mut storage = SimulatedStorage::new(1);
        storage.write_all_at(0, &[0u8; 100]).expect("write");

        let result = Node::load(&mut storage, 0);
        assert!(matches!(result, Err(BTreeError::Storage(_))));
    }

    #[test]
    fn test_resolve_loads_once() {
        let mut storage = SimulatedStorage::new(1);
        let mut child = leaf_with_keys(&[1, 2]);
        let child_offset = child.save(&mut storage).expect("save child");

        let mut entry = Entry::internal(1, child_offset, None);
        assert!(!entry.is_resolved());

        let reads_before = storage.stats().reads;
        let resolved = entry.resolve(&mut storage).expect("resolve");
        assert_eq!(resolved.len(), 2);
        assert_eq!(storage.stats().reads, reads_before + 1);

        entry.resolve(&mut storage).expect("resolve cached");
        assert_eq!(storage.stats().reads, reads_before + 1);
        assert!(entry.is_resolved());
    }

    #[test]
    fn test_resolve_without_offset_is_invalid_state() {
        let mut storage = SimulatedStorage::new(1);
        let mut entry = Entry::leaf(1, "v".to_string());
        assert!(matches!(
            entry.resolve(&mut storage),
            Err(BTreeError::InvalidState(_))
        ));
    }
}
