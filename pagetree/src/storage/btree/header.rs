//! Tree header structure and serialization.
//!
//! The header occupies the first `HEADER_SIZE` bytes of the store and
//! records the tree's key count, height, and where its root page lives.

use crate::storage::btree::tree::BTreeError;
use crate::storage::io::Storage;
use crate::storage::page::PageOffset;

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Header size as u64 for offset calculations.
pub const HEADER_SIZE_U64: u64 = HEADER_SIZE as u64;

/// Header field offsets.
mod offsets {
    pub const COUNT: usize = 0;
    pub const HEIGHT: usize = 4;
    pub const ROOT_OFFSET: usize = 8;
}

/// Persistent tree state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TreeHeader {
    /// Number of distinct keys in the tree.
    pub count: u32,
    /// Number of internal levels above the leaves.
    pub height: u32,
    /// Offset of the current root page.
    pub root_offset: PageOffset,
}

impl TreeHeader {
    /// Header for a fresh tree whose root page directly follows the header.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: 0,
            height: 0,
            root_offset: HEADER_SIZE_U64,
        }
    }

    /// Serialize the header.
    pub fn to_bytes(&self) -> Result<[u8; HEADER_SIZE], HeaderError> {
        let count = i32::try_from(self.count).map_err(|_| HeaderError::OutOfRange {
            field: "count",
            value: u64::from(self.count),
        })?;
        let height = i32::try_from(self.height).map_err(|_| HeaderError::OutOfRange {
            field: "height",
            value: u64::from(self.height),
        })?;
        let root_offset =
            i64::try_from(self.root_offset).map_err(|_| HeaderError::OutOfRange {
                field: "root_offset",
                value: self.root_offset,
            })?;

        let mut buf = [0u8; HEADER_SIZE];
        buf[offsets::COUNT..offsets::HEIGHT].copy_from_slice(&count.to_be_bytes());
        buf[offsets::HEIGHT..offsets::ROOT_OFFSET].copy_from_slice(&height.to_be_bytes());
        buf[offsets::ROOT_OFFSET..].copy_from_slice(&root_offset.to_be_bytes());
        Ok(buf)
    }

    /// Deserialize a header.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self, HeaderError> {
        let mut i32_buf = [0u8; 4];
        let mut i64_buf = [0u8; 8];

        i32_buf.copy_from_slice(&bytes[offsets::COUNT..offsets::HEIGHT]);
        let raw_count = i32::from_be_bytes(i32_buf);
        let count = u32::try_from(raw_count).map_err(|_| HeaderError::NegativeCount(raw_count))?;

        i32_buf.copy_from_slice(&bytes[offsets::HEIGHT..offsets::ROOT_OFFSET]);
        let raw_height = i32::from_be_bytes(i32_buf);
        let height =
            u32::try_from(raw_height).map_err(|_| HeaderError::NegativeHeight(raw_height))?;

        i64_buf.copy_from_slice(&bytes[offsets::ROOT_OFFSET..]);
        let raw_root = i64::from_be_bytes(i64_buf);
        let root_offset = PageOffset::try_from(raw_root)
            .ok()
            .filter(|&offset| offset >= HEADER_SIZE_U64)
            .ok_or(HeaderError::InvalidRootOffset(raw_root))?;

        Ok(Self {
            count,
            height,
            root_offset,
        })
    }

    /// Read the header from the start of `storage`.
    pub fn read_from<S: Storage>(storage: &mut S) -> Result<Self, BTreeError> {
        let mut buf = [0u8; HEADER_SIZE];
        storage.read_exact_at(0, &mut buf)?;
        Ok(Self::from_bytes(&buf)?)
    }

    /// Write the header to the start of `storage`.
    pub fn write_to<S: Storage>(&self, storage: &mut S) -> Result<(), BTreeError> {
        let buf = self.to_bytes()?;
        storage.write_all_at(0, &buf)?;
        Ok(())
    }
}

impl Default for TreeHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when reading or writing the tree header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Stored count is negative.
    NegativeCount(i32),
    /// Stored height is negative.
    NegativeHeight(i32),
    /// Root offset is negative or points inside the header.
    InvalidRootOffset(i64),
    /// A field does not fit its on-disk width.
    OutOfRange { field: &'static str, value: u64 },
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegativeCount(count) => write!(f, "negative key count: {count}"),
            Self::NegativeHeight(height) => write!(f, "negative tree height: {height}"),
            Self::InvalidRootOffset(offset) => write!(f, "invalid root offset: {offset}"),
            Self::OutOfRange { field, value } => {
                write!(f, "header field {field} out of range: {value}")
            }
        }
    }
}

impl std::error::Error for HeaderError {}
