//! Page buffer and constants for the storage engine.
//!
//! Every B-tree node occupies exactly one 4KB page. Integers inside a page
//! are big-endian.

/// Page size in bytes (4KB).
pub const PAGE_SIZE: usize = 4096;

/// Page size as u64 for offset calculations.
pub const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;

/// Byte offset of a page inside the backing store.
///
/// Pages are not aligned to `PAGE_SIZE`: the first page follows the tree
/// header directly.
pub type PageOffset = u64;

/// A raw page buffer.
///
/// Reads are bounds-checked and return `None` past the end of the page,
/// since page content comes from disk and may be corrupt. Writes panic on
/// out-of-bounds access; callers size their content before writing.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// Create a new zeroed page.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Box::new([0u8; PAGE_SIZE]),
        }
    }

    /// Get the raw page data.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    /// Get mutable access to the raw page data.
    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    /// Read `len` bytes at a specific offset.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        self.data.get(offset..end)
    }

    /// Write bytes at a specific offset.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Read an i32 (big-endian) at the given offset.
    #[must_use]
    pub fn read_i32(&self, offset: usize) -> Option<i32> {
        let bytes = self.read_bytes(offset, 4)?;
        Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Write an i32 (big-endian) at the given offset.
    pub fn write_i32(&mut self, offset: usize, value: i32) {
        self.write_bytes(offset, &value.to_be_bytes());
    }

    /// Read an i64 (big-endian) at the given offset.
    #[must_use]
    pub fn read_i64(&self, offset: usize) -> Option<i64> {
        let bytes = self.read_bytes(offset, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Some(i64::from_be_bytes(buf))
    }

    /// Write an i64 (big-endian) at the given offset.
    pub fn write_i64(&mut self, offset: usize, value: i64) {
        self.write_bytes(offset, &value.to_be_bytes());
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("first_16_bytes", &&self.data[..16])
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_read_write() {
        let mut page = Page::new();

        page.write_i32(100, -0x1234_5678);
        assert_eq!(page.read_i32(100), Some(-0x1234_5678));

        page.write_i64(200, 0x0102_0304_0506_0708);
        assert_eq!(page.read_i64(200), Some(0x0102_0304_0506_0708));

        page.write_bytes(500, b"hello");
        assert_eq!(page.read_bytes(500, 5), Some(b"hello".as_slice()));
    }

    #[test]
    fn test_page_is_big_endian() {
        let mut page = Page::new();
        page.write_i32(0, 1);
        assert_eq!(page.read_bytes(0, 4), Some([0u8, 0, 0, 1].as_slice()));

        page.write_i64(4, -1);
        assert_eq!(page.read_bytes(4, 8), Some([0xFFu8; 8].as_slice()));
    }

    #[test]
    fn test_page_reads_past_end() {
        let page = Page::new();
        assert_eq!(page.read_i32(PAGE_SIZE - 3), None);
        assert_eq!(page.read_i64(PAGE_SIZE - 7), None);
        assert!(page.read_bytes(PAGE_SIZE, 1).is_none());
        assert!(page.read_bytes(usize::MAX, 2).is_none());
        assert_eq!(page.read_i32(PAGE_SIZE - 4), Some(0));
    }
}
