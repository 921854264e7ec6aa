//! File-backed storage.
//!
//! This module adapts a `std::fs::File` to the `Storage` trait. The file is
//! opened (or created) by the host; the tree only seeks, reads and writes.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::storage::io::{Storage, StorageError};

/// A read/write file handle used as a B-tree backing store.
#[derive(Debug)]
pub struct FileStorage {
    file: File,
}

impl FileStorage {
    /// Wrap an already opened file.
    ///
    /// The file must be opened for both reading and writing.
    #[must_use]
    pub const fn new(file: File) -> Self {
        Self { file }
    }

    /// Open the file at `path`, creating an empty one if it does not exist.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self { file })
    }

    /// Release the underlying file handle.
    #[must_use]
    pub fn into_inner(self) -> File {
        self.file
    }
}

impl Storage for FileStorage {
    fn len(&mut self) -> Result<u64, StorageError> {
        Ok(self.file.metadata()?.len())
    }

    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.file.sync_all()?;
        Ok(())
    }
}
