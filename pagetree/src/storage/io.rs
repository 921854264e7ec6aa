//! Storage abstraction over a random-access byte store.
//!
//! The B-tree only ever needs four things from its backing store: the
//! current length, positioned reads, positioned writes, and a sync. Real
//! files implement this via `FileStorage`; tests use `SimulatedStorage`,
//! which keeps bytes in memory and can inject faults.

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// Injected fault for simulation.
    InjectedFault(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InjectedFault(_) => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Abstraction over a seekable, readable, writable byte store.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `read_exact_at` returns the last bytes written at that range, and fails
///   if the range extends past `len`
/// - `write_all_at` past the current end extends the store
/// - `len` reflects the highest byte ever written
pub trait Storage {
    /// Current length of the store in bytes.
    fn len(&mut self) -> Result<u64, StorageError>;

    /// Whether the store holds no bytes at all.
    fn is_empty(&mut self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Fill `buf` with the bytes starting at `offset`.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write all of `buf` starting at `offset`.
    fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError>;

    /// Sync all pending writes to durable storage.
    fn sync(&mut self) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> Storage for &mut S {
    fn len(&mut self) -> Result<u64, StorageError> {
        (**self).len()
    }

    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        (**self).read_exact_at(offset, buf)
    }

    fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        (**self).write_all_at(offset, buf)
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        (**self).sync()
    }
}
