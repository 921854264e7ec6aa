//! Simulated in-memory storage for deterministic testing.
//!
//! This module provides an in-memory implementation of the `Storage` trait
//! with support for fault injection:
//! - Read/write errors
//! - Byte-level corruption (bit flips on read)
//! - Partial writes (only a prefix of the buffer lands)
//! - Sync failures

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::{Storage, StorageError};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability of a sync error (0.0 - 1.0).
    pub sync_error_rate: f64,
    /// Probability of corruption on read (0.0 - 1.0).
    pub corruption_rate: f64,
    /// Probability of partial write (0.0 - 1.0).
    pub partial_write_rate: f64,
}

impl FaultConfig {
    /// Create a fault config with no faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Create a fault config with low fault rates (for stress testing).
    #[must_use]
    pub const fn low_faults() -> Self {
        Self {
            read_error_rate: 0.001,
            write_error_rate: 0.001,
            sync_error_rate: 0.001,
            corruption_rate: 0.001,
            partial_write_rate: 0.001,
        }
    }
}

/// Statistics about simulated storage operations.
#[derive(Debug, Default, Clone)]
pub struct SimulatedStorageStats {
    /// Number of reads.
    pub reads: u64,
    /// Number of writes.
    pub writes: u64,
    /// Number of syncs.
    pub syncs: u64,
    /// Number of injected read errors.
    pub injected_read_errors: u64,
    /// Number of injected write errors.
    pub injected_write_errors: u64,
    /// Number of injected sync errors.
    pub injected_sync_errors: u64,
    /// Number of corrupted reads returned.
    pub corrupted_reads: u64,
    /// Number of partial writes.
    pub partial_writes: u64,
}

/// In-memory storage implementation for deterministic testing.
///
/// Given the same seed and fault configuration, the same sequence of calls
/// produces the same faults.
pub struct SimulatedStorage {
    bytes: Vec<u8>,
    fault_config: FaultConfig,
    rng: StdRng,
    stats: SimulatedStorageStats,
}

impl SimulatedStorage {
    /// Create a new, empty simulated storage with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, FaultConfig::default())
    }

    /// Create a new simulated storage with custom fault configuration.
    #[must_use]
    pub fn with_config(seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            bytes: Vec::new(),
            fault_config,
            rng: StdRng::seed_from_u64(seed),
            stats: SimulatedStorageStats::default(),
        }
    }

    /// Get the current statistics.
    #[must_use]
    pub const fn stats(&self) -> &SimulatedStorageStats {
        &self.stats
    }

    /// Reset statistics.
    pub fn reset_stats(&mut self) {
        self.stats = SimulatedStorageStats::default();
    }

    /// Update the fault configuration.
    pub fn set_fault_config(&mut self, config: FaultConfig) {
        self.fault_config = config;
    }

    /// Raw contents of the store.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Check if a fault should be injected based on the given rate.
    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }

    /// Corrupt a buffer by flipping random bits.
    fn corrupt(&mut self, buf: &mut [u8]) {
        if buf.is_empty() {
            return;
        }
        let num_flips = self.rng.random_range(1..=8);
        for _ in 0..num_flips {
            let byte_offset = self.rng.random_range(0..buf.len());
            let bit = self.rng.random_range(0..8u8);
            buf[byte_offset] ^= 1 << bit;
        }
    }

    fn range(offset: u64, len: usize) -> Result<(usize, usize), StorageError> {
        let start = usize::try_from(offset).map_err(|_| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("offset {offset} does not fit in memory"),
            ))
        })?;
        let end = start.checked_add(len).ok_or_else(|| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "range overflows usize",
            ))
        })?;
        Ok((start, end))
    }
}

impl Storage for SimulatedStorage {
    fn len(&mut self) -> Result<u64, StorageError> {
        Ok(self.bytes.len() as u64)
    }

    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        self.stats.reads += 1;

        if self.should_inject_fault(self.fault_config.read_error_rate) {
            self.stats.injected_read_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated read error".to_string(),
            ));
        }

        let (start, end) = Self::range(offset, buf.len())?;
        let Some(source) = self.bytes.get(start..end) else {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {} bytes at {offset} past end of store ({} bytes)",
                    buf.len(),
                    self.bytes.len()
                ),
            )));
        };
        buf.copy_from_slice(source);

        if self.should_inject_fault(self.fault_config.corruption_rate) {
            self.stats.corrupted_reads += 1;
            self.corrupt(buf);
        }

        Ok(())
    }

    fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        self.stats.writes += 1;

        if self.should_inject_fault(self.fault_config.write_error_rate) {
            self.stats.injected_write_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated write error".to_string(),
            ));
        }

        let mut written = buf;
        if self.should_inject_fault(self.fault_config.partial_write_rate) {
            self.stats.partial_writes += 1;
            let cutoff = self.rng.random_range(0..=buf.len());
            written = &buf[..cutoff];
        }

        let (start, end) = Self::range(offset, written.len())?;
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[start..end].copy_from_slice(written);
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.stats.syncs += 1;

        if self.should_inject_fault(self.fault_config.sync_error_rate) {
            self.stats.injected_sync_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated sync error".to_string(),
            ));
        }

        // Writes are already "durable" in memory.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_storage_basic() {
        let mut storage = SimulatedStorage::new(12345);
        assert!(storage.is_empty().expect("is_empty"));

        storage.write_all_at(4, b"hello world").expect("write");
        assert_eq!(storage.len().expect("len"), 15);

        let mut buf = [0u8; 11];
        storage.read_exact_at(4, &mut buf).expect("read");
        assert_eq!(&buf, b"hello world");
        assert_eq!(&storage.as_bytes()[..4], &[0u8; 4]);
        assert_eq!(storage.stats().writes, 1);
        assert_eq!(storage.stats().reads, 1);
    }

    #[test]
    fn test_simulated_storage_overwrite_does_not_grow() {
        let mut storage = SimulatedStorage::new(1);
        storage.write_all_at(0, b"aaaa").expect("write");
        storage.write_all_at(0, b"bb").expect("overwrite");

        assert_eq!(storage.len().expect("len"), 4);
        assert_eq!(storage.as_bytes(), b"bbaa");
    }

    #[test]
    fn test_simulated_storage_read_past_end() {
        let mut storage = SimulatedStorage::new(12345);
        storage.write_all_at(0, b"abc").expect("write");

        let mut buf = [0u8; 4];
        let result = storage.read_exact_at(0, &mut buf);
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[test]
    fn test_simulated_storage_fault_injection() {
        let config = FaultConfig {
            read_error_rate: 1.0,
            ..Default::default()
        };
        let mut storage = SimulatedStorage::with_config(12345, config);
        storage.write_all_at(0, b"data").expect("write");

        let mut buf = [0u8; 4];
        let result = storage.read_exact_at(0, &mut buf);
        assert!(matches!(result, Err(StorageError::InjectedFault(_))));
        assert_eq!(storage.stats().injected_read_errors, 1);
    }

    #[test]
    fn test_simulated_storage_write_and_sync_faults() {
        let config = FaultConfig {
            write_error_rate: 1.0,
            sync_error_rate: 1.0,
            ..Default::default()
        };
        let mut storage = SimulatedStorage::with_config(7, config);

        assert!(matches!(
            storage.write_all_at(0, b"data"),
            Err(StorageError::InjectedFault(_))
        ));
        assert!(storage.is_empty().expect("is_empty"));
        assert!(matches!(storage.sync(), Err(StorageError::InjectedFault(_))));
        assert_eq!(storage.stats().injected_write_errors, 1);
        assert_eq!(storage.stats().injected_sync_errors, 1);
    }

    #[test]
    fn test_corruption_flips_bits_on_read() {
        let mut storage = SimulatedStorage::new(42);
        storage.write_all_at(0, &[0u8; 32]).expect("write");
        storage.set_fault_config(FaultConfig {
            corruption_rate: 1.0,
            ..Default::default()
        });

        let mut buf = [0u8; 32];
        storage.read_exact_at(0, &mut buf).expect("corrupted read still succeeds");
        assert_eq!(storage.stats().corrupted_reads, 1);

        // Flips can cancel out within one read, but not across several
        let mut any_changed = buf != [0u8; 32];
        for _ in 0..3 {
            let mut buf = [0u8; 32];
            storage.read_exact_at(0, &mut buf).expect("read");
            any_changed |= buf != [0u8; 32];
        }
        assert!(any_changed);
        assert_eq!(storage.stats().corrupted_reads, 4);

        // Only the returned copy is corrupted, not the stored bytes
        assert_eq!(storage.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_partial_write_keeps_only_a_prefix() {
        let config = FaultConfig {
            partial_write_rate: 1.0,
            ..Default::default()
        };
        let mut storage = SimulatedStorage::with_config(9, config);

        storage.write_all_at(0, &[0xAB; 100]).expect("partial write reports success");
        assert_eq!(storage.stats().partial_writes, 1);

        let landed = storage.as_bytes();
        assert!(landed.len() <= 100);
        assert!(landed.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_low_faults_inject_occasionally() {
        let mut storage = SimulatedStorage::new(2024);
        storage.write_all_at(0, &[7u8; 64]).expect("write");
        storage.set_fault_config(FaultConfig::low_faults());

        let failed = (0..20_000)
            .filter(|_| {
                let mut buf = [0u8; 64];
                storage.read_exact_at(0, &mut buf).is_err()
            })
            .count();

        let stats = storage.stats();
        assert_eq!(stats.reads, 20_000);
        assert_eq!(failed as u64, stats.injected_read_errors);
        assert!(failed > 0 && failed < 200, "failed reads: {failed}");
        assert!(stats.corrupted_reads > 0);
    }

    #[test]
    fn test_simulated_storage_deterministic() {
        let config = FaultConfig {
            read_error_rate: 0.5,
            ..Default::default()
        };

        let run = |config: FaultConfig| {
            let mut storage = SimulatedStorage::with_config(12345, config);
            storage.write_all_at(0, &[0u8; 64]).expect("write");
            (0..32)
                .map(|_| {
                    let mut buf = [0u8; 8];
                    storage.read_exact_at(0, &mut buf).is_ok()
                })
                .collect::<Vec<_>>()
        };

        assert_eq!(
            run(config.clone()),
            run(config),
            "Same seed should produce same fault pattern"
        );
    }
}
