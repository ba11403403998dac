//! Per-address transaction index and its storage backends.

pub mod memory;
pub mod schema;
pub mod sqlite;


use crate::error::StorageError;
use crate::models::{Address, Direction, Transaction};

pub use memory::MemoryIndex;
pub use sqlite::SqliteStore;

/// Storage contract shared by every index backend.
///
/// Implementations must be idempotent per `(address, hash, direction)`,
/// return inbound entries before outbound ones in insertion order, and
/// never expose a half-applied insert to a concurrent reader.
pub trait TransactionStore: Send + Sync {
    /// Returns `true` when the entry was newly stored, `false` for a repeat.
    fn insert(
        &self,
        address: &Address,
        transaction: &Transaction,
        direction: Direction,
    ) -> Result<bool, StorageError>;

    /// Inbound entries followed by outbound entries; empty for unknown addresses.
    fn get(&self, address: &Address) -> Result<Vec<Transaction>, StorageError>;

    /// Every `(address, direction)` a transaction hash is indexed under
    fn lookup_hash(&self, hash: &str) -> Result<Vec<(Address, Direction)>, StorageError>;

    /// Number of addresses holding at least one entry
    fn address_count(&self) -> Result<usize, StorageError>;

    /// Last fully indexed height persisted by a previous run, if any
    fn load_cursor(&self) -> Result<Option<u64>, StorageError> {
        Ok(None)
    }

    fn save_cursor(&self, _height: u64) -> Result<(), StorageError> {
        Ok(())
    }
}
