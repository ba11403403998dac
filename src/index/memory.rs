use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{ObserverError, StorageError};
use crate::index::TransactionStore;
use crate::logging::{ErrorLogger, LogContext};
use crate::models::{Address, Direction, Transaction};

#[derive(Debug, Default)]
struct AddressRecord {
    inbound: Vec<Transaction>,
    outbound: Vec<Transaction>,
    // hash -> position in the matching sequence
    inbound_positions: HashMap<String, usize>,
    outbound_positions: HashMap<String, usize>,
}

impl AddressRecord {
    fn sequence_mut(&mut self, direction: Direction) -> (&mut Vec<Transaction>, &mut HashMap<String, usize>) {
        match direction {
            Direction::Inbound => (&mut self.inbound, &mut self.inbound_positions),
            Direction::Outbound => (&mut self.outbound, &mut self.outbound_positions),
        }
    }

    /// `Ok(true)` if appended, `Ok(false)` if already present with the same body.
    fn append(&mut self, transaction: &Transaction, direction: Direction) -> Result<bool, ObserverError> {
        let (sequence, positions) = self.sequence_mut(direction);

        if let Some(&position) = positions.get(&transaction.hash) {
            if sequence[position] != *transaction {
                return Err(ObserverError::Invariant(format!(
                    "transaction {} re-indexed as {} with a different body",
                    transaction.hash, direction
                )));
            }
            return Ok(false);
        }

        positions.insert(transaction.hash.clone(), sequence.len());
        sequence.push(transaction.clone());
        Ok(true)
    }
}

#[derive(Debug, Default)]
struct IndexState {
    records: HashMap<Address, AddressRecord>,
    by_hash: HashMap<String, Vec<(Address, Direction)>>,
}

/// Volatile in-memory index.
///
/// A single reader/writer lock guards the whole map, so a reader sees either
/// none or all of an insert. `get` hands back owned copies.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    state: RwLock<IndexState>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransactionStore for MemoryIndex {
    fn insert(
        &self,
        address: &Address,
        transaction: &Transaction,
        direction: Direction,
    ) -> Result<bool, StorageError> {
        let mut state = self.state.write();

        let appended = state
            .records
            .entry(address.clone())
            .or_default()
            .append(transaction, direction);

        match appended {
            Ok(true) => {
                state
                    .by_hash
                    .entry(transaction.hash.clone())
                    .or_default()
                    .push((address.clone(), direction));
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(violation) => {
                // The first body wins; the scan continues.
                drop(state);
                let context = LogContext::new("memory_index", "insert")
                    .with_address(address.as_str())
                    .with_transaction_hash(&transaction.hash)
                    .with_block_number(transaction.block_number);
                ErrorLogger::log_error(&violation, Some(context));
                Ok(false)
            }
        }
    }

    fn get(&self, address: &Address) -> Result<Vec<Transaction>, StorageError> {
        let state = self.state.read();

        Ok(state
            .records
            .get(address)
            .map(|record| {
                let mut all = Vec::with_capacity(record.inbound.len() + record.outbound.len());
                all.extend(record.inbound.iter().cloned());
                all.extend(record.outbound.iter().cloned());
                all
            })
            .unwrap_or_default())
    }

    fn lookup_hash(&self, hash: &str) -> Result<Vec<(Address, Direction)>, StorageError> {
        Ok(self.state.read().by_hash.get(hash).cloned().unwrap_or_default())
    }

    fn address_count(&self) -> Result<usize, StorageError> {
        Ok(self.state.read().records.len())
    }
}
