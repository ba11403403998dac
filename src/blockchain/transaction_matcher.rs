use std::sync::Arc;

use crate::models::{Address, Direction, Transaction};
use crate::subscriptions::SubscriptionRegistry;

/// One index write produced by matching a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub address: Address,
    pub direction: Direction,
    pub transaction: Transaction,
}

/// Matches transactions against the current subscription set
pub struct TransactionMatcher {
    registry: Arc<SubscriptionRegistry>,
}

impl TransactionMatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    /// Index entries owed for one transaction.
    ///
    /// A subscribed sender yields an outbound entry and a subscribed
    /// recipient an inbound one; a self-transfer yields both. Contract
    /// creation has no recipient and can only match on the sender.
    pub fn match_transaction(&self, transaction: &Transaction) -> Vec<IndexEntry> {
        let mut entries = Vec::new();

        if self.registry.contains(&transaction.from) {
            entries.push(IndexEntry {
                address: transaction.from.clone(),
                direction: Direction::Outbound,
                transaction: transaction.clone(),
            });
        }

        if let Some(to) = &transaction.to {
            if self.registry.contains(to) {
                entries.push(IndexEntry {
                    address: to.clone(),
                    direction: Direction::Inbound,
                    transaction: transaction.clone(),
                });
            }
        }

        entries
    }

    /// Entries for a whole block, in transaction order
    pub fn match_block(&self, transactions: &[Transaction]) -> Vec<IndexEntry> {
        transactions
            .iter()
            .flat_map(|tx| self.match_transaction(tx))
            .collect()
    }
}
