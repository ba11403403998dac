use parking_lot::RwLock;
use std::collections::HashSet;

use crate::logging::LogContext;
use crate::models::Address;

/// Set of addresses the scanner matches transactions against.
///
/// Reads (`is_subscribed`) take a shared lock and run concurrently with
/// each other; `subscribe`/`unsubscribe` take the exclusive lock briefly.
/// Independent of the transaction index lock.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    addresses: RwLock<HashSet<Address>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the address was not already subscribed.
    pub fn subscribe(&self, address: &str) -> bool {
        let address = Address::new(address);
        let added = self.addresses.write().insert(address.clone());

        if added {
            LogContext::new("subscriptions", "subscribe")
                .with_address(address.as_str())
                .info("Address subscribed");
        }
        added
    }

    pub fn is_subscribed(&self, address: &str) -> bool {
        self.contains(&Address::new(address))
    }

    /// Membership test for an already-normalized address; avoids re-normalizing on the scan path.
    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.read().contains(address)
    }

    /// Returns whether the address was present.
    ///
    /// Entries already indexed for the address are kept. A scan pass that
    /// tested membership before the removal may still index one more block
    /// for it.
    pub fn unsubscribe(&self, address: &str) -> bool {
        let address = Address::new(address);
        let removed = self.addresses.write().remove(&address);

        if removed {
            LogContext::new("subscriptions", "unsubscribe")
                .with_address(address.as_str())
                .info("Address unsubscribed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.addresses.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.read().is_empty()
    }

    /// Sorted copy of the current subscription set
    pub fn snapshot(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.addresses.read().iter().cloned().collect();
        addresses.sort();
        addresses
    }
}
