use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::{
    with_deadline, BlockScanner, ChainSource, ScanCursor, ScanError, ScanReport, ScanStatus, ScannerConfig,
};
use crate::error::{ObserverError, RpcError, StorageError};
use crate::index::TransactionStore;
use crate::logging::{ErrorLogger, LogContext};
use crate::models::{Address, Direction, Transaction, Wei};
use crate::subscriptions::SubscriptionRegistry;

/// Public face of the observer: chain head, subscriptions and lookups.
///
/// Owns the subscription registry, the index and the scan cursor; scanners
/// built with [`Observer::scanner`] share all three. Lookups read the index
/// directly and never wait on a scan pass.
pub struct Observer {
    source: Arc<dyn ChainSource>,
    registry: Arc<SubscriptionRegistry>,
    index: Arc<dyn TransactionStore>,
    cursor: Arc<ScanCursor>,
    request_timeout: Duration,
}

impl Observer {
    pub fn new(source: Arc<dyn ChainSource>, index: Arc<dyn TransactionStore>, request_timeout: Duration) -> Self {
        Self {
            source,
            registry: Arc::new(SubscriptionRegistry::new()),
            index,
            cursor: Arc::new(ScanCursor::new()),
            request_timeout,
        }
    }

    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Live chain head, independent of how far scanning has got
    pub async fn get_current_block(&self) -> Result<u64, RpcError> {
        self.get_current_block_with_timeout(self.request_timeout).await
    }

    pub async fn get_current_block_with_timeout(&self, deadline: Duration) -> Result<u64, RpcError> {
        with_deadline(deadline, self.source.block_number()).await
    }

    /// Live balance of `address` at the chain head
    pub async fn get_balance(&self, address: &str) -> Result<Wei, RpcError> {
        let address = Address::new(address);
        with_deadline(self.request_timeout, self.source.balance(&address)).await
    }

    pub fn subscribe(&self, address: &str) -> bool {
        self.registry.subscribe(address)
    }

    pub fn unsubscribe(&self, address: &str) -> bool {
        self.registry.unsubscribe(address)
    }

    pub fn is_subscribed(&self, address: &str) -> bool {
        self.registry.is_subscribed(address)
    }

    pub fn subscriptions(&self) -> Vec<Address> {
        self.registry.snapshot()
    }

    /// Indexed transactions for `address`, inbound first.
    ///
    /// Empty when nothing matched, subscribed or not. A storage failure is
    /// logged and also reads as empty; use [`Observer::try_get_transactions`]
    /// to see it.
    pub fn get_transactions(&self, address: &str) -> Vec<Transaction> {
        match self.try_get_transactions(address) {
            Ok(transactions) => transactions,
            Err(e) => {
                let context = LogContext::new("observer", "get_transactions").with_address(address);
                ErrorLogger::log_error(&ObserverError::Storage(e), Some(context));
                Vec::new()
            }
        }
    }

    pub fn try_get_transactions(&self, address: &str) -> Result<Vec<Transaction>, StorageError> {
        self.index.get(&Address::new(address))
    }

    /// Every address and direction a transaction hash was indexed under
    pub fn locate_transaction(&self, hash: &str) -> Result<Vec<(Address, Direction)>, StorageError> {
        self.index.lookup_hash(&hash.trim().to_lowercase())
    }

    /// A scanner sharing this observer's registry, index and cursor
    pub fn scanner(&self, config: ScannerConfig) -> BlockScanner {
        BlockScanner::new(
            Arc::clone(&self.source),
            Arc::clone(&self.registry),
            Arc::clone(&self.index),
            Arc::clone(&self.cursor),
            config,
        )
    }

    /// Re-scan `from..=to` for the current subscriptions.
    ///
    /// Subscribing never backfills on its own; callers that need history
    /// for a late subscription ask for it here. The scan cursor is unchanged.
    pub async fn backfill(&self, from: u64, to: u64) -> Result<ScanReport, ScanError> {
        let scanner = self.scanner(ScannerConfig {
            request_timeout: self.request_timeout,
            ..ScannerConfig::default()
        });
        scanner.scan_range(from, to).await
    }

    pub async fn status(&self) -> Result<ScanStatus, RpcError> {
        let chain_head = self.get_current_block().await?;
        Ok(ScanStatus::collect(chain_head, &self.cursor, &self.registry))
    }

    pub fn indexed_address_count(&self) -> Result<usize, StorageError> {
        self.index.address_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{RpcBlock, RpcTransaction};
    use crate::index::MemoryIndex;
    use async_trait::async_trait;

    const ALICE: &str = "0x1111111111111111111111111111111111111111";
    const BOB: &str = "0x2222222222222222222222222222222222222222";

    struct StaticChain {
        head: Result<u64, i64>,
        delay: Duration,
    }

    const BOB_BALANCE: &str = "0x1bc16d674ec80000";

    #[async_trait]
    impl ChainSource for StaticChain {
        async fn block_number(&self) -> Result<u64, RpcError> {
            tokio::time::sleep(self.delay).await;
            self.head.map_err(|code| RpcError::Method {
                code,
                message: "node busy".to_string(),
            })
        }

        async fn block_with_transactions(&self, height: u64) -> Result<RpcBlock, RpcError> {
            let transactions = if height == 2 {
                vec![RpcTransaction {
                    hash: "0xabc".to_string(),
                    from: ALICE.to_string(),
                    to: Some(BOB.to_string()),
                    value: "0x1".to_string(),
                    gas_price: None,
                    max_fee_per_gas: Some("0x2".to_string()),
                    gas: None,
                    gas_used: Some("0x5208".to_string()),
                }]
            } else {
                vec![]
            };
            Ok(RpcBlock {
                number: format!("0x{:x}", height),
                hash: None,
                transactions,
            })
        }

        async fn balance(&self, address: &Address) -> Result<Wei, RpcError> {
            tokio::time::sleep(self.delay).await;
            if address.as_str() == BOB {
                Ok(Wei::from_hex(BOB_BALANCE).unwrap())
            } else {
                Ok(Wei::ZERO)
            }
        }
    }

    fn observer(head: Result<u64, i64>, delay: Duration) -> Observer {
        Observer::new(
            Arc::new(StaticChain { head, delay }),
            Arc::new(MemoryIndex::new()),
            Duration::from_millis(100),
        )
    }

    #[test]
    fn test_get_current_block() {
        let observer = observer(Ok(6008149), Duration::ZERO);
        let height = tokio_test::block_on(observer.get_current_block()).unwrap();
        assert_eq!(height, 6008149);
    }

    #[tokio::test]
    async fn test_get_current_block_surfaces_node_error() {
        let observer = observer(Err(-32000), Duration::ZERO);
        let err = observer.get_current_block().await.unwrap_err();
        assert!(matches!(err, RpcError::Method { code: -32000, .. }));
    }

    #[tokio::test]
    async fn test_get_current_block_times_out() {
        let observer = observer(Ok(1), Duration::from_secs(5));
        let err = observer
            .get_current_block_with_timeout(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Timeout { millis: 20 }));
    }

    #[tokio::test]
    async fn test_get_balance_normalizes_address() {
        let observer = observer(Ok(1), Duration::ZERO);

        let balance = observer.get_balance(&BOB.to_uppercase().replace("0X", "0x")).await.unwrap();
        assert_eq!(balance.to_ether_string(), "2.000000000000000000");
        assert!(observer.get_balance(ALICE).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_get_balance_times_out() {
        let observer = observer(Ok(1), Duration::from_secs(5));
        let err = observer.get_balance(BOB).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout { millis: 100 }));
    }

    #[test]
    fn test_unknown_address_has_no_transactions() {
        let observer = observer(Ok(1), Duration::ZERO);
        assert!(observer.get_transactions(ALICE).is_empty());
        assert!(observer.subscribe(ALICE));
        assert!(observer.get_transactions(ALICE).is_empty());
    }

    #[tokio::test]
    async fn test_backfill_indexes_late_subscription() {
        let observer = observer(Ok(5), Duration::ZERO);
        observer.subscribe(&BOB.to_uppercase().replace("0X", "0x"));

        let report = observer.backfill(1, 3).await.unwrap();
        assert_eq!(report.matches_indexed, 1);

        let transactions = observer.get_transactions(BOB);
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].block_number, 2);
        assert_eq!(transactions[0].gas_price.to_string(), "2");

        let located = observer.locate_transaction("0xABC").unwrap();
        assert_eq!(located, vec![(Address::new(BOB), Direction::Inbound)]);
    }

    #[tokio::test]
    async fn test_status_before_scanning() {
        let observer = observer(Ok(12), Duration::ZERO);
        observer.subscribe(ALICE);

        let status = observer.status().await.unwrap();
        assert_eq!(status.chain_head, 12);
        assert_eq!(status.last_processed_block, None);
        assert_eq!(status.subscriptions, 1);
    }
}
