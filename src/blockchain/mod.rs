pub mod rpc_client;
pub mod transaction_matcher;
pub mod block_processor;
pub mod block_scanner;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::error::RpcError;
use crate::models::{Address, Wei};

pub use rpc_client::{RpcBlock, RpcClient, RpcTransaction};
pub use transaction_matcher::{IndexEntry, TransactionMatcher};
pub use block_processor::{BlockProcessor, ProcessedBlock};
pub use block_scanner::{
    BlockScanner, ScanCursor, ScanError, ScanReport, ScanStatus, ScannerConfig, ShutdownHandle, StartBlock,
};

/// The node queries the observer depends on.
///
/// [`RpcClient`] is the production implementation; anything that can answer
/// these (a fake in tests, a cached proxy) can drive the scanner.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Current chain head height (`eth_blockNumber`)
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Block at `height` with full transaction bodies (`eth_getBlockByNumber`)
    async fn block_with_transactions(&self, height: u64) -> Result<RpcBlock, RpcError>;

    /// Balance of `address` at the latest block (`eth_getBalance`).
    ///
    /// Sources that cannot answer report the node's method-not-found error.
    async fn balance(&self, _address: &Address) -> Result<Wei, RpcError> {
        Err(RpcError::Method {
            code: -32601,
            message: "eth_getBalance is not supported by this source".to_string(),
        })
    }
}

/// Bound a single round trip by `deadline`; expiry is a transport failure.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, RpcError>
where
    F: Future<Output = Result<T, RpcError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(RpcError::Timeout { millis: deadline.as_millis() as u64 }),
    }
}
