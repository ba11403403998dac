use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::{with_deadline, ChainSource, IndexEntry, TransactionMatcher};
use crate::error::RpcError;
use crate::models::Transaction;

/// A fetched, fully decoded block and the index entries it owes
#[derive(Debug, Clone)]
pub struct ProcessedBlock {
    pub height: u64,
    pub transaction_count: usize,
    pub entries: Vec<IndexEntry>,
}

/// Fetches one block and matches its transactions.
///
/// Nothing is written here; the scanner applies `entries` to the index so
/// the cursor only moves once every write for the block has landed.
pub struct BlockProcessor {
    source: Arc<dyn ChainSource>,
    matcher: TransactionMatcher,
    request_timeout: Duration,
}

impl BlockProcessor {
    pub fn new(source: Arc<dyn ChainSource>, matcher: TransactionMatcher, request_timeout: Duration) -> Self {
        Self {
            source,
            matcher,
            request_timeout,
        }
    }

    /// Fetch and decode block `height`.
    ///
    /// Any undecodable transaction fails the whole block; partial blocks are
    /// never handed to the index.
    pub async fn process_block(&self, height: u64) -> Result<ProcessedBlock, RpcError> {
        let block = with_deadline(self.request_timeout, self.source.block_with_transactions(height)).await?;

        let reported = block.height()?;
        if reported != height {
            return Err(RpcError::decode(format!(
                "Requested block {} but node returned block {}",
                height, reported
            )));
        }

        let transactions = block
            .transactions
            .into_iter()
            .map(|raw| raw.into_transaction(height))
            .collect::<Result<Vec<Transaction>, RpcError>>()?;

        let entries = self.matcher.match_block(&transactions);

        Ok(ProcessedBlock {
            height,
            transaction_count: transactions.len(),
            entries,
        })
    }

    pub async fn chain_head(&self) -> Result<u64, RpcError> {
        with_deadline(self.request_timeout, self.source.block_number()).await
    }
}
