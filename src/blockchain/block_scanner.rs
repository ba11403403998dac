use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::blockchain::{BlockProcessor, ChainSource, TransactionMatcher};
use crate::error::{ObserverError, RpcError, StorageError};
use crate::index::TransactionStore;
use crate::logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
use crate::retry::{RetryConfig, RetryManager};
use crate::subscriptions::SubscriptionRegistry;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Chain head query failed: {0}")]
    Head(#[source] RpcError),
    #[error("Block {height} could not be fetched: {source}")]
    Fetch { height: u64, source: RpcError },
    #[error("Block {height} could not be indexed: {source}")]
    Storage { height: u64, source: StorageError },
    #[error("Start block could not be resolved: {0}")]
    Start(#[source] ObserverError),
    #[error("Invalid scan range {from}..={to}")]
    InvalidRange { from: u64, to: u64 },
    #[error("Invariant violation: {0}")]
    Invariant(String),
    #[error("Shutdown requested")]
    Shutdown,
}

/// Where scanning begins when no durable cursor exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBlock {
    /// Chain head at start-up; only blocks after it are scanned
    Latest,
    /// Treat this height as already processed; scanning begins one above it.
    ///
    /// `Height(0)` therefore skips block 0; use [`StartBlock::Genesis`] for a
    /// full replay.
    Height(u64),
    /// Replay from block 0; the genesis block is indexed during initialization
    Genesis,
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub poll_interval: Duration,
    /// Deadline for each node round trip
    pub request_timeout: Duration,
    pub start_block: StartBlock,
    /// Backoff used while resolving [`StartBlock::Latest`]
    pub start_retry: RetryConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            start_block: StartBlock::Latest,
            start_retry: RetryConfig::for_rpc(),
        }
    }
}

/// Highest block height fully scanned and indexed.
///
/// Only moves forward, one height at a time.
#[derive(Debug, Default)]
pub struct ScanCursor {
    last_processed: AtomicU64,
    initialized: AtomicBool,
}

impl ScanCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.last_processed.load(Ordering::Acquire)
    }

    /// `None` until the scanner has resolved its start height
    pub fn last_processed(&self) -> Option<u64> {
        self.is_initialized().then(|| self.get())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn set_start(&self, height: u64) {
        self.last_processed.store(height, Ordering::Release);
        self.initialized.store(true, Ordering::Release);
    }

    /// Advance to `height`, which must be exactly one past the current value.
    pub fn advance_to(&self, height: u64) -> Result<(), ObserverError> {
        let expected = height
            .checked_sub(1)
            .ok_or_else(|| ObserverError::Invariant("cursor cannot advance to block 0".to_string()))?;

        self.last_processed
            .compare_exchange(expected, height, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|current| {
                ObserverError::Invariant(format!(
                    "cursor at {} cannot advance to {}",
                    current, height
                ))
            })
    }
}

/// Outcome of one scan pass or backfill range
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub from_block: u64,
    pub to_block: u64,
    pub blocks_scanned: u64,
    pub matches_indexed: usize,
    /// Stopped early because shutdown was requested
    pub interrupted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanStatus {
    pub chain_head: u64,
    pub last_processed_block: Option<u64>,
    pub blocks_behind: Option<u64>,
    pub subscriptions: usize,
}

/// Polling loop that walks the chain forward and fills the index.
///
/// Cycles between an idle wait of `poll_interval` and a scan pass. A pass
/// indexes every block after the cursor up to the chain head; the first
/// block that cannot be fetched or stored ends the pass and the next cycle
/// retries it.
pub struct BlockScanner {
    processor: BlockProcessor,
    index: Arc<dyn TransactionStore>,
    registry: Arc<SubscriptionRegistry>,
    cursor: Arc<ScanCursor>,
    config: ScannerConfig,
    scanning: AtomicBool,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Requests cooperative shutdown of a running scanner
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Resolves once shutdown has been triggered
    pub async fn wait(&self) {
        wait_for_shutdown(self.tx.subscribe()).await
    }
}

impl BlockScanner {
    pub fn new(
        source: Arc<dyn ChainSource>,
        registry: Arc<SubscriptionRegistry>,
        index: Arc<dyn TransactionStore>,
        cursor: Arc<ScanCursor>,
        config: ScannerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let processor = BlockProcessor::new(
            source,
            TransactionMatcher::new(Arc::clone(&registry)),
            config.request_timeout,
        );

        Self {
            processor,
            index,
            registry,
            cursor,
            config,
            scanning: AtomicBool::new(false),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    pub fn cursor(&self) -> Arc<ScanCursor> {
        Arc::clone(&self.cursor)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Request graceful shutdown
    pub fn shutdown(&self) {
        LogContext::new("block_scanner", "shutdown").info("Requesting graceful shutdown");
        self.shutdown_tx.send_replace(true);
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Resolve the starting cursor.
    ///
    /// A cursor saved by the store wins over the configured start block.
    pub async fn initialize(&self) -> Result<u64, ScanError> {
        let context = LogContext::new("block_scanner", "initialize");

        match self.index.load_cursor() {
            Ok(Some(saved)) => {
                context
                    .with_block_number(saved)
                    .info(&format!("Resuming from last processed block: {}", saved));
                self.cursor.set_start(saved);
                return Ok(saved);
            }
            Ok(None) => {}
            Err(e) => {
                ErrorLogger::log_error(&ObserverError::Storage(e), Some(context.clone()));
            }
        }

        let start = match self.config.start_block {
            StartBlock::Height(height) => height,
            StartBlock::Latest => self.resolve_chain_head().await?,
            StartBlock::Genesis => {
                let matches = self.index_block(0).await?;
                context
                    .clone()
                    .with_block_number(0)
                    .info(&format!("Genesis block indexed with {} matches", matches));
                0
            }
        };

        if let Err(e) = self.index.save_cursor(start) {
            context.warn(&format!("Failed to persist start block {}: {}", start, e));
        }

        context
            .with_block_number(start)
            .info(&format!("Scanning blocks after {}", start));
        self.cursor.set_start(start);
        Ok(start)
    }

    async fn resolve_chain_head(&self) -> Result<u64, ScanError> {
        let retry = RetryManager::new("resolve_start_block", self.config.start_retry.clone());
        let processor = &self.processor;

        tokio::select! {
            result = retry.execute(move || async move {
                processor.chain_head().await.map_err(ObserverError::from)
            }) => result.map_err(ScanError::Start),
            _ = wait_for_shutdown(self.shutdown_rx.clone()) => Err(ScanError::Shutdown),
        }
    }

    /// One pass: index every block after the cursor up to the chain head.
    pub async fn scan_once(&self) -> Result<ScanReport, ScanError> {
        if !self.cursor.is_initialized() {
            return Err(ScanError::Invariant("scan started before initialize".to_string()));
        }

        self.scanning.store(true, Ordering::Release);
        let result = self.scan_to_head().await;
        self.scanning.store(false, Ordering::Release);
        result
    }

    async fn scan_to_head(&self) -> Result<ScanReport, ScanError> {
        let chain_head = self.processor.chain_head().await.map_err(ScanError::Head)?;

        let mut report = ScanReport {
            from_block: self.cursor.get() + 1,
            to_block: chain_head,
            ..ScanReport::default()
        };

        let mut next = report.from_block;
        while next <= chain_head {
            if self.shutdown_requested() {
                report.interrupted = true;
                break;
            }

            report.matches_indexed += self.index_block(next).await?;

            self.cursor
                .advance_to(next)
                .map_err(|e| ScanError::Invariant(e.to_string()))?;
            if let Err(e) = self.index.save_cursor(next) {
                // In-memory cursor stays authoritative
                LogContext::new("block_scanner", "save_cursor")
                    .with_block_number(next)
                    .warn(&format!("Failed to persist cursor: {}", e));
            }

            report.blocks_scanned += 1;
            next += 1;
        }

        MetricsLogger::log_scan_status(chain_head, self.cursor.get(), self.registry.len());
        Ok(report)
    }

    /// Fetch block `height` and apply its matches to the index.
    ///
    /// Returns the number of matches. The cursor is not touched.
    async fn index_block(&self, height: u64) -> Result<usize, ScanError> {
        let monitor = PerformanceMonitor::new("index_block").with_metadata("block_number", json!(height));

        let processed = self
            .processor
            .process_block(height)
            .await
            .map_err(|source| ScanError::Fetch { height, source })?;

        for entry in &processed.entries {
            self.index
                .insert(&entry.address, &entry.transaction, entry.direction)
                .map_err(|source| ScanError::Storage { height, source })?;
        }

        MetricsLogger::log_block_scanned(
            height,
            processed.transaction_count,
            processed.entries.len(),
            monitor.elapsed_ms(),
        );
        Ok(processed.entries.len())
    }

    /// Re-scan `from..=to` for the current subscription set.
    ///
    /// Leaves the cursor alone; overlapping the live scan is harmless since
    /// inserts are idempotent.
    pub async fn scan_range(&self, from: u64, to: u64) -> Result<ScanReport, ScanError> {
        if from > to {
            return Err(ScanError::InvalidRange { from, to });
        }

        LogContext::new("block_scanner", "scan_range")
            .with_metadata("from_block", json!(from))
            .with_metadata("to_block", json!(to))
            .info(&format!("Backfilling blocks {} to {}", from, to));

        let mut report = ScanReport {
            from_block: from,
            to_block: to,
            ..ScanReport::default()
        };

        for height in from..=to {
            if self.shutdown_requested() {
                report.interrupted = true;
                break;
            }
            report.matches_indexed += self.index_block(height).await?;
            report.blocks_scanned += 1;
        }

        Ok(report)
    }

    pub async fn status(&self) -> Result<ScanStatus, RpcError> {
        let chain_head = self.processor.chain_head().await?;
        Ok(ScanStatus::collect(chain_head, &self.cursor, &self.registry))
    }

    /// Whether a scan pass is in progress
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Run until shutdown is requested.
    ///
    /// Start-up and scan failures are logged and retried on the next cycle;
    /// nothing but shutdown ends the loop.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown_rx.clone();

        loop {
            match self.initialize().await {
                Ok(_) => break,
                Err(ScanError::Shutdown) => return,
                Err(e) => {
                    LogContext::new("block_scanner", "initialize")
                        .with_metadata("poll_interval_ms", json!(self.config.poll_interval.as_millis() as u64))
                        .warn(&format!("Start-up failed, retrying next cycle: {}", e));
                    if self.idle(&mut shutdown).await {
                        return;
                    }
                }
            }
        }

        LogContext::new("block_scanner", "run")
            .with_metadata("poll_interval_ms", json!(self.config.poll_interval.as_millis() as u64))
            .info("Block scanner started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.scan_once().await {
                Ok(report) if report.blocks_scanned > 0 => {
                    LogContext::new("block_scanner", "scan_once")
                        .with_block_number(self.cursor.get())
                        .debug(&format!(
                            "Scanned {} blocks with {} matches",
                            report.blocks_scanned, report.matches_indexed
                        ));
                }
                Ok(_) => {}
                Err(e) => {
                    LogContext::new("block_scanner", "scan_once")
                        .with_block_number(self.cursor.get())
                        .warn(&format!("Scan pass aborted: {}", e));
                }
            }

            if self.idle(&mut shutdown).await {
                break;
            }
        }

        LogContext::new("block_scanner", "run")
            .with_block_number(self.cursor.get())
            .info("Block scanner stopped");
    }

    /// Wait one poll interval; `true` once shutdown has been requested
    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = sleep(self.config.poll_interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return true;
                }
            }
        }
        *shutdown.borrow()
    }

    /// Run on a background task
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

impl ScanStatus {
    pub fn collect(chain_head: u64, cursor: &ScanCursor, registry: &SubscriptionRegistry) -> Self {
        let last_processed_block = cursor.last_processed();
        Self {
            chain_head,
            last_processed_block,
            blocks_behind: last_processed_block.map(|last| chain_head.saturating_sub(last)),
            subscriptions: registry.len(),
        }
    }
}
