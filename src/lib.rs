pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod models;
pub mod observer;
pub mod retry;
pub mod subscriptions;

pub use blockchain::{BlockScanner, ChainSource, RpcClient, ScanCursor, ScannerConfig, StartBlock};
pub use config::{ApiConfig, AppConfig, LoggingConfig, RpcConfig, ScannerSettings, StorageBackend, StorageConfig};
pub use error::{ObserverError, Result, RpcError, RpcErrorKind, StorageError};
pub use index::{MemoryIndex, SqliteStore, TransactionStore};
pub use logging::{init_logging, ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
pub use models::{Address, Direction, Transaction, Wei};
pub use observer::Observer;
pub use retry::{RetryConfig, RetryManager};
pub use subscriptions::SubscriptionRegistry;
