use std::sync::Arc;

use wallet_observer::api::ApiServer;
use wallet_observer::config::{AppConfig, StorageBackend};
use wallet_observer::index::{MemoryIndex, SqliteStore, TransactionStore};
use wallet_observer::logging::{init_logging, LogContext};
use wallet_observer::{Observer, RpcClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_logging(&config.logging.level, &config.logging.format)?;

    let context = LogContext::new("main", "startup")
        .with_metadata("rpc_endpoint", serde_json::json!(config.rpc.endpoint))
        .with_metadata("storage_backend", serde_json::json!(config.storage.backend));
    context.info("Starting wallet observer");

    let index: Arc<dyn TransactionStore> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryIndex::new()),
        StorageBackend::Sqlite => Arc::new(SqliteStore::new(&config.storage.database_path)?),
    };

    let client = RpcClient::new(config.rpc.endpoint.clone(), config.request_timeout())?;
    let observer = Arc::new(Observer::new(Arc::new(client), index, config.request_timeout()));

    for address in &config.scanner.subscriptions {
        observer.subscribe(address);
    }

    let scanner = Arc::new(observer.scanner(config.scanner_config()?));
    let shutdown = scanner.shutdown_handle();
    let scanner_task = Arc::clone(&scanner).spawn();

    let api_task = if config.api.enabled {
        let server = ApiServer::new(Arc::clone(&observer), &config.api.host, config.api.port);
        let stop = scanner.shutdown_handle();
        Some(tokio::spawn(async move { server.start(async move { stop.wait().await }).await }))
    } else {
        None
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => LogContext::new("main", "shutdown").info("Received shutdown signal"),
        Err(e) => LogContext::new("main", "shutdown").error(&format!("Unable to listen for shutdown signal: {}", e)),
    }
    shutdown.trigger();

    scanner_task.await?;
    if let Some(task) = api_task {
        if let Err(e) = task.await? {
            LogContext::new("main", "shutdown").error(&format!("HTTP server failed: {}", e));
        }
    }

    LogContext::new("main", "shutdown").info("Wallet observer stopped");
    Ok(())
}
