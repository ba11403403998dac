use log::{debug, error, info, trace, warn, LevelFilter};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::error::{ErrorSeverity, ObserverError};

/// Structured logging context for the observer
#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, Value>,
}

impl LogContext {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_block_number(self, block_number: u64) -> Self {
        self.with_metadata("block_number", json!(block_number))
    }

    pub fn with_transaction_hash(self, tx_hash: &str) -> Self {
        self.with_metadata("transaction_hash", json!(tx_hash))
    }

    pub fn with_address(self, address: &str) -> Self {
        self.with_metadata("address", json!(address))
    }

    pub fn with_duration_ms(self, duration_ms: u64) -> Self {
        self.with_metadata("duration_ms", json!(duration_ms))
    }

    pub fn with_retry_count(self, retry_count: u32) -> Self {
        self.with_metadata("retry_count", json!(retry_count))
    }

    fn format_message(&self, level: &str, message: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut log_entry = json!({
            "timestamp": timestamp,
            "level": level,
            "component": self.component,
            "operation": self.operation,
            "message": message,
        });

        for (key, value) in &self.metadata {
            log_entry[key] = value.clone();
        }

        log_entry.to_string()
    }

    pub fn info(&self, message: &str) {
        info!("{}", self.format_message("INFO", message));
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", self.format_message("WARN", message));
    }

    pub fn error(&self, message: &str) {
        error!("{}", self.format_message("ERROR", message));
    }

    pub fn debug(&self, message: &str) {
        debug!("{}", self.format_message("DEBUG", message));
    }

    pub fn trace(&self, message: &str) {
        trace!("{}", self.format_message("TRACE", message));
    }
}

/// Times a single operation and reports the duration on completion
pub struct PerformanceMonitor {
    start_time: Instant,
    operation: String,
    metadata: HashMap<String, Value>,
}

impl PerformanceMonitor {
    pub fn new(operation: &str) -> Self {
        Self {
            start_time: Instant::now(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn finish_with_result<T, E>(self, result: &Result<T, E>) -> u64
    where
        E: std::fmt::Display,
    {
        let duration = self.elapsed_ms();

        let mut context = LogContext::new("performance", &self.operation).with_duration_ms(duration);
        for (key, value) in self.metadata {
            context = context.with_metadata(&key, value);
        }

        match result {
            Ok(_) => context.trace(&format!("Operation completed in {}ms", duration)),
            Err(e) => {
                context = context.with_metadata("error", json!(e.to_string()));
                context.debug(&format!("Operation failed after {}ms: {}", duration, e));
            }
        }

        duration
    }
}

/// Error logging utilities
pub struct ErrorLogger;

impl ErrorLogger {
    pub fn log_error(error: &ObserverError, context: Option<LogContext>) {
        let severity = error.severity();

        let log_context = context
            .unwrap_or_else(|| LogContext::new("error", "unknown"))
            .with_metadata("severity", json!(format!("{:?}", severity)))
            .with_metadata("recoverable", json!(error.is_recoverable()));

        let message = format!("Error occurred: {}", error);

        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => log_context.error(&message),
            ErrorSeverity::Medium => log_context.warn(&message),
            ErrorSeverity::Low => log_context.info(&message),
        }
    }

    pub fn log_retry_attempt(operation: &str, error: &ObserverError, attempt: u32, max_attempts: u32) {
        let context = LogContext::new("retry", operation)
            .with_retry_count(attempt)
            .with_metadata("max_attempts", json!(max_attempts));

        if attempt >= max_attempts {
            context.error(&format!("Final retry attempt failed: {}", error));
        } else {
            context.warn(&format!("Retry attempt {} of {}: {}", attempt, max_attempts, error));
        }
    }
}

/// Operational metrics emitted as structured log lines
pub struct MetricsLogger;

impl MetricsLogger {
    pub fn log_rpc_call(method: &str, duration_ms: u64, success: bool) {
        let context = LogContext::new("metrics", "rpc_call")
            .with_metadata("method", json!(method))
            .with_duration_ms(duration_ms)
            .with_metadata("success", json!(success));

        if success {
            context.debug(&format!("RPC call {} completed in {}ms", method, duration_ms));
        } else {
            context.warn(&format!("RPC call {} failed after {}ms", method, duration_ms));
        }
    }

    pub fn log_block_scanned(block_number: u64, transaction_count: usize, match_count: usize, duration_ms: u64) {
        let context = LogContext::new("metrics", "block_scanned")
            .with_block_number(block_number)
            .with_metadata("transaction_count", json!(transaction_count))
            .with_metadata("match_count", json!(match_count))
            .with_duration_ms(duration_ms);

        if match_count > 0 {
            context.info(&format!("Block {} indexed with {} matches", block_number, match_count));
        } else {
            context.debug(&format!("Block {} scanned, no matches", block_number));
        }
    }

    pub fn log_scan_status(chain_head: u64, last_processed_block: u64, subscriptions: usize) {
        let lag = chain_head.saturating_sub(last_processed_block);
        let context = LogContext::new("metrics", "scan_status")
            .with_metadata("chain_head", json!(chain_head))
            .with_metadata("last_processed_block", json!(last_processed_block))
            .with_metadata("blocks_behind", json!(lag))
            .with_metadata("subscriptions", json!(subscriptions));

        if lag > 10 {
            context.warn(&format!(
                "Scanner is {} blocks behind (head: {}, processed: {})",
                lag, chain_head, last_processed_block
            ));
        } else {
            context.debug(&format!("Scanner at block {}, {} behind head", last_processed_block, lag));
        }
    }
}

/// Initialize the `env_logger` backend.
///
/// `format` is either `json` (one JSON object per line) or `pretty`.
/// `RUST_LOG`, when set, still takes precedence over `level`.
pub fn init_logging(level: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = LevelFilter::from_str(level)?;
    let json_output = format == "json";

    env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .format(move |buf, record| {
            use std::io::Write;

            let line = record.args().to_string();
            if json_output {
                if let Ok(value) = serde_json::from_str::<Value>(&line) {
                    return writeln!(buf, "{}", value);
                }
                let value = json!({
                    "timestamp": chrono::Utc::now().timestamp(),
                    "level": record.level().to_string(),
                    "target": record.target(),
                    "message": line,
                });
                writeln!(buf, "{}", value)
            } else {
                writeln!(
                    buf,
                    "{} [{}] {}: {}",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    line
                )
            }
        })
        .try_init()?;

    info!("Logging initialized at level {}", level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;

    #[test]
    fn test_log_context_with_metadata() {
        let context = LogContext::new("scanner", "scan_block")
            .with_block_number(12345)
            .with_transaction_hash("0xabc123")
            .with_address("0xdeadbeef");

        assert_eq!(context.metadata.get("block_number"), Some(&json!(12345)));
        assert_eq!(context.metadata.get("transaction_hash"), Some(&json!("0xabc123")));
        assert_eq!(context.metadata.get("address"), Some(&json!("0xdeadbeef")));
    }

    #[test]
    fn test_log_context_format_message() {
        let context = LogContext::new("test", "op").with_metadata("key", json!("value"));

        let message = context.format_message("INFO", "test message");

        let parsed: Value = serde_json::from_str(&message).expect("Should be valid JSON");
        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["component"], "test");
        assert_eq!(parsed["operation"], "op");
        assert_eq!(parsed["message"], "test message");
        assert_eq!(parsed["key"], "value");
    }

    #[test]
    fn test_performance_monitor_reports_failure() {
        let monitor = PerformanceMonitor::new("rpc_eth_blockNumber")
            .with_metadata("endpoint", json!("http://localhost"));
        let result: Result<(), RpcError> = Err(RpcError::Timeout { millis: 5 });

        let duration = monitor.finish_with_result(&result);
        assert!(duration < 1000);
    }

    #[test]
    fn test_error_and_metrics_logging_do_not_panic() {
        let error = ObserverError::Rpc(RpcError::Connection("refused".to_string()));
        ErrorLogger::log_error(&error, Some(LogContext::new("test", "error_test")));
        ErrorLogger::log_retry_attempt("head", &error, 1, 3);

        MetricsLogger::log_rpc_call("eth_getBlockByNumber", 250, true);
        MetricsLogger::log_block_scanned(100, 12, 1, 40);
        MetricsLogger::log_scan_status(120, 100, 3);
    }

    #[test]
    fn test_init_logging_rejects_unknown_level() {
        assert!(init_logging("loud", "pretty").is_err());
    }
}
