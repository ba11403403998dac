use std::time::Duration;
use tokio::time::sleep;

use crate::error::ObserverError;
use crate::logging::{ErrorLogger, LogContext, PerformanceMonitor};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add up to +/-5% jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Configuration for node round trips made outside the scan loop
    pub fn for_rpc() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 2_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Retry mechanism with exponential backoff and jitter
pub struct RetryManager {
    config: RetryConfig,
    operation_name: String,
}

impl RetryManager {
    pub fn new(operation_name: &str, config: RetryConfig) -> Self {
        Self {
            config,
            operation_name: operation_name.to_string(),
        }
    }

    /// Run `operation` until it succeeds, fails with a non-recoverable
    /// error, or `max_attempts` is reached. The last error is returned.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, ObserverError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ObserverError>>,
    {
        let monitor = PerformanceMonitor::new(&format!("retry_{}", self.operation_name));
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        LogContext::new("retry", &self.operation_name)
                            .with_retry_count(attempt)
                            .with_duration_ms(monitor.elapsed_ms())
                            .info(&format!("Operation succeeded after {} attempts", attempt));
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !error.is_recoverable() {
                LogContext::new("retry", &self.operation_name)
                    .with_retry_count(attempt)
                    .with_metadata("reason", serde_json::json!("non_recoverable"))
                    .error(&format!("Non-recoverable error, aborting retries: {}", error));
                return Err(error);
            }

            ErrorLogger::log_retry_attempt(&self.operation_name, &error, attempt, max_attempts);

            if attempt >= max_attempts {
                LogContext::new("retry", &self.operation_name)
                    .with_metadata("max_attempts", serde_json::json!(max_attempts))
                    .error(&format!("All {} retry attempts failed: {}", max_attempts, error));
                return Err(error);
            }

            let delay = self.calculate_delay(attempt);
            LogContext::new("retry", &self.operation_name)
                .with_retry_count(attempt)
                .with_metadata("delay_ms", serde_json::json!(delay.as_millis() as u64))
                .info(&format!(
                    "Retrying in {}ms (attempt {} of {})",
                    delay.as_millis(),
                    attempt,
                    max_attempts
                ));

            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Calculate delay for the given attempt number
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay_ms as f64;
        let exponential_delay = base_delay * self.config.backoff_multiplier.powi(attempt as i32 - 1);

        let capped_delay = exponential_delay.min(self.config.max_delay_ms as f64);

        let final_delay = if self.config.jitter {
            let jitter_factor = 0.1;
            let jitter = capped_delay * jitter_factor * (rand::random::<f64>() - 0.5);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay / 1_000.0)
    }
}
