use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::blockchain::ChainSource;
use crate::error::RpcError;
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{parse_hex_u64, Address, Transaction, Wei};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Block body as returned by `eth_getBlockByNumber(height, true)`
#[derive(Debug, Clone, Deserialize)]
pub struct RpcBlock {
    pub number: String,
    #[serde(default)]
    pub hash: Option<String>,
    pub transactions: Vec<RpcTransaction>,
}

/// Full transaction object embedded in a block body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub value: String,
    #[serde(default)]
    pub gas_price: Option<String>,
    #[serde(default)]
    pub max_fee_per_gas: Option<String>,
    #[serde(default)]
    pub gas: Option<String>,
    #[serde(default)]
    pub gas_used: Option<String>,
}

impl RpcBlock {
    pub fn height(&self) -> Result<u64, RpcError> {
        parse_hex_u64(&self.number)
            .map_err(|e| RpcError::decode(format!("Invalid block number: {}", e)))
    }
}

impl RpcTransaction {
    /// Decode wire quantities into a [`Transaction`] belonging to `block_number`.
    ///
    /// The hash is lowercased so it keys the index the same way however the
    /// node spells it.
    pub fn into_transaction(self, block_number: u64) -> Result<Transaction, RpcError> {
        let decode = |field: &str, e: crate::models::QuantityError| {
            RpcError::decode(format!("Transaction {}: invalid {}: {}", self.hash, field, e))
        };

        let value = Wei::from_hex(&self.value).map_err(|e| decode("value", e))?;
        let gas_price = match self.gas_price.as_deref().or(self.max_fee_per_gas.as_deref()) {
            Some(raw) => Wei::from_hex(raw).map_err(|e| decode("gasPrice", e))?,
            None => Wei::ZERO,
        };
        let gas_used = match self.gas_used.as_deref().or(self.gas.as_deref()) {
            Some(raw) => parse_hex_u64(raw).map_err(|e| decode("gas", e))?,
            None => 0,
        };

        Ok(Transaction {
            block_number,
            from: Address::new(&self.from),
            to: self.to.as_deref().map(Address::new),
            value,
            gas_price,
            gas_used,
            hash: self.hash.trim().to_lowercase(),
        })
    }
}

/// JSON-RPC gateway over HTTP.
///
/// Stateless apart from the correlation id counter.
#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, RpcError> {
        let context = LogContext::new("rpc_client", "initialization")
            .with_metadata("endpoint", serde_json::json!(endpoint))
            .with_metadata("timeout_ms", serde_json::json!(timeout.as_millis() as u64));
        context.info("Initializing RPC client");

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one request bounded by the client's default timeout
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        self.call_with_timeout(method, params, self.timeout).await
    }

    /// Send one request; the whole round trip is bounded by `deadline`.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Vec<Value>,
        deadline: Duration,
    ) -> Result<Value, RpcError> {
        let monitor = PerformanceMonitor::new(&format!("rpc_{}", method))
            .with_metadata("endpoint", serde_json::json!(self.endpoint));

        let result = match tokio::time::timeout(deadline, self.send(method, params)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout { millis: deadline.as_millis() as u64 }),
        };

        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_rpc_call(method, duration, result.is_ok());
        result
    }

    async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        LogContext::new("rpc_client", "send")
            .with_metadata("method", serde_json::json!(method))
            .with_metadata("id", serde_json::json!(id))
            .trace(&format!("Sending RPC request: {}", method));

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout { millis: self.timeout.as_millis() as u64 }
                } else if e.is_connect() {
                    RpcError::Connection(e.to_string())
                } else {
                    RpcError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Connection(format!(
                "HTTP error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body = response.bytes().await?;
        let rpc_response: JsonRpcResponse = serde_json::from_slice(&body)
            .map_err(|e| RpcError::decode(format!("Malformed JSON-RPC envelope: {}", e)))?;

        check_response_id(id, rpc_response.id.as_ref())?;

        if let Some(error) = rpc_response.error {
            return Err(RpcError::Method {
                code: error.code,
                message: error.message,
            });
        }

        // A missing `result` is indistinguishable from `null` for our callers.
        Ok(rpc_response.result.unwrap_or(Value::Null))
    }

    pub async fn get_block_number(&self) -> Result<u64, RpcError> {
        let result = self.call("eth_blockNumber", vec![]).await?;
        decode_block_number(&result)
    }

    pub async fn get_block(&self, block_number: u64) -> Result<RpcBlock, RpcError> {
        let params = vec![
            Value::String(format!("0x{:x}", block_number)),
            Value::Bool(true),
        ];
        let result = self.call("eth_getBlockByNumber", params).await?;
        decode_block(block_number, result)
    }

    /// Balance of `address` at the latest block (`eth_getBalance`)
    pub async fn get_balance(&self, address: &Address) -> Result<Wei, RpcError> {
        let params = vec![
            Value::String(address.to_string()),
            Value::String("latest".to_string()),
        ];
        let result = self.call("eth_getBalance", params).await?;
        decode_balance(&result)
    }
}

/// An absent or null id is accepted: each HTTP exchange carries exactly one
/// request, so the reply cannot belong to anyone else.
fn check_response_id(expected: u64, got: Option<&Value>) -> Result<(), RpcError> {
    match got {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Number(n)) if n.as_u64() == Some(expected) => Ok(()),
        Some(Value::Number(n)) => Err(RpcError::IdMismatch {
            expected,
            got: n.as_u64().unwrap_or_default(),
        }),
        Some(other) => Err(RpcError::decode(format!("Unexpected response id: {}", other))),
    }
}

pub(crate) fn decode_block_number(result: &Value) -> Result<u64, RpcError> {
    let hex_string = result
        .as_str()
        .ok_or_else(|| RpcError::decode("Block number is not a string"))?;

    parse_hex_u64(hex_string)
        .map_err(|e| RpcError::decode(format!("Failed to parse block number: {}", e)))
}

pub(crate) fn decode_balance(result: &Value) -> Result<Wei, RpcError> {
    let hex_string = result
        .as_str()
        .ok_or_else(|| RpcError::decode("Balance is not a string"))?;

    Wei::from_hex(hex_string).map_err(|e| RpcError::decode(format!("Failed to parse balance: {}", e)))
}

pub(crate) fn decode_block(block_number: u64, result: Value) -> Result<RpcBlock, RpcError> {
    if result.is_null() {
        return Err(RpcError::BlockNotFound { block_number });
    }

    serde_json::from_value(result)
        .map_err(|e| RpcError::decode(format!("Failed to parse block {}: {}", block_number, e)))
}

#[async_trait]
impl ChainSource for RpcClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.get_block_number().await
    }

    async fn block_with_transactions(&self, height: u64) -> Result<RpcBlock, RpcError> {
        self.get_block(height).await
    }

    async fn balance(&self, address: &Address) -> Result<Wei, RpcError> {
        self.get_balance(address).await
    }
}
