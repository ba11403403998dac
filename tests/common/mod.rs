#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use wiremock::{Request, Respond, ResponseTemplate};

use wallet_observer::blockchain::{ChainSource, RpcBlock, RpcTransaction};
use wallet_observer::error::RpcError;
use wallet_observer::models::{Address, Wei};

pub const ALICE: &str = "0x1111111111111111111111111111111111111111";
pub const BOB: &str = "0x2222222222222222222222222222222222222222";
pub const CAROL: &str = "0x3333333333333333333333333333333333333333";

/// Transaction body in the node's wire form
pub fn wire_tx(hash: &str, from: &str, to: Option<&str>, value: &str) -> Value {
    json!({
        "hash": hash,
        "from": from,
        "to": to,
        "value": value,
        "gasPrice": "0x6fc23ac00",
        "gas": "0x5208",
        "input": "0x",
        "nonce": "0x1"
    })
}

pub fn wire_block(height: u64, transactions: Vec<Value>) -> Value {
    json!({
        "number": format!("0x{:x}", height),
        "hash": format!("0x{:064x}", height),
        "parentHash": format!("0x{:064x}", height.saturating_sub(1)),
        "transactions": transactions,
    })
}

/// In-process chain used to drive the scanner without a node.
#[derive(Default)]
pub struct FakeChain {
    head: AtomicU64,
    blocks: Mutex<HashMap<u64, RpcBlock>>,
    failing: Mutex<HashSet<u64>>,
    fetches: Mutex<Vec<u64>>,
    unreachable: AtomicBool,
    balances: Mutex<HashMap<Address, Wei>>,
}

impl FakeChain {
    pub fn new(head: u64) -> Self {
        let chain = FakeChain::default();
        chain.set_head(head);
        chain
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Make every head query fail with a transport error
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_balance(&self, address: &str, wei: Wei) {
        self.balances.lock().insert(Address::new(address), wei);
    }

    pub fn put_block(&self, height: u64, transactions: Vec<Value>) {
        let block: RpcBlock = serde_json::from_value(wire_block(height, transactions)).expect("valid block");
        self.blocks.lock().insert(height, block);
    }

    pub fn fail_block(&self, height: u64) {
        self.failing.lock().insert(height);
    }

    pub fn heal_block(&self, height: u64) {
        self.failing.lock().remove(&height);
    }

    /// Heights requested so far, in order
    pub fn fetches(&self) -> Vec<u64> {
        self.fetches.lock().clone()
    }
}

#[async_trait]
impl ChainSource for FakeChain {
    async fn block_number(&self) -> Result<u64, RpcError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RpcError::Connection("connection refused".to_string()));
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn block_with_transactions(&self, height: u64) -> Result<RpcBlock, RpcError> {
        self.fetches.lock().push(height);
        if self.failing.lock().contains(&height) {
            return Err(RpcError::Connection("connection reset by peer".to_string()));
        }
        Ok(self.blocks.lock().get(&height).cloned().unwrap_or_else(|| RpcBlock {
            number: format!("0x{:x}", height),
            hash: None,
            transactions: Vec::<RpcTransaction>::new(),
        }))
    }

    async fn balance(&self, address: &Address) -> Result<Wei, RpcError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RpcError::Connection("connection refused".to_string()));
        }
        Ok(self.balances.lock().get(address).copied().unwrap_or(Wei::ZERO))
    }
}

/// wiremock responder that behaves like a minimal JSON-RPC node.
///
/// Echoes the request id, answers `eth_blockNumber` from `head`,
/// `eth_getBlockByNumber` from `blocks` (`null` for unknown heights) and
/// `eth_getBalance` from `balances` (`0x0` for unknown addresses).
pub struct JsonRpcNode {
    pub head: u64,
    pub blocks: HashMap<u64, Value>,
    pub balances: HashMap<String, String>,
}

impl JsonRpcNode {
    pub fn new(head: u64) -> Self {
        Self {
            head,
            blocks: HashMap::new(),
            balances: HashMap::new(),
        }
    }

    pub fn with_balance(mut self, address: &str, hex: &str) -> Self {
        self.balances.insert(address.to_lowercase(), hex.to_string());
        self
    }

    pub fn with_block(mut self, height: u64, transactions: Vec<Value>) -> Self {
        self.blocks.insert(height, wire_block(height, transactions));
        self
    }
}

impl Respond for JsonRpcNode {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        let id = body["id"].clone();

        let result = match body["method"].as_str() {
            Some("eth_blockNumber") => json!(format!("0x{:x}", self.head)),
            Some("eth_getBlockByNumber") => {
                let height = body["params"][0]
                    .as_str()
                    .and_then(|h| u64::from_str_radix(h.trim_start_matches("0x"), 16).ok());
                height
                    .and_then(|h| self.blocks.get(&h).cloned())
                    .unwrap_or(Value::Null)
            }
            Some("eth_getBalance") => {
                let address = body["params"][0].as_str().unwrap_or_default().to_lowercase();
                json!(self.balances.get(&address).cloned().unwrap_or_else(|| "0x0".to_string()))
            }
            _ => {
                return ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": "Method not found" }
                }))
            }
        };

        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result
        }))
    }
}
