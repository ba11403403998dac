use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get},
    Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::blockchain::ScanStatus;
use crate::error::{RpcError, RpcErrorKind, StorageError};
use crate::logging::LogContext;
use crate::models::{validate_address, Address, Direction, Transaction, Wei};
use crate::observer::Observer;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Node error: {0}")]
    Node(#[from] RpcError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Server error: {0}")]
    Server(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            ApiError::Node(_) => StatusCode::BAD_GATEWAY,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidAddress(_) => "invalid_address",
            ApiError::Node(e) => match e.kind() {
                RpcErrorKind::Transport => "transport_error",
                RpcErrorKind::Node => "node_error",
                RpcErrorKind::Decode => "decode_error",
            },
            ApiError::Storage(_) => "storage_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::Server(_) => "server_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            LogContext::new("http", "response")
                .with_metadata("status", serde_json::json!(status.as_u16()))
                .error(&self.to_string());
        }

        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CurrentBlockResponse {
    pub block_number: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub address: Address,
    /// Hex, as the node reports it
    pub wei: Wei,
    /// Exact decimal with 18 places
    pub ether: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub address: Address,
    /// `false` when the address was already subscribed
    pub created: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionsResponse {
    pub addresses: Vec<Address>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub address: Address,
    pub count: usize,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexLocation {
    pub address: Address,
    pub direction: Direction,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub scan: ScanStatus,
    pub indexed_addresses: usize,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub observer: Arc<Observer>,
}

/// Build the route table
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/block/current", get(get_current_block))
        .route("/balance/:address", get(get_balance))
        .route("/subscriptions", get(list_subscriptions).post(subscribe))
        .route("/subscriptions/:address", delete(unsubscribe))
        .route("/transactions/:address", get(get_transactions))
        .route("/tx/:hash", get(locate_transaction))
        .route("/status", get(get_status))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// HTTP API server
pub struct ApiServer {
    observer: Arc<Observer>,
    pub host: String,
    pub port: u16,
}

impl ApiServer {
    pub fn new(observer: Arc<Observer>, host: &str, port: u16) -> Self {
        Self {
            observer,
            host: host.to_string(),
            port,
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(&self, shutdown: F) -> Result<(), ApiError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(AppState {
            observer: Arc::clone(&self.observer),
        });

        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApiError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

        LogContext::new("http", "start")
            .with_metadata("addr", serde_json::json!(addr))
            .info(&format!("HTTP API server listening on {}", addr));

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ApiError::Server(format!("Server error: {}", e)))?;

        Ok(())
    }
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    validate_address(raw).map_err(|e| ApiError::InvalidAddress(format!("{}: {}", raw, e)))
}

/// GET /block/current - live chain head from the node
pub async fn get_current_block(State(state): State<AppState>) -> Result<Json<CurrentBlockResponse>, ApiError> {
    let block_number = state.observer.get_current_block().await?;
    Ok(Json(CurrentBlockResponse { block_number }))
}

/// GET /balance/:address - live balance from the node
pub async fn get_balance(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let address = parse_address(&raw)?;
    let wei = state.observer.get_balance(address.as_str()).await?;

    Ok(Json(BalanceResponse {
        ether: wei.to_ether_string(),
        address,
        wei,
    }))
}

/// GET /subscriptions
pub async fn list_subscriptions(State(state): State<AppState>) -> Json<SubscriptionsResponse> {
    Json(SubscriptionsResponse {
        addresses: state.observer.subscriptions(),
    })
}

/// POST /subscriptions - 201 when newly added, 200 when already present
pub async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), ApiError> {
    let address = parse_address(&request.address)?;
    let created = state.observer.subscribe(address.as_str());

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(SubscriptionResponse { address, created })))
}

/// DELETE /subscriptions/:address
pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<StatusCode, ApiError> {
    let address = parse_address(&raw)?;
    if state.observer.unsubscribe(address.as_str()) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("{} is not subscribed", address)))
    }
}

/// GET /transactions/:address - inbound entries first, then outbound
pub async fn get_transactions(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let address = parse_address(&raw)?;
    let transactions = state.observer.try_get_transactions(address.as_str())?;

    Ok(Json(TransactionsResponse {
        address,
        count: transactions.len(),
        transactions,
    }))
}

/// GET /tx/:hash - where a transaction hash is indexed
pub async fn locate_transaction(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<Vec<IndexLocation>>, ApiError> {
    let locations = state.observer.locate_transaction(&hash)?;
    if locations.is_empty() {
        return Err(ApiError::NotFound(format!("transaction {} is not indexed", hash)));
    }

    Ok(Json(
        locations
            .into_iter()
            .map(|(address, direction)| IndexLocation { address, direction })
            .collect(),
    ))
}

/// GET /status - scan progress against the live chain head
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let scan = state.observer.status().await?;
    let indexed_addresses = state.observer.indexed_address_count()?;

    let status = match scan.blocks_behind {
        Some(lag) if lag <= 10 => "healthy",
        Some(_) => "lagging",
        None => "starting",
    };

    Ok(Json(StatusResponse {
        status,
        scan,
        indexed_addresses,
    }))
}
