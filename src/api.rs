//! HTTP API
//!
//! REST surface over the builder, gateway, query service, and faucet:
//!
//! - `POST /api/tx/create-transfer` - build an unsigned create
//! - `POST /api/tx/claim-transfer`  - build an unsigned claim
//! - `POST /api/tx/cancel-transfer` - build an unsigned cancel
//! - `POST /api/tx/submit`          - submit a signed transaction
//! - `GET  /api/transfers?wallet=`  - transfers for a wallet (or recent)
//! - `GET  /api/transfers/:address` - one transfer by derived address
//! - `GET  /api/tokens`             - known tokens
//! - `GET  /api/stats`              - mirror statistics
//! - `GET  /api/health`             - liveness
//! - `POST /api/faucet`             - devnet funding (when enabled)
//!
//! Responses use a uniform `{ ok, data | error, message }` envelope with the
//! stable error codes of the error taxonomy.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::builder::{BuildError, BuiltTransaction, CreateTransferRequest, TxBuilder};
use crate::faucet::{Faucet, FaucetError};
use crate::gateway::{SubmissionGateway, SubmitError};
use crate::query::QueryService;

/// Shared API state
pub struct ApiState {
    pub builder: Arc<TxBuilder>,
    pub gateway: Arc<SubmissionGateway>,
    pub query: Arc<QueryService>,
    pub faucet: Option<Arc<Faucet>>,
}

pub type SharedApiState = Arc<ApiState>;

/// Build the application router
pub fn create_router(state: SharedApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/tx/create-transfer", post(handle_create_transfer))
        .route("/api/tx/claim-transfer", post(handle_claim_transfer))
        .route("/api/tx/cancel-transfer", post(handle_cancel_transfer))
        .route("/api/tx/submit", post(handle_submit))
        .route("/api/transfers", get(handle_list_transfers))
        .route("/api/transfers/:address", get(handle_get_transfer))
        .route("/api/tokens", get(handle_list_tokens))
        .route("/api/stats", get(handle_stats))
        .route("/api/health", get(handle_health))
        .route("/api/faucet", post(handle_faucet))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Envelope
// ============================================================================

fn ok<T: Serialize>(data: T) -> Response {
    Json(serde_json::json!({ "ok": true, "data": data })).into_response()
}

fn fail(status: StatusCode, code: &str, message: impl ToString) -> Response {
    (
        status,
        Json(serde_json::json!({
            "ok": false,
            "error": code,
            "message": message.to_string(),
        })),
    )
        .into_response()
}

fn build_error_response(e: BuildError) -> Response {
    let status = match &e {
        BuildError::PoolNotFound
        | BuildError::TokenNotFound
        | BuildError::NoActivePool
        | BuildError::TransferNotFound(_) => StatusCode::NOT_FOUND,
        BuildError::InvalidAmount | BuildError::MemoTooLong(_) | BuildError::InvalidAddress(_) => {
            StatusCode::BAD_REQUEST
        }
        BuildError::Ledger(_) | BuildError::Store(_) => StatusCode::BAD_GATEWAY,
    };
    fail(status, e.error_code(), e)
}

fn submit_error_response(e: SubmitError) -> Response {
    let status = match &e {
        SubmitError::Malformed(_) | SubmitError::Failed(_) => StatusCode::BAD_REQUEST,
        SubmitError::ConfirmationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        SubmitError::Ledger(_) => StatusCode::BAD_GATEWAY,
    };
    fail(status, e.error_code(), e)
}

fn parse_pubkey(value: &str, field: &str) -> Result<Pubkey, Response> {
    if value.is_empty() {
        return Err(fail(
            StatusCode::BAD_REQUEST,
            "MISSING_FIELD",
            format!("{} is required", field),
        ));
    }
    Pubkey::from_str(value).map_err(|_| {
        fail(
            StatusCode::BAD_REQUEST,
            "INVALID_PUBKEY",
            format!("{} is not a valid public key", field),
        )
    })
}

// ============================================================================
// Transaction endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTransferBody {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    pub pool_address: Option<String>,
    pub mint: Option<String>,
    pub token: Option<String>,
    pub memo: Option<String>,
    #[serde(default)]
    pub claimable_after: i64,
    #[serde(default)]
    pub claimable_until: i64,
}

#[derive(Debug, Serialize)]
struct BuiltTransactionBody {
    transaction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    transfer_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<u64>,
    message: &'static str,
}

impl From<BuiltTransaction> for BuiltTransactionBody {
    fn from(built: BuiltTransaction) -> Self {
        Self {
            transaction: built.transaction,
            transfer_address: built.transfer_address,
            nonce: built.nonce,
            message: "Sign and submit via POST /api/tx/submit",
        }
    }
}

async fn handle_create_transfer(
    State(state): State<SharedApiState>,
    Json(body): Json<CreateTransferBody>,
) -> Response {
    let sender = match parse_pubkey(&body.sender, "sender") {
        Ok(key) => key,
        Err(response) => return response,
    };
    let recipient = match parse_pubkey(&body.recipient, "recipient") {
        Ok(key) => key,
        Err(response) => return response,
    };
    let pool_address = match &body.pool_address {
        Some(value) => match parse_pubkey(value, "pool_address") {
            Ok(key) => Some(key),
            Err(response) => return response,
        },
        None => None,
    };

    if pool_address.is_none() && body.mint.is_none() && body.token.is_none() {
        return fail(
            StatusCode::BAD_REQUEST,
            "MISSING_FIELD",
            "provide pool_address, mint, or token",
        );
    }

    let request = CreateTransferRequest {
        sender,
        recipient,
        amount: body.amount,
        pool_address,
        mint: body.mint,
        token_symbol: body.token,
        memo: body.memo,
        claimable_after: body.claimable_after,
        claimable_until: body.claimable_until,
    };

    match state.builder.build_create(request).await {
        Ok(built) => ok(BuiltTransactionBody::from(built)),
        Err(e) => build_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ClaimTransferBody {
    pub claimer: String,
    pub transfer_address: String,
}

async fn handle_claim_transfer(
    State(state): State<SharedApiState>,
    Json(body): Json<ClaimTransferBody>,
) -> Response {
    let claimer = match parse_pubkey(&body.claimer, "claimer") {
        Ok(key) => key,
        Err(response) => return response,
    };
    let transfer = match parse_pubkey(&body.transfer_address, "transfer_address") {
        Ok(key) => key,
        Err(response) => return response,
    };

    match state.builder.build_claim(&claimer, &transfer).await {
        Ok(built) => ok(BuiltTransactionBody::from(built)),
        Err(e) => build_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelTransferBody {
    pub canceller: String,
    pub transfer_address: String,
}

async fn handle_cancel_transfer(
    State(state): State<SharedApiState>,
    Json(body): Json<CancelTransferBody>,
) -> Response {
    let canceller = match parse_pubkey(&body.canceller, "canceller") {
        Ok(key) => key,
        Err(response) => return response,
    };
    let transfer = match parse_pubkey(&body.transfer_address, "transfer_address") {
        Ok(key) => key,
        Err(response) => return response,
    };

    match state.builder.build_cancel(&canceller, &transfer).await {
        Ok(built) => ok(BuiltTransactionBody::from(built)),
        Err(e) => build_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub signed_tx: String,
}

async fn handle_submit(
    State(state): State<SharedApiState>,
    Json(body): Json<SubmitBody>,
) -> Response {
    if body.signed_tx.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "MISSING_TX", "signed_tx is required");
    }

    match state.gateway.submit(&body.signed_tx).await {
        Ok(signature) => ok(serde_json::json!({ "signature": signature.to_string() })),
        Err(e) => submit_error_response(e),
    }
}

// ============================================================================
// Query endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListTransfersQuery {
    pub wallet: Option<String>,
    pub limit: Option<u32>,
}

async fn handle_list_transfers(
    State(state): State<SharedApiState>,
    Query(params): Query<ListTransfersQuery>,
) -> Response {
    let result = match &params.wallet {
        Some(wallet) => state.query.transfers_by_wallet(wallet).await,
        None => {
            state
                .query
                .recent_transfers(params.limit.unwrap_or(50).min(500))
                .await
        }
    };

    match result {
        Ok(transfers) => ok(serde_json::json!({ "transfers": transfers })),
        Err(e) => {
            error!(error = %e, "transfer listing failed");
            fail(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e)
        }
    }
}

async fn handle_get_transfer(
    State(state): State<SharedApiState>,
    Path(address): Path<String>,
) -> Response {
    match state.query.transfer_by_address(&address).await {
        Ok(Some(transfer)) => ok(transfer),
        Ok(None) => fail(
            StatusCode::NOT_FOUND,
            "TRANSFER_NOT_FOUND",
            format!("no mirrored transfer at {}", address),
        ),
        Err(e) => {
            error!(error = %e, "transfer lookup failed");
            fail(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e)
        }
    }
}

async fn handle_list_tokens(State(state): State<SharedApiState>) -> Response {
    match state.query.tokens().await {
        Ok(tokens) => ok(serde_json::json!({ "tokens": tokens })),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e),
    }
}

async fn handle_stats(State(state): State<SharedApiState>) -> Response {
    match state.query.stats().await {
        Ok(stats) => ok(stats),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e),
    }
}

async fn handle_health() -> Response {
    ok(serde_json::json!({
        "status": "ok",
        "service": "payflow",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================================
// Faucet
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FaucetBody {
    pub wallet: String,
    /// "sol", "token", or "both" (default)
    pub token: Option<String>,
}

async fn handle_faucet(
    State(state): State<SharedApiState>,
    Json(body): Json<FaucetBody>,
) -> Response {
    let Some(faucet) = &state.faucet else {
        return fail(
            StatusCode::FORBIDDEN,
            "FAUCET_DISABLED",
            "faucet is not enabled on this network",
        );
    };

    let wallet = match parse_pubkey(&body.wallet, "wallet") {
        Ok(key) => key,
        Err(response) => return response,
    };

    let (sol, token) = match body.token.as_deref() {
        None | Some("both") => (true, true),
        Some("sol") => (true, false),
        Some("token") => (false, true),
        Some(other) => {
            return fail(
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED_TOKEN",
                format!("unsupported faucet token '{}'", other),
            )
        }
    };

    match faucet.fund(&wallet, sol, token).await {
        Ok(drop) => ok(drop),
        Err(e @ FaucetError::RateLimited(_)) => {
            fail(StatusCode::TOO_MANY_REQUESTS, e.error_code(), e)
        }
        Err(e @ FaucetError::NotConfigured) => fail(StatusCode::FORBIDDEN, e.error_code(), e),
        Err(e) => fail(StatusCode::BAD_GATEWAY, e.error_code(), e),
    }
}
