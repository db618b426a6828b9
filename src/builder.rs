//! Transaction Builder
//!
//! Turns client requests into unsigned transactions against the escrow
//! program. Validation happens before any network call; pool resolution
//! walks explicit address, then mint, then token symbol, then falls back to
//! the first unpaused pool. Claim and cancel builds pre-read the transfer
//! from the ledger - "not found" there is the normal outcome of racing a
//! concurrent resolution, surfaced as `TransferNotFound` for the caller to
//! handle, never retried.
//!
//! Building a create also drops an optimistic PENDING row into the mirror so
//! clients can show the payment before it confirms; the reconciler promotes
//! or the pending sweep removes it.

use std::str::FromStr;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use solana_sdk::{hash::Hash, message::Message, pubkey::Pubkey, transaction::Transaction};
use thiserror::Error;
use tracing::{debug, info};

use crate::ledger::{instructions, LedgerClient, LedgerError, PoolState};
use crate::store::{
    MirrorStore, PoolRecord, StoreError, TokenRecord, TransferRecord,
};
use crate::units;

/// Ledger-side memo bound, validated here defensively
pub const MEMO_MAX_LEN: usize = 64;

/// Builder errors. Resolution variants are expected races or bad references;
/// validation variants are caught before any network call.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("pool not found")]
    PoolNotFound,

    #[error("token not found")]
    TokenNotFound,

    #[error("no active pool available")]
    NoActivePool,

    #[error("transfer not found: {0}; it may already be resolved")]
    TransferNotFound(String),

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("memo too long: {0} bytes (max {MEMO_MAX_LEN})")]
    MemoTooLong(usize),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl BuildError {
    pub fn error_code(&self) -> &'static str {
        match self {
            BuildError::PoolNotFound => "POOL_NOT_FOUND",
            BuildError::TokenNotFound => "TOKEN_NOT_FOUND",
            BuildError::NoActivePool => "NO_ACTIVE_POOL",
            BuildError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            BuildError::InvalidAmount => "INVALID_AMOUNT",
            BuildError::MemoTooLong(_) => "MEMO_TOO_LONG",
            BuildError::InvalidAddress(_) => "INVALID_ADDRESS",
            BuildError::Ledger(_) => "LEDGER_ERROR",
            BuildError::Store(_) => "STORE_ERROR",
        }
    }
}

/// Request to escrow a payment
#[derive(Debug, Clone)]
pub struct CreateTransferRequest {
    pub sender: Pubkey,
    pub recipient: Pubkey,
    /// Display-unit amount; converted to raw units with the token's decimals
    pub amount: f64,
    pub pool_address: Option<Pubkey>,
    pub mint: Option<String>,
    pub token_symbol: Option<String>,
    pub memo: Option<String>,
    /// Claim window start (0 = immediate)
    pub claimable_after: i64,
    /// Claim window end (0 = no deadline)
    pub claimable_until: i64,
}

/// An unsigned transaction ready for the caller to sign and submit
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    /// base64-encoded unsigned transaction with the fee payer designated
    pub transaction: String,
    /// Derived transfer address (create builds only)
    pub transfer_address: Option<String>,
    /// Nonce used for the derivation (create builds only)
    pub nonce: Option<u64>,
}

/// Builds unsigned operation batches for create / claim / cancel
pub struct TxBuilder {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn MirrorStore>,
    program_id: Pubkey,
    token_program: Pubkey,
}

impl TxBuilder {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn MirrorStore>,
        program_id: Pubkey,
        token_program: Pubkey,
    ) -> Self {
        Self {
            ledger,
            store,
            program_id,
            token_program,
        }
    }

    /// Build an unsigned create-transfer transaction. Derives the transfer
    /// address from a fresh nonce and inserts an optimistic PENDING row.
    pub async fn build_create(
        &self,
        request: CreateTransferRequest,
    ) -> Result<BuiltTransaction, BuildError> {
        // Cheap validation first - no network I/O on bad input
        if !(request.amount > 0.0) || !request.amount.is_finite() {
            return Err(BuildError::InvalidAmount);
        }
        let memo = request.memo.clone().unwrap_or_default();
        if memo.len() > MEMO_MAX_LEN {
            return Err(BuildError::MemoTooLong(memo.len()));
        }

        let pool_address = self.resolve_pool_address(&request).await?;

        // Authoritative read: fee rate, mint, and pause state live on-chain
        let pool_state = self
            .ledger
            .fetch_pool(&pool_address)
            .await?
            .ok_or(BuildError::PoolNotFound)?;

        let pool_row = self.mirror_pool(&pool_address, &pool_state).await?;
        let token = self
            .store
            .token_by_id(&pool_row.token_id)
            .await?
            .ok_or(BuildError::TokenNotFound)?;

        let amount_raw = units::ui_to_raw(request.amount, token.decimals);
        if amount_raw == 0 {
            return Err(BuildError::InvalidAmount);
        }

        let nonce = chrono::Utc::now().timestamp_millis() as u64;
        let built = instructions::create_transfer(
            &self.program_id,
            &request.sender,
            &request.recipient,
            &pool_address,
            &pool_state.mint,
            nonce,
            amount_raw,
            &memo,
            request.claimable_after,
            request.claimable_until,
            &self.token_program,
        );

        let blockhash = self.ledger.latest_blockhash().await?;
        let transaction =
            encode_unsigned(&[built.instruction.clone()], &request.sender, &blockhash);

        // Optimistic pending row so the payment is queryable before it
        // confirms; corrected or confirmed by the reconciler
        let window = |v: i64| if v == 0 { None } else { Some(v) };
        let pending = TransferRecord::new_pending(
            &built.address.to_string(),
            &request.sender.to_string(),
            &request.recipient.to_string(),
            amount_raw,
            &token.id,
            &pool_row.id,
            if memo.is_empty() { None } else { Some(memo) },
            window(request.claimable_after),
            window(request.claimable_until),
        );
        match self.store.insert_transfer(&pending).await {
            Ok(()) => info!(address = %built.address, "pending transfer recorded"),
            Err(StoreError::Duplicate(_)) => {
                debug!(address = %built.address, "pending transfer already recorded")
            }
            Err(e) => return Err(e.into()),
        }

        Ok(BuiltTransaction {
            transaction,
            transfer_address: Some(built.address.to_string()),
            nonce: Some(nonce),
        })
    }

    /// Build an unsigned claim transaction for the recipient
    pub async fn build_claim(
        &self,
        claimer: &Pubkey,
        transfer_address: &Pubkey,
    ) -> Result<BuiltTransaction, BuildError> {
        let state = self.read_transfer(transfer_address).await?;
        let pool_state = self
            .ledger
            .fetch_pool(&state.pool)
            .await?
            .ok_or(BuildError::PoolNotFound)?;

        let instruction = instructions::claim_transfer(
            &self.program_id,
            claimer,
            &state.pool,
            &pool_state.mint,
            transfer_address,
            &state.sender,
            &self.token_program,
        );

        let blockhash = self.ledger.latest_blockhash().await?;
        Ok(BuiltTransaction {
            transaction: encode_unsigned(&[instruction], claimer, &blockhash),
            transfer_address: None,
            nonce: None,
        })
    }

    /// Build an unsigned cancel transaction for the sender
    pub async fn build_cancel(
        &self,
        canceller: &Pubkey,
        transfer_address: &Pubkey,
    ) -> Result<BuiltTransaction, BuildError> {
        let state = self.read_transfer(transfer_address).await?;
        let pool_state = self
            .ledger
            .fetch_pool(&state.pool)
            .await?
            .ok_or(BuildError::PoolNotFound)?;

        let instruction = instructions::cancel_transfer(
            &self.program_id,
            canceller,
            &state.pool,
            &pool_state.mint,
            transfer_address,
            &self.token_program,
        );

        let blockhash = self.ledger.latest_blockhash().await?;
        Ok(BuiltTransaction {
            transaction: encode_unsigned(&[instruction], canceller, &blockhash),
            transfer_address: None,
            nonce: None,
        })
    }

    /// Current ledger state for a transfer, or the expected
    /// already-resolved race
    async fn read_transfer(
        &self,
        address: &Pubkey,
    ) -> Result<crate::ledger::TransferState, BuildError> {
        self.ledger
            .fetch_transfer(address)
            .await?
            .ok_or_else(|| BuildError::TransferNotFound(address.to_string()))
    }

    /// Resolve which pool a create should use
    async fn resolve_pool_address(
        &self,
        request: &CreateTransferRequest,
    ) -> Result<Pubkey, BuildError> {
        if let Some(address) = request.pool_address {
            return Ok(address);
        }

        let pool = if let Some(mint) = &request.mint {
            let token = self
                .store
                .token_by_mint(mint)
                .await?
                .ok_or(BuildError::TokenNotFound)?;
            self.store
                .pool_by_token(&token.id)
                .await?
                .ok_or(BuildError::PoolNotFound)?
        } else if let Some(symbol) = &request.token_symbol {
            let token = self
                .store
                .token_by_symbol(symbol)
                .await?
                .ok_or(BuildError::TokenNotFound)?;
            self.store
                .pool_by_token(&token.id)
                .await?
                .ok_or(BuildError::PoolNotFound)?
        } else {
            self.store
                .first_unpaused_pool()
                .await?
                .ok_or(BuildError::NoActivePool)?
        };

        Pubkey::from_str(&pool.address).map_err(|_| BuildError::InvalidAddress(pool.address))
    }

    /// Mirror the pool (and its token) from fresh ledger state - the builder
    /// shares the reconciler's self-healing duty for reference rows
    async fn mirror_pool(
        &self,
        address: &Pubkey,
        state: &PoolState,
    ) -> Result<PoolRecord, BuildError> {
        if let Some(mut stored) = self.store.pool_by_address(&address.to_string()).await? {
            stored.apply_state(state);
            return Ok(self.store.upsert_pool(&stored).await?);
        }

        let token = self
            .store
            .upsert_token(&TokenRecord::placeholder(&state.mint.to_string()))
            .await?;
        let record = PoolRecord::from_state(&address.to_string(), state, &token.id);
        Ok(self.store.upsert_pool(&record).await?)
    }
}

/// Serialize instructions into a base64 unsigned transaction with the given
/// fee payer and blockhash
fn encode_unsigned(
    instructions: &[solana_sdk::instruction::Instruction],
    fee_payer: &Pubkey,
    blockhash: &Hash,
) -> String {
    let message = Message::new_with_blockhash(instructions, Some(fee_payer), blockhash);
    let transaction = Transaction::new_unsigned(message);
    BASE64.encode(bincode::serialize(&transaction).expect("transaction serializes"))
}
