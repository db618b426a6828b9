//! Mirror Store Interface
//!
//! Abstract storage for the ledger mirror. The SQLite implementation backs
//! production; the in-memory implementation backs tests. The reconciler and
//! the builder's optimistic insert are the only writers; query services only
//! read.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use super::types::{PoolRecord, TokenRecord, TransferRecord, TransferStatus};

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a guarded transfer write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWrite {
    /// Row inserted or status advanced
    Applied,
    /// Duplicate or stale write; stored state kept (idempotent convergence)
    NoOp,
    /// Write would have replaced one terminal status with a different one;
    /// refused and reported
    Conflict { existing: TransferStatus },
    /// No row at this address - nothing to transition
    Missing,
}

/// The state mirror: tokens, pools, transfers
#[async_trait]
pub trait MirrorStore: Send + Sync {
    // --- tokens ---

    /// Insert the token unless its mint is already known; returns the stored
    /// row either way (lazy, self-healing materialization)
    async fn upsert_token(&self, token: &TokenRecord) -> StoreResult<TokenRecord>;

    async fn token_by_id(&self, id: &str) -> StoreResult<Option<TokenRecord>>;

    async fn token_by_mint(&self, mint: &str) -> StoreResult<Option<TokenRecord>>;

    /// Case-insensitive symbol lookup
    async fn token_by_symbol(&self, symbol: &str) -> StoreResult<Option<TokenRecord>>;

    async fn list_tokens(&self) -> StoreResult<Vec<TokenRecord>>;

    // --- pools ---

    /// Insert the pool by address, or refresh the advisory counters of the
    /// stored row from the given record
    async fn upsert_pool(&self, pool: &PoolRecord) -> StoreResult<PoolRecord>;

    async fn pool_by_id(&self, id: &str) -> StoreResult<Option<PoolRecord>>;

    async fn pool_by_address(&self, address: &str) -> StoreResult<Option<PoolRecord>>;

    async fn pool_by_token(&self, token_id: &str) -> StoreResult<Option<PoolRecord>>;

    async fn first_unpaused_pool(&self) -> StoreResult<Option<PoolRecord>>;

    // --- transfers ---

    /// Insert a fresh row; `Duplicate` if the address is already mirrored
    async fn insert_transfer(&self, transfer: &TransferRecord) -> StoreResult<()>;

    /// Insert the row, or update the stored row's fields subject to the
    /// status guard. Runs in one storage transaction per row.
    async fn upsert_transfer(&self, transfer: &TransferRecord) -> StoreResult<StatusWrite>;

    /// Apply a status transition subject to the guard, recording the
    /// resolving operation id (claim_sig for CLAIMED, cancel_sig for every
    /// other terminal status)
    async fn set_transfer_status(
        &self,
        address: &str,
        status: TransferStatus,
        signature: &str,
    ) -> StoreResult<StatusWrite>;

    async fn transfer_by_address(&self, address: &str) -> StoreResult<Option<TransferRecord>>;

    /// Transfers where the wallet is sender or recipient, newest first
    async fn transfers_by_wallet(&self, wallet: &str) -> StoreResult<Vec<TransferRecord>>;

    async fn recent_transfers(&self, limit: u32) -> StoreResult<Vec<TransferRecord>>;

    async fn count_transfers(&self) -> StoreResult<u64>;

    async fn status_counts(&self) -> StoreResult<HashMap<String, u64>>;

    /// Delete PENDING rows created before the cutoff (abandoned builds that
    /// never confirmed); returns the number removed
    async fn sweep_stale_pending(&self, cutoff_ts: i64) -> StoreResult<u64>;
}
