//! Ledger RPC Client
//!
//! Async client for the external ledger. All remote I/O in the service goes
//! through the `LedgerClient` trait so the builder, gateway, and reconciler
//! can be exercised against a mock in tests.
//!
//! Read semantics: a missing account is `Ok(None)`, never an error - callers
//! decide whether "not found" is a race, a destroyed record, or a bug.
//! Writes are submitted exactly once; only the confirmation wait retries,
//! and only within its deadline.

use std::time::Duration;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};
use solana_transaction_status::UiTransactionEncoding;
use thiserror::Error;
use tracing::debug;

use super::accounts::{DecodeError, PoolState, TransferState};

/// Interval between confirmation polls
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Ledger client errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("transaction failed on ledger: {0}")]
    TransactionFailed(String),

    #[error("confirmation timed out for {0}")]
    ConfirmationTimeout(String),

    #[error("operation not found: {0}")]
    OperationNotFound(String),

    #[error("operation record malformed: {0}")]
    MalformedOperation(String),

    #[error("account decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl LedgerError {
    /// Timed-out confirmations are ambiguous: the operation may or may not
    /// have landed. Callers must not treat this as a failure.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, LedgerError::ConfirmationTimeout(_))
    }
}

/// A confirmed operation's observable result: every address it referenced
/// and the log lines it emitted. Once a record is destroyed, these logs are
/// the only evidence of what happened to it.
#[derive(Debug, Clone)]
pub struct ConfirmedOperation {
    pub signature: Signature,
    pub slot: u64,
    pub account_keys: Vec<Pubkey>,
    pub log_messages: Vec<String>,
}

/// Async ledger access used by all services
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Read a pool record; `Ok(None)` when the account does not exist
    async fn fetch_pool(&self, address: &Pubkey) -> Result<Option<PoolState>, LedgerError>;

    /// Read a transfer record; `Ok(None)` when the account does not exist
    /// or is not a transfer record (destroyed records look identical to
    /// never-existed ones)
    async fn fetch_transfer(&self, address: &Pubkey)
        -> Result<Option<TransferState>, LedgerError>;

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError>;

    /// Submit a signed transaction. Resubmission of an already-processed
    /// transaction is reported as success.
    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, LedgerError>;

    /// Await confirmation with a bounded deadline
    async fn confirm_signature(
        &self,
        signature: &Signature,
        timeout: Duration,
    ) -> Result<(), LedgerError>;

    /// Fetch a confirmed operation's touched addresses and log lines
    async fn get_operation(&self, signature: &Signature)
        -> Result<ConfirmedOperation, LedgerError>;
}

// ============================================================================
// RPC implementation
// ============================================================================

/// `LedgerClient` over a Solana JSON-RPC endpoint at confirmed commitment
pub struct RpcLedgerClient {
    rpc: RpcClient,
    program_id: Pubkey,
}

impl RpcLedgerClient {
    pub fn new(rpc_url: impl ToString, program_id: Pubkey) -> Self {
        let rpc = RpcClient::new_with_commitment(
            rpc_url.to_string(),
            CommitmentConfig::confirmed(),
        );
        Self { rpc, program_id }
    }

    async fn fetch_raw(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        let response = self
            .rpc
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        Ok(response.value.map(|account| {
            if account.owner != self.program_id {
                // Not one of ours; callers treat this like "not found"
                Vec::new()
            } else {
                account.data
            }
        }))
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn fetch_pool(&self, address: &Pubkey) -> Result<Option<PoolState>, LedgerError> {
        match self.fetch_raw(address).await? {
            None => Ok(None),
            Some(data) if data.is_empty() => Ok(None),
            Some(data) => Ok(Some(PoolState::decode(&data)?)),
        }
    }

    async fn fetch_transfer(
        &self,
        address: &Pubkey,
    ) -> Result<Option<TransferState>, LedgerError> {
        match self.fetch_raw(address).await? {
            None => Ok(None),
            Some(data) if data.is_empty() => Ok(None),
            Some(data) => match TransferState::decode(&data) {
                Ok(state) => Ok(Some(state)),
                // Program account of another kind (e.g. a pool) at this
                // address - not a transfer
                Err(DecodeError::DiscriminatorMismatch { .. })
                | Err(DecodeError::UnknownDiscriminator(_))
                | Err(DecodeError::TooShort(_)) => Ok(None),
                // Discriminator matched but the payload is broken: surface it
                Err(e) => Err(LedgerError::Decode(e)),
            },
        }
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        self.rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, LedgerError> {
        match self.rpc.send_transaction(transaction).await {
            Ok(signature) => Ok(signature),
            Err(e) => {
                let message = e.to_string();
                // Duplicate submission of a landed transaction is success
                if message.contains("already been processed") {
                    return transaction
                        .signatures
                        .first()
                        .copied()
                        .ok_or_else(|| LedgerError::MalformedOperation("unsigned".into()));
                }
                Err(LedgerError::Rpc(message))
            }
        }
    }

    async fn confirm_signature(
        &self,
        signature: &Signature,
        timeout: Duration,
    ) -> Result<(), LedgerError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match self.rpc.get_signature_status(signature).await {
                Ok(Some(Ok(()))) => return Ok(()),
                Ok(Some(Err(tx_err))) => {
                    return Err(LedgerError::TransactionFailed(tx_err.to_string()))
                }
                Ok(None) => {}
                // Transient transport failure on a read: retry until deadline
                Err(e) => debug!(error = %e, "confirmation poll failed, retrying"),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(LedgerError::ConfirmationTimeout(signature.to_string()));
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }

    async fn get_operation(
        &self,
        signature: &Signature,
    ) -> Result<ConfirmedOperation, LedgerError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };

        let confirmed = self
            .rpc
            .get_transaction_with_config(signature, config)
            .await
            .map_err(|_| LedgerError::OperationNotFound(signature.to_string()))?;

        let decoded = confirmed
            .transaction
            .transaction
            .decode()
            .ok_or_else(|| {
                LedgerError::MalformedOperation(format!("undecodable transaction {}", signature))
            })?;

        let account_keys = decoded.message.static_account_keys().to_vec();
        let log_messages = confirmed
            .transaction
            .meta
            .and_then(|meta| Option::<Vec<String>>::from(meta.log_messages))
            .unwrap_or_default();

        Ok(ConfirmedOperation {
            signature: *signature,
            slot: confirmed.slot,
            account_keys,
            log_messages,
        })
    }
}
