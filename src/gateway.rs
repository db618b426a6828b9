//! Submission Gateway
//!
//! Accepts fully signed transactions, forwards them to the ledger, waits for
//! confirmation within a bounded window, and hands confirmed operations to
//! the reconciler.
//!
//! Failure semantics matter here: a duplicate submission of an
//! already-confirmed transaction is success; a confirmation timeout is an
//! *ambiguous* outcome (the operation may still land) and is reported as
//! such, never as failure; and a reconciler error after confirmation is
//! logged but can no longer fail the submission - the ledger has already
//! moved.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use solana_sdk::{
    signature::Signature,
    transaction::{Transaction, VersionedTransaction},
};
use thiserror::Error;
use tracing::{error, info};

use crate::ledger::{LedgerClient, LedgerError};
use crate::reconciler::Reconciler;

/// Default bound on the confirmation wait
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("malformed transaction: {0}")]
    Malformed(String),

    #[error("transaction failed on ledger: {0}")]
    Failed(String),

    /// The operation may or may not have landed; a later reconciliation
    /// pass or explicit re-query is the recovery path
    #[error("confirmation timed out for {0}; outcome unknown")]
    ConfirmationTimeout(String),

    #[error("ledger error: {0}")]
    Ledger(LedgerError),
}

impl SubmitError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SubmitError::Malformed(_) => "TX_MALFORMED",
            SubmitError::Failed(_) => "TX_FAILED",
            SubmitError::ConfirmationTimeout(_) => "CONFIRMATION_TIMEOUT",
            SubmitError::Ledger(_) => "LEDGER_ERROR",
        }
    }
}

/// Forwards signed transactions to the ledger and triggers reconciliation
pub struct SubmissionGateway {
    ledger: Arc<dyn LedgerClient>,
    reconciler: Arc<Reconciler>,
    confirm_timeout: Duration,
}

impl SubmissionGateway {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        reconciler: Arc<Reconciler>,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            reconciler,
            confirm_timeout,
        }
    }

    /// Submit a signed base64 transaction and wait for confirmation
    pub async fn submit(&self, signed_tx_base64: &str) -> Result<Signature, SubmitError> {
        let transaction = decode_signed(signed_tx_base64)?;

        let signature = self
            .ledger
            .send_transaction(&transaction)
            .await
            .map_err(|e| match e {
                LedgerError::TransactionFailed(msg) => SubmitError::Failed(msg),
                other => SubmitError::Ledger(other),
            })?;

        match self
            .ledger
            .confirm_signature(&signature, self.confirm_timeout)
            .await
        {
            Ok(()) => {}
            Err(LedgerError::ConfirmationTimeout(_)) => {
                return Err(SubmitError::ConfirmationTimeout(signature.to_string()))
            }
            Err(LedgerError::TransactionFailed(msg)) => return Err(SubmitError::Failed(msg)),
            Err(e) => return Err(SubmitError::Ledger(e)),
        }

        info!(signature = %signature, "operation confirmed");

        // The mirror being briefly stale is acceptable; it self-heals on the
        // next read-triggered reconciliation
        if let Err(e) = self.reconciler.reconcile(&signature).await {
            error!(signature = %signature, error = %e, "post-submit reconciliation failed");
        }

        Ok(signature)
    }
}

/// Decode a base64 transaction, trying the versioned wire format first and
/// falling back to legacy
fn decode_signed(signed_tx_base64: &str) -> Result<VersionedTransaction, SubmitError> {
    let bytes = BASE64
        .decode(signed_tx_base64)
        .map_err(|e| SubmitError::Malformed(e.to_string()))?;

    if let Ok(versioned) = bincode::deserialize::<VersionedTransaction>(&bytes) {
        return Ok(versioned);
    }
    bincode::deserialize::<Transaction>(&bytes)
        .map(VersionedTransaction::from)
        .map_err(|e| SubmitError::Malformed(e.to_string()))
}
