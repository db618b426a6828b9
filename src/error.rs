//! Root Error Type
//!
//! Aggregates module errors for the binary's assembly path and maps every
//! variant onto the stable error codes the HTTP envelope exposes.
//! Resolution errors (pool/token/transfer not found) are expected races or
//! bad references and are never retried; validation errors are caught before
//! any network call; transport errors are retryable.

use thiserror::Error;

use crate::builder::BuildError;
use crate::config::ConfigError;
use crate::gateway::SubmitError;
use crate::ledger::LedgerError;
use crate::logging::LoggingError;
use crate::reconciler::ReconcileError;
use crate::store::StoreError;

/// Root error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("build error: {0}")]
    Build(#[from] BuildError),

    #[error("submit error: {0}")]
    Submit(#[from] SubmitError),

    #[error("reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Stable error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Logging(_) => "LOGGING_ERROR",
            AppError::Build(e) => e.error_code(),
            AppError::Submit(e) => e.error_code(),
            AppError::Reconcile(_) => "RECONCILE_ERROR",
            AppError::Ledger(_) => "LEDGER_ERROR",
            AppError::Store(_) => "STORE_ERROR",
            AppError::Io(_) => "IO_ERROR",
        }
    }

    /// Whether retrying the same call might succeed. Only transport-layer
    /// failures qualify; resolution and validation errors never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Ledger(LedgerError::Rpc(_)) => true,
            AppError::Build(BuildError::Ledger(LedgerError::Rpc(_))) => true,
            AppError::Submit(SubmitError::Ledger(LedgerError::Rpc(_))) => true,
            AppError::Store(StoreError::Database(_)) => true,
            AppError::Io(_) => true,
            _ => false,
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
