//! Ledger Access Layer
//!
//! Typed account decoding, unsigned instruction construction, and the async
//! RPC client for the external escrow program.

pub mod accounts;
pub mod client;
pub mod instructions;

pub use accounts::{LedgerAccount, OnchainTransferStatus, PoolState, TransferState};
pub use client::{ConfirmedOperation, LedgerClient, LedgerError, RpcLedgerClient};

#[cfg(test)]
pub use client::MockLedgerClient;
