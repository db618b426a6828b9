//! Payflow - Escrowed Payment Reconciliation Service
//!
//! Off-chain layer for a pool-mediated escrow program on Solana. The ledger
//! owns fund custody; this service:
//!
//! 1. **Builds** unsigned transactions (create / claim / cancel) against
//!    deterministically derived record addresses
//! 2. **Submits** signed transactions and waits for confirmation
//! 3. **Reconciles** confirmed operations into a local SQLite mirror -
//!    including terminal transitions that destroy the ledger record, which
//!    can only be inferred from the operation's log lines
//! 4. **Serves** wallet/address/recency queries from the mirror, which keeps
//!    answering while the ledger is unreachable

pub mod api;
pub mod builder;
pub mod config;
pub mod error;
pub mod faucet;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod pda;
pub mod policy;
pub mod query;
pub mod reconciler;
pub mod store;

// Re-exports: configuration
pub use config::{load_keypair_from_file, AppConfig, ConfigError, Network};

// Re-exports: core services
pub use builder::{BuildError, BuiltTransaction, CreateTransferRequest, TxBuilder};
pub use gateway::{SubmissionGateway, SubmitError};
pub use query::{QueryService, TransferView};
pub use reconciler::{terminal_status_from_logs, ReconcileSummary, Reconciler};

// Re-exports: ledger access
pub use ledger::{LedgerClient, LedgerError, PoolState, RpcLedgerClient, TransferState};

// Re-exports: mirror
pub use store::{
    MemoryMirrorStore, MirrorStore, PoolRecord, SqliteMirrorStore, TokenRecord, TransferRecord,
    TransferStatus,
};

/// Raw/display token unit conversion helpers
pub mod units {
    /// Convert a display-unit amount to raw units with proper rounding
    pub fn ui_to_raw(ui: f64, decimals: u8) -> u64 {
        (ui * 10f64.powi(decimals as i32)).round() as u64
    }

    /// Convert raw units to a display-unit amount
    pub fn raw_to_ui(raw: u64, decimals: u8) -> f64 {
        raw as f64 / 10f64.powi(decimals as i32)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_round_trip() {
            assert_eq!(ui_to_raw(10.0, 6), 10_000_000);
            assert_eq!(ui_to_raw(0.25, 6), 250_000);
            assert_eq!(raw_to_ui(9_750_000, 6), 9.75);
        }

        #[test]
        fn test_rounding() {
            // 0.1 is not exactly representable; rounding keeps it stable
            assert_eq!(ui_to_raw(0.1, 6), 100_000);
            assert_eq!(ui_to_raw(0.123456, 6), 123_456);
        }
    }
}
