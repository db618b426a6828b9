//! Ledger Reconciler
//!
//! The state-machine core of the mirror. Given a confirmed operation, works
//! out which transfer records changed and applies the inferred transition:
//!
//! 1. Fetch the operation's touched addresses and emitted log lines.
//! 2. For each address, attempt a direct ledger read.
//!    - Record still exists (only true after a create): decode it and upsert
//!      it as ACTIVE, materializing the owning pool/token rows on demand.
//!    - Record gone (claim/cancel/reject/decline/expire destroy storage):
//!      the address alone says nothing - infer the terminal outcome from the
//!      operation's instruction-name log marker and apply it under the
//!      status guard.
//! 3. A terminal marker with no matching mirror row is a data-integrity gap:
//!    the destroyed record's fields are unrecoverable, so it is logged
//!    loudly, never thrown - a cache miss must not crash the submission path.
//!
//! The marker table is a versioned contract with the ledger's log format.
//! Any change to that format lands here and nowhere else.

use std::str::FromStr;
use std::sync::Arc;

use solana_sdk::{pubkey::Pubkey, signature::Signature};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ledger::{LedgerClient, LedgerError, TransferState};
use crate::pda::{
    find_pool_address, named_pool_id, ATA_PROGRAM_ID, TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID,
};
use crate::store::{
    MirrorStore, PoolRecord, StatusWrite, StoreError, TokenRecord, TransferRecord, TransferStatus,
};

// ============================================================================
// Log marker table
// ============================================================================

/// Version of the instruction-name-to-status contract below. Bump this
/// whenever the ledger's log format or instruction names change.
pub const LOG_MARKER_TABLE_VERSION: u32 = 1;

/// Prefix the ledger runtime puts in front of every instruction-name log line
const INSTRUCTION_LOG_PREFIX: &str = "Program log: Instruction: ";

/// Terminal transitions, keyed by the instruction-name marker in the logs
const TERMINAL_MARKERS: [(&str, TransferStatus); 5] = [
    ("ClaimTransfer", TransferStatus::Claimed),
    ("CancelTransfer", TransferStatus::Cancelled),
    ("RejectTransfer", TransferStatus::Rejected),
    ("DeclineTransfer", TransferStatus::Declined),
    ("ExpireTransfer", TransferStatus::Expired),
];

/// Scan an operation's log lines for a terminal-transition marker.
///
/// Returns the matched marker and the status it maps to. Only the first
/// terminal marker counts; a single operation resolving a transfer carries
/// exactly one.
pub fn terminal_status_from_logs(logs: &[String]) -> Option<(&'static str, TransferStatus)> {
    for line in logs {
        let Some(name) = line.strip_prefix(INSTRUCTION_LOG_PREFIX) else {
            continue;
        };
        let name = name.trim();
        for (marker, status) in TERMINAL_MARKERS {
            if name == marker {
                return Some((marker, status));
            }
        }
    }
    None
}

// ============================================================================
// Reconciler
// ============================================================================

/// Reconciler errors
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("pool unavailable for transfer: {0}")]
    PoolUnavailable(String),
}

/// What one reconciliation pass did
#[derive(Debug, Default, Clone)]
pub struct ReconcileSummary {
    pub signature: String,
    /// Live records decoded and upserted as ACTIVE
    pub upserted_active: u32,
    /// Mirror rows advanced to a terminal status
    pub resolved_terminal: u32,
    /// A terminal marker was observed but no mirror row matched any touched
    /// address - the destroyed record cannot be reconstructed
    pub untracked_terminal: bool,
}

/// Applies confirmed ledger operations to the mirror. The sole writer of
/// transfer rows besides the builder's optimistic insert.
pub struct Reconciler {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn MirrorStore>,
    program_id: Pubkey,
}

impl Reconciler {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn MirrorStore>,
        program_id: Pubkey,
    ) -> Self {
        Self {
            ledger,
            store,
            program_id,
        }
    }

    /// Reconcile one confirmed operation into the mirror.
    ///
    /// Safe to call repeatedly with the same signature: replays converge to
    /// the same mirror state via the status guard.
    pub async fn reconcile(&self, signature: &Signature) -> Result<ReconcileSummary, ReconcileError> {
        let operation = self.ledger.get_operation(signature).await?;
        let terminal_hint = terminal_status_from_logs(&operation.log_messages);

        let mut summary = ReconcileSummary {
            signature: signature.to_string(),
            ..Default::default()
        };
        let mut matched_terminal_row = false;

        for address in self.candidate_addresses(&operation.account_keys) {
            match self.ledger.fetch_transfer(&address).await {
                Ok(Some(state)) => {
                    match self.upsert_live(&address, &state, &summary.signature).await {
                        Ok(()) => summary.upserted_active += 1,
                        Err(e) => {
                            warn!(address = %address, error = %e, "failed to mirror live transfer")
                        }
                    }
                }
                Ok(None) => {
                    // Either never a transfer, or destroyed by a terminal
                    // transition. Only a pre-existing mirror row can tell.
                    let row = self.store.transfer_by_address(&address.to_string()).await?;
                    let Some(row) = row else { continue };

                    let Some((marker, status)) = terminal_hint else {
                        debug!(
                            address = %address,
                            "mirrored transfer missing from ledger with no terminal marker"
                        );
                        continue;
                    };
                    matched_terminal_row = true;

                    match self
                        .store
                        .set_transfer_status(&row.address, status, &summary.signature)
                        .await?
                    {
                        StatusWrite::Applied => {
                            info!(
                                address = %address,
                                status = %status,
                                marker,
                                "transfer resolved"
                            );
                            summary.resolved_terminal += 1;
                            self.refresh_pool_counters(&row).await;
                        }
                        StatusWrite::NoOp => {
                            debug!(address = %address, "terminal transition already mirrored");
                            summary.resolved_terminal += 1;
                        }
                        StatusWrite::Conflict { existing } => {
                            warn!(
                                address = %address,
                                existing = %existing,
                                incoming = %status,
                                "conflicting terminal transition ignored"
                            );
                        }
                        StatusWrite::Missing => {}
                    }
                }
                // Transport failure on one address must not abort the pass
                Err(e) => warn!(address = %address, error = %e, "transfer read failed"),
            }
        }

        if let Some((marker, _)) = terminal_hint {
            if !matched_terminal_row && summary.upserted_active == 0 {
                warn!(
                    signature = %summary.signature,
                    marker,
                    table_version = LOG_MARKER_TABLE_VERSION,
                    "terminal transition observed for untracked transfer; \
                     destroyed record cannot be reconstructed"
                );
                summary.untracked_terminal = true;
            }
        }

        Ok(summary)
    }

    /// Addresses worth probing as transfer records. Programs and sysvars
    /// referenced by every operation are skipped up front.
    fn candidate_addresses(&self, keys: &[Pubkey]) -> Vec<Pubkey> {
        keys.iter()
            .filter(|key| {
                **key != self.program_id
                    && **key != solana_sdk::system_program::ID
                    && **key != solana_sdk::sysvar::rent::ID
                    && **key != TOKEN_PROGRAM_ID
                    && **key != TOKEN_2022_PROGRAM_ID
                    && **key != ATA_PROGRAM_ID
            })
            .copied()
            .collect()
    }

    /// Upsert a still-live transfer record, materializing its pool and token
    /// rows if the cache has never seen them (self-healing).
    async fn upsert_live(
        &self,
        address: &Pubkey,
        state: &TransferState,
        signature: &str,
    ) -> Result<(), ReconcileError> {
        let pool = self.ensure_pool(&state.pool).await?;
        let record = TransferRecord::from_state(
            &address.to_string(),
            state,
            &pool.token_id,
            &pool.id,
            signature,
        );

        match self.store.upsert_transfer(&record).await? {
            StatusWrite::Applied => {
                info!(address = %address, status = %record.status, "transfer mirrored")
            }
            StatusWrite::NoOp => debug!(address = %address, "transfer already mirrored"),
            StatusWrite::Conflict { existing } => warn!(
                address = %address,
                existing = %existing,
                incoming = %record.status,
                "live transfer conflicts with terminal mirror row"
            ),
            StatusWrite::Missing => {}
        }
        Ok(())
    }

    /// Pool row for the given address, fetched from the ledger when the
    /// mirror has never seen it. Fresh reads supersede stored counters.
    async fn ensure_pool(&self, pool_address: &Pubkey) -> Result<PoolRecord, ReconcileError> {
        let address = pool_address.to_string();
        let stored = self.store.pool_by_address(&address).await?;
        let state = self.ledger.fetch_pool(pool_address).await?;

        match (stored, state) {
            (Some(mut stored), Some(state)) => {
                stored.apply_state(&state);
                Ok(self.store.upsert_pool(&stored).await?)
            }
            (Some(stored), None) => Ok(stored),
            (None, Some(state)) => {
                let token = self.ensure_token(&state.mint).await?;
                let record = PoolRecord::from_state(&address, &state, &token.id);
                info!(address = %address, mint = %token.mint, "pool materialized in mirror");
                Ok(self.store.upsert_pool(&record).await?)
            }
            (None, None) => Err(ReconcileError::PoolUnavailable(address)),
        }
    }

    /// Token row for a mint, with placeholder metadata until curated
    async fn ensure_token(&self, mint: &Pubkey) -> Result<TokenRecord, ReconcileError> {
        Ok(self
            .store
            .upsert_token(&TokenRecord::placeholder(&mint.to_string()))
            .await?)
    }

    /// Best-effort refresh of a resolved transfer's pool counters from a
    /// fresh ledger read
    async fn refresh_pool_counters(&self, row: &TransferRecord) {
        let Ok(Some(pool)) = self.store.pool_by_id(&row.pool_id).await else {
            return;
        };
        let Ok(address) = Pubkey::from_str(&pool.address) else {
            return;
        };
        match self.ledger.fetch_pool(&address).await {
            Ok(Some(state)) => {
                let mut updated = pool;
                updated.apply_state(&state);
                if let Err(e) = self.store.upsert_pool(&updated).await {
                    debug!(pool = %updated.address, error = %e, "pool counter refresh failed");
                }
            }
            Ok(None) => debug!(pool = %pool.address, "pool gone from ledger"),
            Err(e) => debug!(pool = %pool.address, error = %e, "pool counter refresh failed"),
        }
    }

    // ------------------------------------------------------------------
    // boot-time reference sync
    // ------------------------------------------------------------------

    /// Ensure the configured token and named pool are mirrored, reading the
    /// pool from the ledger. Missing on-chain state is reported, not fatal -
    /// the cache self-heals later.
    pub async fn sync_reference_rows(
        &self,
        token: Option<&TokenRecord>,
        pool_name: Option<&str>,
    ) -> Result<(), ReconcileError> {
        if let Some(token) = token {
            let stored = self.store.upsert_token(token).await?;
            info!(mint = %stored.mint, symbol = %stored.symbol, "token mirrored");
        }

        let Some(pool_name) = pool_name else {
            return Ok(());
        };

        let pool_id = named_pool_id(pool_name);
        let (pool_address, _) = find_pool_address(&self.program_id, &pool_id);

        match self.ensure_pool(&pool_address).await {
            Ok(pool) => {
                info!(name = pool_name, address = %pool.address, "named pool mirrored");
                Ok(())
            }
            Err(ReconcileError::PoolUnavailable(address)) => {
                warn!(
                    name = pool_name,
                    address = %address,
                    "named pool not found on ledger; create it before serving traffic"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::accounts::{OnchainTransferStatus, PoolState};
    use crate::ledger::client::{ConfirmedOperation, MockLedgerClient};
    use crate::store::MemoryMirrorStore;

    fn pool_state(mint: Pubkey) -> PoolState {
        PoolState {
            version: 1,
            bump: 255,
            pool_id: Pubkey::new_unique(),
            operator: Pubkey::new_unique(),
            mint,
            transfer_fee_bps: 250,
            total_deposits: 0,
            total_withdrawals: 0,
            total_escrowed: 0,
            total_transfers_created: 0,
            total_transfers_resolved: 0,
            collected_fees: 0,
            is_paused: false,
        }
    }

    fn transfer_state(sender: Pubkey, recipient: Pubkey, pool: Pubkey) -> TransferState {
        TransferState {
            version: 1,
            bump: 254,
            nonce: 1,
            sender,
            recipient,
            pool,
            amount: 1_000_000_000,
            created_at: 1_700_000_000,
            claimable_after: 0,
            claimable_until: 0,
            status: OnchainTransferStatus::Active,
            release_conditions: None,
            memo: [0u8; 64],
            compliance_hash: None,
        }
    }

    fn operation(keys: Vec<Pubkey>, logs: Vec<&str>) -> ConfirmedOperation {
        ConfirmedOperation {
            signature: Signature::default(),
            slot: 1,
            account_keys: keys,
            log_messages: logs.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn test_marker_table_maps_every_terminal_status() {
        let cases = [
            ("ClaimTransfer", TransferStatus::Claimed),
            ("CancelTransfer", TransferStatus::Cancelled),
            ("RejectTransfer", TransferStatus::Rejected),
            ("DeclineTransfer", TransferStatus::Declined),
            ("ExpireTransfer", TransferStatus::Expired),
        ];
        for (name, expected) in cases {
            let logs = vec![
                "Program Prog1111 invoke [1]".to_string(),
                format!("{}{}", INSTRUCTION_LOG_PREFIX, name),
                "Program Prog1111 success".to_string(),
            ];
            let (marker, status) = terminal_status_from_logs(&logs).unwrap();
            assert_eq!(marker, name);
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_create_marker_is_not_terminal() {
        let logs = vec![format!("{}CreateTransfer", INSTRUCTION_LOG_PREFIX)];
        assert!(terminal_status_from_logs(&logs).is_none());
    }

    #[test]
    fn test_marker_requires_exact_name() {
        let logs = vec![format!("{}ClaimTransferV2", INSTRUCTION_LOG_PREFIX)];
        assert!(terminal_status_from_logs(&logs).is_none());
    }

    #[tokio::test]
    async fn test_create_reconciles_to_active_with_self_healing() {
        let program_id = Pubkey::new_unique();
        let sender = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let pool_address = Pubkey::new_unique();
        let transfer_address = Pubkey::new_unique();

        let state = transfer_state(sender, recipient, pool_address);
        let pstate = pool_state(mint);

        let mut ledger = MockLedgerClient::new();
        let keys = vec![sender, pool_address, mint, transfer_address, program_id];
        ledger.expect_get_operation().returning(move |_| {
            Ok(operation(
                keys.clone(),
                vec!["Program log: Instruction: CreateTransfer"],
            ))
        });
        ledger.expect_fetch_transfer().returning(move |address| {
            if *address == transfer_address {
                Ok(Some(state.clone()))
            } else {
                Ok(None)
            }
        });
        ledger.expect_fetch_pool().returning(move |address| {
            if *address == pool_address {
                Ok(Some(pstate.clone()))
            } else {
                Ok(None)
            }
        });

        let store = Arc::new(MemoryMirrorStore::new());
        let reconciler = Reconciler::new(Arc::new(ledger), store.clone(), program_id);

        let summary = reconciler.reconcile(&Signature::default()).await.unwrap();
        assert_eq!(summary.upserted_active, 1);
        assert!(!summary.untracked_terminal);

        // Transfer mirrored as ACTIVE with create signature
        let row = store
            .transfer_by_address(&transfer_address.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, TransferStatus::Active);
        assert_eq!(row.amount, 1_000_000_000);
        assert!(row.create_sig.is_some());

        // Pool and placeholder token self-healed into the mirror
        let pool = store
            .pool_by_address(&pool_address.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pool.fee_bps, 250);
        let token = store.token_by_mint(&mint.to_string()).await.unwrap().unwrap();
        assert_eq!(token.symbol, "UNK");
    }

    #[tokio::test]
    async fn test_destroyed_record_resolved_from_logs() {
        let program_id = Pubkey::new_unique();
        let transfer_address = Pubkey::new_unique();

        let store = Arc::new(MemoryMirrorStore::new());
        let mut row = TransferRecord::new_pending(
            &transfer_address.to_string(),
            "sender",
            "recipient",
            1_000_000_000,
            "tok",
            "pool",
            None,
            None,
            None,
        );
        row.status = TransferStatus::Active;
        store.insert_transfer(&row).await.unwrap();

        let mut ledger = MockLedgerClient::new();
        let keys = vec![transfer_address];
        ledger.expect_get_operation().returning(move |_| {
            Ok(operation(
                keys.clone(),
                vec![
                    "Program Prog1111 invoke [1]",
                    "Program log: Instruction: CancelTransfer",
                    "Program Prog1111 success",
                ],
            ))
        });
        ledger.expect_fetch_transfer().returning(|_| Ok(None));

        let reconciler = Reconciler::new(Arc::new(ledger), store.clone(), program_id);
        let summary = reconciler.reconcile(&Signature::default()).await.unwrap();

        assert_eq!(summary.resolved_terminal, 1);
        let stored = store
            .transfer_by_address(&transfer_address.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, TransferStatus::Cancelled);
        assert!(stored.cancel_sig.is_some());
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let program_id = Pubkey::new_unique();
        let transfer_address = Pubkey::new_unique();

        let store = Arc::new(MemoryMirrorStore::new());
        let mut row = TransferRecord::new_pending(
            &transfer_address.to_string(),
            "sender",
            "recipient",
            10_000_000,
            "tok",
            "pool",
            None,
            None,
            None,
        );
        row.status = TransferStatus::Active;
        store.insert_transfer(&row).await.unwrap();

        let mut ledger = MockLedgerClient::new();
        let keys = vec![transfer_address];
        ledger.expect_get_operation().returning(move |_| {
            Ok(operation(
                keys.clone(),
                vec!["Program log: Instruction: ClaimTransfer"],
            ))
        });
        ledger.expect_fetch_transfer().returning(|_| Ok(None));

        let reconciler = Reconciler::new(Arc::new(ledger), store.clone(), program_id);

        reconciler.reconcile(&Signature::default()).await.unwrap();
        let first = store
            .transfer_by_address(&transfer_address.to_string())
            .await
            .unwrap()
            .unwrap();

        // Replaying the same confirmed operation changes nothing
        let summary = reconciler.reconcile(&Signature::default()).await.unwrap();
        assert!(!summary.untracked_terminal);
        let second = store
            .transfer_by_address(&transfer_address.to_string())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.status, TransferStatus::Claimed);
        assert_eq!(second.status, TransferStatus::Claimed);
        assert_eq!(first.claim_sig, second.claim_sig);
    }

    #[tokio::test]
    async fn test_create_then_cancel_scenario() {
        let program_id = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let pool_address = Pubkey::new_unique();
        let transfer_address = Pubkey::new_unique();
        let store = Arc::new(MemoryMirrorStore::new());

        // Create confirms: the record is live on the ledger
        let state = transfer_state(Pubkey::new_unique(), Pubkey::new_unique(), pool_address);
        let mut pstate = pool_state(mint);
        pstate.transfer_fee_bps = 0;

        let mut ledger = MockLedgerClient::new();
        let keys = vec![transfer_address, pool_address];
        ledger.expect_get_operation().returning(move |_| {
            Ok(operation(
                keys.clone(),
                vec!["Program log: Instruction: CreateTransfer"],
            ))
        });
        ledger.expect_fetch_transfer().returning(move |address| {
            if *address == transfer_address {
                Ok(Some(state.clone()))
            } else {
                Ok(None)
            }
        });
        let ps = pstate.clone();
        ledger.expect_fetch_pool().returning(move |address| {
            if *address == pool_address {
                Ok(Some(ps.clone()))
            } else {
                Ok(None)
            }
        });

        let reconciler = Reconciler::new(Arc::new(ledger), store.clone(), program_id);
        reconciler.reconcile(&Signature::default()).await.unwrap();

        let row = store
            .transfer_by_address(&transfer_address.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, TransferStatus::Active);
        assert_eq!(row.amount, 1_000_000_000);

        // Cancel confirms: the ledger has destroyed the record
        let mut ledger = MockLedgerClient::new();
        let keys = vec![transfer_address, pool_address];
        ledger.expect_get_operation().returning(move |_| {
            Ok(operation(
                keys.clone(),
                vec!["Program log: Instruction: CancelTransfer"],
            ))
        });
        ledger.expect_fetch_transfer().returning(|_| Ok(None));
        let ps = pstate.clone();
        ledger
            .expect_fetch_pool()
            .returning(move |_| Ok(Some(ps.clone())));

        let reconciler = Reconciler::new(Arc::new(ledger), store.clone(), program_id);
        reconciler.reconcile(&Signature::default()).await.unwrap();

        let row = store
            .transfer_by_address(&transfer_address.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, TransferStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_claim_with_fee_scenario() {
        let program_id = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let pool_address = Pubkey::new_unique();
        let transfer_address = Pubkey::new_unique();
        let store = Arc::new(MemoryMirrorStore::new());

        // Create a 10 USDC transfer in a 250-bps pool
        let mut state = transfer_state(Pubkey::new_unique(), Pubkey::new_unique(), pool_address);
        state.amount = 10_000_000;
        let pstate = pool_state(mint);

        let mut ledger = MockLedgerClient::new();
        let keys = vec![transfer_address, pool_address];
        ledger.expect_get_operation().returning(move |_| {
            Ok(operation(
                keys.clone(),
                vec!["Program log: Instruction: CreateTransfer"],
            ))
        });
        ledger.expect_fetch_transfer().returning(move |address| {
            if *address == transfer_address {
                Ok(Some(state.clone()))
            } else {
                Ok(None)
            }
        });
        let ps = pstate.clone();
        ledger.expect_fetch_pool().returning(move |address| {
            if *address == pool_address {
                Ok(Some(ps.clone()))
            } else {
                Ok(None)
            }
        });
        let reconciler = Reconciler::new(Arc::new(ledger), store.clone(), program_id);
        reconciler.reconcile(&Signature::default()).await.unwrap();

        // Claim confirms
        let mut ledger = MockLedgerClient::new();
        let keys = vec![transfer_address, pool_address];
        ledger.expect_get_operation().returning(move |_| {
            Ok(operation(
                keys.clone(),
                vec!["Program log: Instruction: ClaimTransfer"],
            ))
        });
        ledger.expect_fetch_transfer().returning(|_| Ok(None));
        let ps = pstate.clone();
        ledger
            .expect_fetch_pool()
            .returning(move |_| Ok(Some(ps.clone())));
        let reconciler = Reconciler::new(Arc::new(ledger), store.clone(), program_id);
        reconciler.reconcile(&Signature::default()).await.unwrap();

        let row = store
            .transfer_by_address(&transfer_address.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, TransferStatus::Claimed);

        // The query side reports the 250-bps net payout
        let query = crate::query::QueryService::new(store);
        let view = query
            .transfer_by_address(&transfer_address.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.net_amount, "9750000");
    }

    #[tokio::test]
    async fn test_untracked_terminal_is_flagged_not_fatal() {
        let program_id = Pubkey::new_unique();
        let unknown = Pubkey::new_unique();

        let mut ledger = MockLedgerClient::new();
        let keys = vec![unknown];
        ledger.expect_get_operation().returning(move |_| {
            Ok(operation(
                keys.clone(),
                vec!["Program log: Instruction: ExpireTransfer"],
            ))
        });
        ledger.expect_fetch_transfer().returning(|_| Ok(None));

        let store = Arc::new(MemoryMirrorStore::new());
        let reconciler = Reconciler::new(Arc::new(ledger), store, program_id);

        let summary = reconciler.reconcile(&Signature::default()).await.unwrap();
        assert!(summary.untracked_terminal);
        assert_eq!(summary.resolved_terminal, 0);
    }

    #[tokio::test]
    async fn test_conflicting_terminal_never_overwrites() {
        let program_id = Pubkey::new_unique();
        let transfer_address = Pubkey::new_unique();

        let store = Arc::new(MemoryMirrorStore::new());
        let mut row = TransferRecord::new_pending(
            &transfer_address.to_string(),
            "sender",
            "recipient",
            10_000_000,
            "tok",
            "pool",
            None,
            None,
            None,
        );
        row.status = TransferStatus::Claimed;
        store.insert_transfer(&row).await.unwrap();

        let mut ledger = MockLedgerClient::new();
        let keys = vec![transfer_address];
        ledger.expect_get_operation().returning(move |_| {
            Ok(operation(
                keys.clone(),
                vec!["Program log: Instruction: CancelTransfer"],
            ))
        });
        ledger.expect_fetch_transfer().returning(|_| Ok(None));

        let reconciler = Reconciler::new(Arc::new(ledger), store.clone(), program_id);
        let summary = reconciler.reconcile(&Signature::default()).await.unwrap();

        assert_eq!(summary.resolved_terminal, 0);
        // The row was tracked - the conflict is logged, not an untracked gap
        assert!(!summary.untracked_terminal);
        let stored = store
            .transfer_by_address(&transfer_address.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, TransferStatus::Claimed);
    }
}
