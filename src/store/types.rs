//! Mirror Record Types
//!
//! Local rows mirroring ledger state: tokens, pools, transfers. A transfer's
//! status is the heart of the mirror - `PENDING` exists only here (an
//! optimistic row inserted before the client has even signed), `ACTIVE` is
//! the sole non-terminal ledger state, and the five terminal states are
//! final: once written they are never downgraded and never replaced by a
//! different terminal value.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::accounts::{OnchainTransferStatus, PoolState, TransferState};

/// Unix timestamp in seconds
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============================================================================
// Transfer status
// ============================================================================

/// Mirror-side transfer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    /// Optimistic row for a built-but-unconfirmed create
    Pending,
    Active,
    Claimed,
    Cancelled,
    Rejected,
    Declined,
    Expired,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending | TransferStatus::Active)
    }

    fn rank(&self) -> u8 {
        match self {
            TransferStatus::Pending => 0,
            TransferStatus::Active => 1,
            _ => 2,
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Active => "ACTIVE",
            TransferStatus::Claimed => "CLAIMED",
            TransferStatus::Cancelled => "CANCELLED",
            TransferStatus::Rejected => "REJECTED",
            TransferStatus::Declined => "DECLINED",
            TransferStatus::Expired => "EXPIRED",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransferStatus::Pending),
            "ACTIVE" => Ok(TransferStatus::Active),
            "CLAIMED" => Ok(TransferStatus::Claimed),
            "CANCELLED" => Ok(TransferStatus::Cancelled),
            "REJECTED" => Ok(TransferStatus::Rejected),
            "DECLINED" => Ok(TransferStatus::Declined),
            "EXPIRED" => Ok(TransferStatus::Expired),
            other => Err(format!("unknown transfer status: {}", other)),
        }
    }
}

impl From<OnchainTransferStatus> for TransferStatus {
    fn from(status: OnchainTransferStatus) -> Self {
        match status {
            OnchainTransferStatus::Active => TransferStatus::Active,
            OnchainTransferStatus::Claimed => TransferStatus::Claimed,
            OnchainTransferStatus::Cancelled => TransferStatus::Cancelled,
            OnchainTransferStatus::Rejected => TransferStatus::Rejected,
            OnchainTransferStatus::Expired => TransferStatus::Expired,
            OnchainTransferStatus::Declined => TransferStatus::Declined,
        }
    }
}

/// Outcome of applying an incoming status to a stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// Incoming status wins
    Apply,
    /// Duplicate or stale write; keep the stored status
    NoOp,
    /// Two different terminal statuses for the same transfer - a
    /// data-integrity violation that must never be written
    Conflict,
}

/// The status guard. Terminal statuses are monotone: they never revert and
/// never change into a different terminal value.
pub fn status_transition(current: TransferStatus, incoming: TransferStatus) -> StatusTransition {
    if current == incoming {
        return StatusTransition::NoOp;
    }
    if current.is_terminal() {
        if incoming.is_terminal() {
            return StatusTransition::Conflict;
        }
        return StatusTransition::NoOp;
    }
    if incoming.rank() > current.rank() {
        StatusTransition::Apply
    } else {
        StatusTransition::NoOp
    }
}

// ============================================================================
// Records
// ============================================================================

/// Fungible asset descriptor, created lazily on first reference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenRecord {
    pub id: String,
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub created_at: i64,
}

impl TokenRecord {
    pub fn new(mint: &str, name: &str, symbol: &str, decimals: u8) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            mint: mint.to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            created_at: now_ts(),
        }
    }

    /// Placeholder row for a mint with unknown metadata, corrected later by
    /// operator curation
    pub fn placeholder(mint: &str) -> Self {
        Self::new(mint, "Unknown", "UNK", 6)
    }
}

/// Fee-collecting vault scoped to one token. Counter fields are advisory;
/// a fresh ledger read always supersedes them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolRecord {
    pub id: String,
    pub pool_id: String,
    pub address: String,
    pub operator: String,
    pub token_id: String,
    pub fee_bps: u16,
    pub total_deposits: u64,
    pub total_withdrawals: u64,
    pub total_escrowed: u64,
    pub total_transfers_created: u64,
    pub total_transfers_resolved: u64,
    pub collected_fees: u64,
    pub is_paused: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PoolRecord {
    /// Materialize a mirror row from a freshly read ledger record
    pub fn from_state(address: &str, state: &PoolState, token_id: &str) -> Self {
        let now = now_ts();
        Self {
            id: Uuid::new_v4().to_string(),
            pool_id: state.pool_id.to_string(),
            address: address.to_string(),
            operator: state.operator.to_string(),
            token_id: token_id.to_string(),
            fee_bps: state.transfer_fee_bps,
            total_deposits: state.total_deposits,
            total_withdrawals: state.total_withdrawals,
            total_escrowed: state.total_escrowed,
            total_transfers_created: state.total_transfers_created,
            total_transfers_resolved: state.total_transfers_resolved,
            collected_fees: state.collected_fees,
            is_paused: state.is_paused,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite advisory counters from a fresh ledger read
    pub fn apply_state(&mut self, state: &PoolState) {
        self.fee_bps = state.transfer_fee_bps;
        self.total_deposits = state.total_deposits;
        self.total_withdrawals = state.total_withdrawals;
        self.total_escrowed = state.total_escrowed;
        self.total_transfers_created = state.total_transfers_created;
        self.total_transfers_resolved = state.total_transfers_resolved;
        self.collected_fees = state.collected_fees;
        self.is_paused = state.is_paused;
        self.updated_at = now_ts();
    }
}

/// One escrowed payment, keyed by its derived address
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferRecord {
    pub id: String,
    pub address: String,
    pub sender: String,
    pub recipient: String,
    /// Gross amount in raw token units
    pub amount: u64,
    pub token_id: String,
    pub pool_id: String,
    pub status: TransferStatus,
    pub memo: Option<String>,
    /// Signature of the confirmed create operation (absent while PENDING)
    pub create_sig: Option<String>,
    pub claim_sig: Option<String>,
    pub cancel_sig: Option<String>,
    pub claimable_after: Option<i64>,
    pub claimable_until: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TransferRecord {
    /// Optimistic row inserted by the builder before the client signs
    #[allow(clippy::too_many_arguments)]
    pub fn new_pending(
        address: &str,
        sender: &str,
        recipient: &str,
        amount: u64,
        token_id: &str,
        pool_id: &str,
        memo: Option<String>,
        claimable_after: Option<i64>,
        claimable_until: Option<i64>,
    ) -> Self {
        let now = now_ts();
        Self {
            id: Uuid::new_v4().to_string(),
            address: address.to_string(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount,
            token_id: token_id.to_string(),
            pool_id: pool_id.to_string(),
            status: TransferStatus::Pending,
            memo,
            create_sig: None,
            claim_sig: None,
            cancel_sig: None,
            claimable_after,
            claimable_until,
            created_at: now,
            updated_at: now,
        }
    }

    /// Confirmed row rebuilt from a live ledger record
    pub fn from_state(
        address: &str,
        state: &TransferState,
        token_id: &str,
        pool_id: &str,
        create_sig: &str,
    ) -> Self {
        let window = |v: i64| if v == 0 { None } else { Some(v) };
        let now = now_ts();
        Self {
            id: Uuid::new_v4().to_string(),
            address: address.to_string(),
            sender: state.sender.to_string(),
            recipient: state.recipient.to_string(),
            amount: state.amount,
            token_id: token_id.to_string(),
            pool_id: pool_id.to_string(),
            status: state.status.into(),
            memo: state.memo_string(),
            create_sig: Some(create_sig.to_string()),
            claim_sig: None,
            cancel_sig: None,
            claimable_after: window(state.claimable_after),
            claimable_until: window(state.claimable_until),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TERMINAL: [TransferStatus; 5] = [
        TransferStatus::Claimed,
        TransferStatus::Cancelled,
        TransferStatus::Rejected,
        TransferStatus::Declined,
        TransferStatus::Expired,
    ];

    #[test]
    fn test_status_round_trip() {
        for status in [
            TransferStatus::Pending,
            TransferStatus::Active,
            TransferStatus::Claimed,
            TransferStatus::Cancelled,
            TransferStatus::Rejected,
            TransferStatus::Declined,
            TransferStatus::Expired,
        ] {
            let parsed: TransferStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_pending_and_active_are_not_terminal() {
        assert!(!TransferStatus::Pending.is_terminal());
        assert!(!TransferStatus::Active.is_terminal());
        for t in TERMINAL {
            assert!(t.is_terminal());
        }
    }

    #[test]
    fn test_forward_transitions_apply() {
        assert_eq!(
            status_transition(TransferStatus::Pending, TransferStatus::Active),
            StatusTransition::Apply
        );
        for t in TERMINAL {
            assert_eq!(
                status_transition(TransferStatus::Active, t),
                StatusTransition::Apply
            );
            assert_eq!(
                status_transition(TransferStatus::Pending, t),
                StatusTransition::Apply
            );
        }
    }

    #[test]
    fn test_terminal_never_downgrades() {
        for t in TERMINAL {
            assert_eq!(
                status_transition(t, TransferStatus::Active),
                StatusTransition::NoOp
            );
            assert_eq!(
                status_transition(t, TransferStatus::Pending),
                StatusTransition::NoOp
            );
            assert_eq!(status_transition(t, t), StatusTransition::NoOp);
        }
    }

    #[test]
    fn test_conflicting_terminals_detected() {
        assert_eq!(
            status_transition(TransferStatus::Claimed, TransferStatus::Cancelled),
            StatusTransition::Conflict
        );
        assert_eq!(
            status_transition(TransferStatus::Expired, TransferStatus::Claimed),
            StatusTransition::Conflict
        );
    }

    #[test]
    fn test_active_does_not_revert_to_pending() {
        assert_eq!(
            status_transition(TransferStatus::Active, TransferStatus::Pending),
            StatusTransition::NoOp
        );
    }

    #[test]
    fn test_claim_window_zero_means_none() {
        let state = crate::ledger::accounts::TransferState {
            version: 1,
            bump: 0,
            nonce: 1,
            sender: solana_sdk::pubkey::Pubkey::new_unique(),
            recipient: solana_sdk::pubkey::Pubkey::new_unique(),
            pool: solana_sdk::pubkey::Pubkey::new_unique(),
            amount: 5,
            created_at: 0,
            claimable_after: 0,
            claimable_until: 1_800_000_000,
            status: OnchainTransferStatus::Active,
            release_conditions: None,
            memo: [0u8; 64],
            compliance_hash: None,
        };
        let record = TransferRecord::from_state("addr", &state, "tok", "pool", "sig");
        assert_eq!(record.claimable_after, None);
        assert_eq!(record.claimable_until, Some(1_800_000_000));
        assert_eq!(record.status, TransferStatus::Active);
        assert_eq!(record.memo, None);
    }
}
