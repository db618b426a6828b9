//! Typed Ledger Account Decoding
//!
//! On-chain records arrive as raw bytes: an 8-byte Anchor discriminator
//! followed by borsh-encoded fields. Decoding is tagged per account kind and
//! validated at this boundary - unknown or truncated data is an error here,
//! never untyped bytes flowing into business logic.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Anchor account discriminator: `sha256("account:<StructName>")[..8]`
pub fn account_discriminator(name: &str) -> [u8; 8] {
    let hash = Sha256::digest(format!("account:{}", name).as_bytes());
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&hash[..8]);
    disc
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("account data too short: {0} bytes")]
    TooShort(usize),

    #[error("unknown account discriminator: {0}")]
    UnknownDiscriminator(String),

    #[error("discriminator mismatch: expected {expected}, got {actual}")]
    DiscriminatorMismatch { expected: String, actual: String },

    #[error("borsh decode failed: {0}")]
    Borsh(String),
}

// ============================================================================
// Pool
// ============================================================================

/// On-chain pool record
#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct PoolState {
    pub version: u8,
    pub bump: u8,
    /// Unique pool identifier (hash of the pool name for named pools)
    pub pool_id: Pubkey,
    /// Authorizer for privileged pool operations
    pub operator: Pubkey,
    /// Token mint this pool escrows
    pub mint: Pubkey,
    /// Claim fee in basis points (0-10000)
    pub transfer_fee_bps: u16,
    pub total_deposits: u64,
    pub total_withdrawals: u64,
    /// Amount currently held in escrow
    pub total_escrowed: u64,
    pub total_transfers_created: u64,
    pub total_transfers_resolved: u64,
    /// Fees accumulated for operator withdrawal
    pub collected_fees: u64,
    pub is_paused: bool,
}

impl PoolState {
    pub const DISCRIMINATOR_NAME: &'static str = "Pool";

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        decode_with_discriminator(Self::DISCRIMINATOR_NAME, data)
    }
}

// ============================================================================
// Transfer
// ============================================================================

/// Transfer status as encoded on the ledger. `Active` is the only state in
/// which the record's storage still exists; the rest coincide with the
/// ledger destroying the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum OnchainTransferStatus {
    Active,
    Claimed,
    Cancelled,
    Rejected,
    Expired,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ConditionType {
    TimeDelay,
    MultiSig,
    Oracle,
    Milestone,
}

#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct ReleaseConditions {
    pub condition_type: ConditionType,
    pub params: [u8; 64],
}

/// On-chain escrowed transfer record
#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct TransferState {
    pub version: u8,
    pub bump: u8,
    /// Client-provided nonce used in the address derivation
    pub nonce: u64,
    pub sender: Pubkey,
    pub recipient: Pubkey,
    pub pool: Pubkey,
    /// Gross escrowed amount in raw token units
    pub amount: u64,
    pub created_at: i64,
    /// Claim window start (0 = immediate)
    pub claimable_after: i64,
    /// Claim window end (0 = no deadline)
    pub claimable_until: i64,
    pub status: OnchainTransferStatus,
    pub release_conditions: Option<ReleaseConditions>,
    /// Fixed-size NUL-padded memo
    pub memo: [u8; 64],
    pub compliance_hash: Option<[u8; 32]>,
}

impl TransferState {
    pub const DISCRIMINATOR_NAME: &'static str = "SecureTransfer";

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        decode_with_discriminator(Self::DISCRIMINATOR_NAME, data)
    }

    /// Memo with NUL padding stripped; None when empty
    pub fn memo_string(&self) -> Option<String> {
        let bytes: Vec<u8> = self.memo.iter().copied().filter(|b| *b != 0).collect();
        if bytes.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

// ============================================================================
// Tagged decoder
// ============================================================================

/// A decoded ledger account of any kind this service understands
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerAccount {
    Pool(PoolState),
    Transfer(TransferState),
}

impl LedgerAccount {
    /// Decode raw account data into the matching typed record
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < 8 {
            return Err(DecodeError::TooShort(data.len()));
        }

        let disc: [u8; 8] = data[..8].try_into().expect("checked length");
        if disc == account_discriminator(PoolState::DISCRIMINATOR_NAME) {
            return Ok(LedgerAccount::Pool(PoolState::decode(data)?));
        }
        if disc == account_discriminator(TransferState::DISCRIMINATOR_NAME) {
            return Ok(LedgerAccount::Transfer(TransferState::decode(data)?));
        }

        Err(DecodeError::UnknownDiscriminator(hex::encode(disc)))
    }
}

/// Strip and verify the discriminator, then borsh-decode the payload.
///
/// Accounts are allocated at a fixed size, so decoding must tolerate
/// trailing zero padding - `deserialize` on a mutable slice, not
/// `try_from_slice`.
fn decode_with_discriminator<T: BorshDeserialize>(
    name: &str,
    data: &[u8],
) -> Result<T, DecodeError> {
    if data.len() < 8 {
        return Err(DecodeError::TooShort(data.len()));
    }

    let expected = account_discriminator(name);
    let actual = &data[..8];
    if actual != expected {
        return Err(DecodeError::DiscriminatorMismatch {
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        });
    }

    let mut payload = &data[8..];
    T::deserialize(&mut payload).map_err(|e| DecodeError::Borsh(e.to_string()))
}
