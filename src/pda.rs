//! Deterministic Address Derivation
//!
//! Every ledger record this service touches lives at a program-derived
//! address computed from stable inputs. Seeds are domain-separated with
//! fixed tags so pool and transfer addresses can never collide:
//!
//! - Pool:     `["pool", pool_id]`
//! - Transfer: `["sender", sender, "recipient", recipient, "nonce", nonce_le]`
//!
//! A named pool gets a stable pseudo-identifier by hashing its human-readable
//! name, so operators can reference pools by name without a registry lookup.

use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;

// Seed tags - must match the on-chain program constants
pub const POOL_SEED: &[u8] = b"pool";
pub const SENDER_SEED: &[u8] = b"sender";
pub const RECIPIENT_SEED: &[u8] = b"recipient";
pub const NONCE_SEED: &[u8] = b"nonce";

/// SPL Token program ID
pub const TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// Token-2022 program ID
pub const TOKEN_2022_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// Associated Token Account program ID
pub const ATA_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Derive the pool address for a pool identifier
pub fn find_pool_address(program_id: &Pubkey, pool_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[POOL_SEED, pool_id.as_ref()], program_id)
}

/// Derive the transfer address for a (sender, recipient, nonce) triple
pub fn find_transfer_address(
    program_id: &Pubkey,
    sender: &Pubkey,
    recipient: &Pubkey,
    nonce: u64,
) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            SENDER_SEED,
            sender.as_ref(),
            RECIPIENT_SEED,
            recipient.as_ref(),
            NONCE_SEED,
            &nonce.to_le_bytes(),
        ],
        program_id,
    )
}

/// Stable pool identifier from a human-readable name (SHA-256 of the name)
pub fn named_pool_id(name: &str) -> Pubkey {
    let hash = Sha256::digest(name.as_bytes());
    Pubkey::new_from_array(hash.into())
}

/// Compute the associated token address for an owner and mint
pub fn associated_token_address(
    owner: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_ID,
    )
    .0
}
