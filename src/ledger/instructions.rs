//! Ledger Instruction Construction
//!
//! Builds unsigned instructions against the escrow program. Each builder
//! assembles the account list in the exact order the on-chain instruction
//! context expects, prefixed with the Anchor method discriminator
//! (`sha256("global:<name>")[..8]`) and borsh-encoded arguments.

use borsh::BorshSerialize;
use sha2::{Digest, Sha256};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    sysvar,
};

use crate::pda::{
    associated_token_address, find_pool_address, find_transfer_address, ATA_PROGRAM_ID,
};
use crate::policy::{validate_fee_bps, PolicyError};

/// Anchor instruction discriminator: `sha256("global:<name>")[..8]`
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    let hash = Sha256::digest(format!("global:{}", name).as_bytes());
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&hash[..8]);
    disc
}

fn encode_data<A: BorshSerialize>(name: &str, args: &A) -> Vec<u8> {
    let mut data = instruction_discriminator(name).to_vec();
    data.extend(borsh::to_vec(args).expect("borsh encoding of instruction args"));
    data
}

#[derive(BorshSerialize)]
struct InitPoolArgs {
    pool_id: Pubkey,
    transfer_fee_bps: u16,
}

#[derive(BorshSerialize)]
struct CreateTransferArgs {
    recipient: Pubkey,
    nonce: u64,
    amount: u64,
    memo: String,
    claimable_after: i64,
    claimable_until: i64,
}

/// Instruction plus the derived address of the record it creates
#[derive(Debug, Clone)]
pub struct DerivedInstruction {
    pub instruction: Instruction,
    pub address: Pubkey,
    pub bump: u8,
}

/// Initialize a fee-collecting pool for a mint. Fee rates outside
/// `[0, 10000]` are rejected here, before anything reaches the ledger.
pub fn init_pool(
    program_id: &Pubkey,
    operator: &Pubkey,
    pool_id: &Pubkey,
    mint: &Pubkey,
    transfer_fee_bps: u16,
    token_program: &Pubkey,
) -> Result<DerivedInstruction, PolicyError> {
    let transfer_fee_bps = validate_fee_bps(transfer_fee_bps)?;
    let (pool, bump) = find_pool_address(program_id, pool_id);
    let pool_token_account = associated_token_address(&pool, mint, token_program);

    let accounts = vec![
        AccountMeta::new(*operator, true),
        AccountMeta::new_readonly(*mint, false),
        AccountMeta::new(pool, false),
        AccountMeta::new(pool_token_account, false),
        AccountMeta::new_readonly(*token_program, false),
        AccountMeta::new_readonly(ATA_PROGRAM_ID, false),
        AccountMeta::new_readonly(solana_sdk::system_program::ID, false),
        AccountMeta::new_readonly(sysvar::rent::ID, false),
    ];

    let data = encode_data(
        "init_pool",
        &InitPoolArgs {
            pool_id: *pool_id,
            transfer_fee_bps,
        },
    );

    Ok(DerivedInstruction {
        instruction: Instruction {
            program_id: *program_id,
            accounts,
            data,
        },
        address: pool,
        bump,
    })
}

/// Escrow a new transfer from sender to recipient
#[allow(clippy::too_many_arguments)]
pub fn create_transfer(
    program_id: &Pubkey,
    sender: &Pubkey,
    recipient: &Pubkey,
    pool: &Pubkey,
    mint: &Pubkey,
    nonce: u64,
    amount: u64,
    memo: &str,
    claimable_after: i64,
    claimable_until: i64,
    token_program: &Pubkey,
) -> DerivedInstruction {
    let (transfer, bump) = find_transfer_address(program_id, sender, recipient, nonce);
    let pool_token_account = associated_token_address(pool, mint, token_program);
    let sender_token_account = associated_token_address(sender, mint, token_program);

    let accounts = vec![
        AccountMeta::new(*sender, true),
        AccountMeta::new(*pool, false),
        AccountMeta::new_readonly(*mint, false),
        AccountMeta::new(pool_token_account, false),
        AccountMeta::new(sender_token_account, false),
        AccountMeta::new(transfer, false),
        AccountMeta::new_readonly(*token_program, false),
        AccountMeta::new_readonly(solana_sdk::system_program::ID, false),
        AccountMeta::new_readonly(ATA_PROGRAM_ID, false),
    ];

    let data = encode_data(
        "create_transfer",
        &CreateTransferArgs {
            recipient: *recipient,
            nonce,
            amount,
            memo: memo.to_string(),
            claimable_after,
            claimable_until,
        },
    );

    DerivedInstruction {
        instruction: Instruction {
            program_id: *program_id,
            accounts,
            data,
        },
        address: transfer,
        bump,
    }
}

/// Claim an active transfer as its recipient. The ledger closes the record
/// and refunds rent to the sender, which is why the sender account rides
/// along writable.
pub fn claim_transfer(
    program_id: &Pubkey,
    recipient: &Pubkey,
    pool: &Pubkey,
    mint: &Pubkey,
    transfer: &Pubkey,
    sender: &Pubkey,
    token_program: &Pubkey,
) -> Instruction {
    let pool_token_account = associated_token_address(pool, mint, token_program);
    let recipient_token_account = associated_token_address(recipient, mint, token_program);

    let accounts = vec![
        AccountMeta::new(*recipient, true),
        AccountMeta::new(*pool, false),
        AccountMeta::new_readonly(*mint, false),
        AccountMeta::new(pool_token_account, false),
        AccountMeta::new(recipient_token_account, false),
        AccountMeta::new(*transfer, false),
        AccountMeta::new(*sender, false),
        AccountMeta::new_readonly(*token_program, false),
    ];

    Instruction {
        program_id: *program_id,
        accounts,
        data: encode_data("claim_transfer", &()),
    }
}

/// Cancel an active transfer as its sender, refunding the full gross amount
pub fn cancel_transfer(
    program_id: &Pubkey,
    sender: &Pubkey,
    pool: &Pubkey,
    mint: &Pubkey,
    transfer: &Pubkey,
    token_program: &Pubkey,
) -> Instruction {
    let pool_token_account = associated_token_address(pool, mint, token_program);
    let sender_token_account = associated_token_address(sender, mint, token_program);

    let accounts = vec![
        AccountMeta::new(*sender, true),
        AccountMeta::new(*pool, false),
        AccountMeta::new_readonly(*mint, false),
        AccountMeta::new(pool_token_account, false),
        AccountMeta::new(sender_token_account, false),
        AccountMeta::new(*transfer, false),
        AccountMeta::new_readonly(*token_program, false),
    ];

    Instruction {
        program_id: *program_id,
        accounts,
        data: encode_data("cancel_transfer", &()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pda::TOKEN_PROGRAM_ID;

    #[test]
    fn test_discriminator_is_stable() {
        let a = instruction_discriminator("create_transfer");
        let b = instruction_discriminator("create_transfer");
        assert_eq!(a, b);
        assert_ne!(a, instruction_discriminator("claim_transfer"));
    }

    #[test]
    fn test_create_transfer_shape() {
        let program_id = Pubkey::new_unique();
        let sender = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let pool = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let built = create_transfer(
            &program_id,
            &sender,
            &recipient,
            &pool,
            &mint,
            7,
            1_000_000,
            "hello",
            0,
            0,
            &TOKEN_PROGRAM_ID,
        );

        let ix = &built.instruction;
        assert_eq!(ix.program_id, program_id);
        assert_eq!(ix.accounts.len(), 9);
        // Sender pays and signs
        assert_eq!(ix.accounts[0].pubkey, sender);
        assert!(ix.accounts[0].is_signer);
        // The derived transfer record rides in slot 5
        assert_eq!(ix.accounts[5].pubkey, built.address);
        assert!(ix.accounts[5].is_writable);
        // Discriminator prefix then borsh args
        assert_eq!(&ix.data[..8], &instruction_discriminator("create_transfer"));
        assert!(ix.data.len() > 8);
    }

    #[test]
    fn test_claim_transfer_carries_sender_for_rent_refund() {
        let program_id = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let pool = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let transfer = Pubkey::new_unique();
        let sender = Pubkey::new_unique();

        let ix = claim_transfer(
            &program_id,
            &recipient,
            &pool,
            &mint,
            &transfer,
            &sender,
            &TOKEN_PROGRAM_ID,
        );

        assert_eq!(ix.accounts.len(), 8);
        assert_eq!(ix.accounts[6].pubkey, sender);
        assert!(ix.accounts[6].is_writable);
        assert!(!ix.accounts[6].is_signer);
        assert_eq!(ix.data, encode_data("claim_transfer", &()));
    }

    #[test]
    fn test_cancel_transfer_signed_by_sender() {
        let program_id = Pubkey::new_unique();
        let sender = Pubkey::new_unique();
        let pool = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let transfer = Pubkey::new_unique();

        let ix = cancel_transfer(
            &program_id,
            &sender,
            &pool,
            &mint,
            &transfer,
            &TOKEN_PROGRAM_ID,
        );

        assert_eq!(ix.accounts[0].pubkey, sender);
        assert!(ix.accounts[0].is_signer);
        assert_eq!(&ix.data[..8], &instruction_discriminator("cancel_transfer"));
    }

    #[test]
    fn test_init_pool_derives_pool_address() {
        let program_id = Pubkey::new_unique();
        let operator = Pubkey::new_unique();
        let pool_id = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let built =
            init_pool(&program_id, &operator, &pool_id, &mint, 250, &TOKEN_PROGRAM_ID).unwrap();

        let (expected, bump) = find_pool_address(&program_id, &pool_id);
        assert_eq!(built.address, expected);
        assert_eq!(built.bump, bump);
        assert_eq!(built.instruction.accounts[2].pubkey, expected);
    }

    #[test]
    fn test_init_pool_rejects_out_of_range_fee() {
        let result = init_pool(
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            10_001,
            &TOKEN_PROGRAM_ID,
        );
        assert!(result.is_err());
    }
}
