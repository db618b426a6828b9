//! Devnet Funding Faucet
//!
//! Funds developer wallets with gas money and test tokens, signed by the
//! system signer (which is the test mint's authority). Per-wallet cooldown
//! is enforced in memory. Only wired up when the network allows it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    system_instruction,
    transaction::{Transaction, VersionedTransaction},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::ledger::{LedgerClient, LedgerError};
use crate::pda::{associated_token_address, ATA_PROGRAM_ID};

/// SOL dropped per request
const SOL_DROP_LAMPORTS: u64 = 100_000_000; // 0.1 SOL

/// Display-unit tokens minted per request
const TOKEN_DROP_UI: u64 = 100;

/// Per-wallet cooldown between requests
const COOLDOWN: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Error)]
pub enum FaucetError {
    #[error("rate limited: try again in {0} seconds")]
    RateLimited(u64),

    #[error("token faucet not configured")]
    NotConfigured,

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl FaucetError {
    pub fn error_code(&self) -> &'static str {
        match self {
            FaucetError::RateLimited(_) => "RATE_LIMITED",
            FaucetError::NotConfigured => "FAUCET_NOT_CONFIGURED",
            FaucetError::Ledger(_) => "LEDGER_ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DropDetail {
    pub amount: f64,
    pub signature: String,
}

/// What a faucet request delivered
#[derive(Debug, Clone, Default, Serialize)]
pub struct FaucetDrop {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sol: Option<DropDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<DropDetail>,
}

/// Rate-limited wallet funding utility
pub struct Faucet {
    ledger: Arc<dyn LedgerClient>,
    signer: Keypair,
    mint: Option<Pubkey>,
    token_program: Pubkey,
    token_decimals: u8,
    last_request: Mutex<HashMap<String, Instant>>,
}

impl Faucet {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        signer: Keypair,
        mint: Option<Pubkey>,
        token_program: Pubkey,
        token_decimals: u8,
    ) -> Self {
        Self {
            ledger,
            signer,
            mint,
            token_program,
            token_decimals,
            last_request: Mutex::new(HashMap::new()),
        }
    }

    /// Fund a wallet with SOL and/or tokens in a single transaction
    pub async fn fund(
        &self,
        wallet: &Pubkey,
        sol: bool,
        token: bool,
    ) -> Result<FaucetDrop, FaucetError> {
        if token && self.mint.is_none() {
            return Err(FaucetError::NotConfigured);
        }

        self.check_rate_limit(&wallet.to_string()).await?;

        let mut instructions = Vec::new();

        if sol {
            instructions.push(system_instruction::transfer(
                &self.signer.pubkey(),
                wallet,
                SOL_DROP_LAMPORTS,
            ));
        }

        let token_amount_raw = TOKEN_DROP_UI * 10u64.pow(self.token_decimals as u32);
        if token {
            let mint = self.mint.expect("checked above");
            let ata = associated_token_address(wallet, &mint, &self.token_program);
            instructions.push(self.create_ata_idempotent(wallet, &ata, &mint));
            instructions.push(self.mint_to(&mint, &ata, token_amount_raw));
        }

        let blockhash = self.ledger.latest_blockhash().await?;
        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&self.signer.pubkey()),
            &[&self.signer],
            blockhash,
        );

        let signature = self
            .ledger
            .send_transaction(&VersionedTransaction::from(transaction))
            .await?;
        self.ledger
            .confirm_signature(&signature, Duration::from_secs(60))
            .await?;

        self.mark_request(&wallet.to_string()).await;
        info!(wallet = %wallet, signature = %signature, sol, token, "faucet drop confirmed");

        let mut drop = FaucetDrop::default();
        if sol {
            drop.sol = Some(DropDetail {
                amount: SOL_DROP_LAMPORTS as f64 / 1e9,
                signature: signature.to_string(),
            });
        }
        if token {
            drop.token = Some(DropDetail {
                amount: TOKEN_DROP_UI as f64,
                signature: signature.to_string(),
            });
        }
        Ok(drop)
    }

    /// Idempotent associated-token-account creation, so funding an already
    /// initialized wallet is not an error
    fn create_ata_idempotent(&self, owner: &Pubkey, ata: &Pubkey, mint: &Pubkey) -> Instruction {
        Instruction {
            program_id: ATA_PROGRAM_ID,
            accounts: vec![
                AccountMeta::new(self.signer.pubkey(), true),
                AccountMeta::new(*ata, false),
                AccountMeta::new_readonly(*owner, false),
                AccountMeta::new_readonly(*mint, false),
                AccountMeta::new_readonly(solana_sdk::system_program::ID, false),
                AccountMeta::new_readonly(self.token_program, false),
            ],
            // CreateIdempotent
            data: vec![1],
        }
    }

    /// SPL token MintTo, authorized by the system signer
    fn mint_to(&self, mint: &Pubkey, destination: &Pubkey, amount: u64) -> Instruction {
        let mut data = vec![7u8]; // MintTo
        data.extend_from_slice(&amount.to_le_bytes());
        Instruction {
            program_id: self.token_program,
            accounts: vec![
                AccountMeta::new(*mint, false),
                AccountMeta::new(*destination, false),
                AccountMeta::new_readonly(self.signer.pubkey(), true),
            ],
            data,
        }
    }

    async fn check_rate_limit(&self, key: &str) -> Result<(), FaucetError> {
        let last = self.last_request.lock().await;
        if let Some(at) = last.get(key) {
            let elapsed = at.elapsed();
            if elapsed < COOLDOWN {
                return Err(FaucetError::RateLimited((COOLDOWN - elapsed).as_secs()));
            }
        }
        Ok(())
    }

    async fn mark_request(&self, key: &str) {
        self.last_request
            .lock()
            .await
            .insert(key.to_string(), Instant::now());
    }
}
