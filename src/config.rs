//! Environment-based Configuration
//!
//! All runtime settings come from environment variables, loaded once at
//! startup into an `AppConfig` that is passed to every component at
//! construction time - no process-wide singletons.
//!
//! # Environment Variables
//!
//! ## Network
//! - `PAYFLOW_NETWORK` - "mainnet", "testnet", or "devnet" (default: "devnet")
//! - `PAYFLOW_RPC_URL` - ledger RPC endpoint (default per network)
//! - `PAYFLOW_PROGRAM_ID` - escrow program id (required outside devnet)
//!
//! ## Reference data
//! - `PAYFLOW_POOL_NAME` - named pool to mirror at boot
//! - `PAYFLOW_MINT` - curated token mint
//! - `PAYFLOW_TOKEN_SYMBOL` / `PAYFLOW_TOKEN_NAME` / `PAYFLOW_TOKEN_DECIMALS`
//! - `PAYFLOW_TOKEN_2022` - set to "1" when the mint is a Token-2022 mint
//!
//! ## Service
//! - `PAYFLOW_SIGNER_KEYPAIR` - path to the system signer (Solana CLI JSON)
//! - `PAYFLOW_DB_PATH` - mirror database path (default: data/payflow.db)
//! - `PAYFLOW_API_PORT` - HTTP port (default: 3001)
//! - `PAYFLOW_CONFIRM_TIMEOUT_SECS` - confirmation wait bound (default: 60)
//! - `PAYFLOW_PENDING_TTL_SECS` - pending-row sweep age (default: 3600)
//! - `PAYFLOW_FAUCET` - "1" enables the devnet faucet
//! - `PAYFLOW_LOG_LEVEL` / `PAYFLOW_LOG_JSON`

use std::env;
use std::str::FromStr;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("faucet not allowed on {0}")]
    FaucetNotAllowed(String),

    #[error("invalid keypair: {0}")]
    InvalidKeypair(String),
}

/// Network environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "mainnet-beta" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "devnet" | "dev" => Ok(Network::Devnet),
            _ => Err(ConfigError::InvalidValue(
                "PAYFLOW_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Faucet funding is a development convenience only
    pub fn allows_faucet(&self) -> bool {
        matches!(self, Network::Devnet | Network::Testnet)
    }

    pub fn default_rpc(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.mainnet-beta.solana.com",
            Network::Testnet => "https://api.testnet.solana.com",
            Network::Devnet => "https://api.devnet.solana.com",
        }
    }
}

/// Main configuration struct, constructed once and injected everywhere
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub network: Network,
    pub rpc_url: String,
    /// Escrow program id on the ledger
    pub program_id: Pubkey,
    /// Named pool mirrored at boot
    pub pool_name: Option<String>,
    /// Curated token mint and metadata
    pub mint: Option<String>,
    pub token_symbol: String,
    pub token_name: String,
    pub token_decimals: u8,
    /// Whether the mint uses the Token-2022 program
    pub token_2022: bool,
    /// System signer keypair path (faucet, operational transactions)
    pub signer_path: Option<String>,
    pub db_path: String,
    pub api_port: u16,
    pub confirm_timeout_secs: u64,
    pub pending_ttl_secs: u64,
    pub faucet_enabled: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let network: Network = env::var("PAYFLOW_NETWORK")
            .unwrap_or_else(|_| "devnet".to_string())
            .parse()?;

        let rpc_url =
            env::var("PAYFLOW_RPC_URL").unwrap_or_else(|_| network.default_rpc().to_string());

        let program_id_str = get_required_or_devnet_default(
            "PAYFLOW_PROGRAM_ID",
            "HZ8paEkYZ2hKBwHoVk23doSLEad9K5duASRTGaYogmfg",
            network,
        )?;
        let program_id = Pubkey::from_str(&program_id_str).map_err(|e| {
            ConfigError::InvalidValue("PAYFLOW_PROGRAM_ID".to_string(), e.to_string())
        })?;

        let mint = env::var("PAYFLOW_MINT").ok();
        if let Some(mint) = &mint {
            Pubkey::from_str(mint).map_err(|e| {
                ConfigError::InvalidValue("PAYFLOW_MINT".to_string(), e.to_string())
            })?;
        }

        let token_decimals = match env::var("PAYFLOW_TOKEN_DECIMALS") {
            Ok(v) => v.parse().map_err(|_| {
                ConfigError::InvalidValue(
                    "PAYFLOW_TOKEN_DECIMALS".to_string(),
                    "must be a number".to_string(),
                )
            })?,
            Err(_) => 6,
        };

        let faucet_enabled = env::var("PAYFLOW_FAUCET").map(|v| v == "1").unwrap_or(false);
        if faucet_enabled && !network.allows_faucet() {
            return Err(ConfigError::FaucetNotAllowed(format!("{:?}", network)));
        }

        Ok(Self {
            network,
            rpc_url,
            program_id,
            pool_name: env::var("PAYFLOW_POOL_NAME").ok(),
            mint,
            token_symbol: env::var("PAYFLOW_TOKEN_SYMBOL").unwrap_or_else(|_| "USDC".to_string()),
            token_name: env::var("PAYFLOW_TOKEN_NAME").unwrap_or_else(|_| "USD Coin".to_string()),
            token_decimals,
            token_2022: env::var("PAYFLOW_TOKEN_2022").map(|v| v == "1").unwrap_or(false),
            signer_path: env::var("PAYFLOW_SIGNER_KEYPAIR").ok(),
            db_path: env::var("PAYFLOW_DB_PATH").unwrap_or_else(|_| "data/payflow.db".to_string()),
            api_port: env::var("PAYFLOW_API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            confirm_timeout_secs: env::var("PAYFLOW_CONFIRM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            pending_ttl_secs: env::var("PAYFLOW_PENDING_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            faucet_enabled,
            log_level: env::var("PAYFLOW_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("PAYFLOW_LOG_JSON").map(|v| v == "1").unwrap_or(false),
        })
    }

    /// Token program the configured mint lives under
    pub fn token_program(&self) -> Pubkey {
        if self.token_2022 {
            crate::pda::TOKEN_2022_PROGRAM_ID
        } else {
            crate::pda::TOKEN_PROGRAM_ID
        }
    }

    /// Default signer path following the Solana CLI convention
    pub fn resolved_signer_path(&self) -> String {
        self.signer_path.clone().unwrap_or_else(|| {
            let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
            format!("{}/.config/solana/id.json", home)
        })
    }
}

/// Get required env var, or use the default on devnet only
fn get_required_or_devnet_default(
    var_name: &str,
    devnet_default: &str,
    network: Network,
) -> Result<String, ConfigError> {
    match env::var(var_name) {
        Ok(value) => Ok(value),
        Err(_) => {
            if network == Network::Devnet {
                Ok(devnet_default.to_string())
            } else {
                Err(ConfigError::MissingEnvVar(var_name.to_string()))
            }
        }
    }
}

/// Load a keypair from a Solana CLI-style JSON byte-array file
pub fn load_keypair_from_file(path: &str) -> Result<Keypair, ConfigError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidKeypair(e.to_string()))?;
    let bytes: Vec<u8> =
        serde_json::from_str(&content).map_err(|e| ConfigError::InvalidKeypair(e.to_string()))?;
    Keypair::try_from(bytes.as_slice()).map_err(|e| ConfigError::InvalidKeypair(e.to_string()))
}
