//! Payflow API Server
//!
//! Run modes:
//!   payflow-api api     - start the HTTP API (build / submit / query)
//!   payflow-api sync    - mirror the configured token and named pool, then exit
//!   payflow-api help    - show usage

use std::env;
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signature::Keypair;
use tracing::{info, warn};

use payflow::api::{create_router, ApiState};
use payflow::config::load_keypair_from_file;
use payflow::error::Result;
use payflow::faucet::Faucet;
use payflow::ledger::LedgerClient;
use payflow::store::MirrorStore;
use payflow::{
    logging, AppConfig, QueryService, Reconciler, RpcLedgerClient, SqliteMirrorStore,
    SubmissionGateway, TokenRecord, TxBuilder,
};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("help");

    let result = match mode {
        "api" => run_api().await,
        "sync" => run_sync().await,
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("Payflow - escrowed payment reconciliation service");
    println!();
    println!("Usage:");
    println!("  payflow-api api     Start the HTTP API server");
    println!("  payflow-api sync    Mirror the configured token/pool, then exit");
    println!();
    println!("Configuration is environment-based; see src/config.rs for the");
    println!("full PAYFLOW_* variable reference.");
}

/// Everything the service needs, wired from config
struct App {
    config: AppConfig,
    ledger: Arc<dyn LedgerClient>,
    store: Arc<SqliteMirrorStore>,
    reconciler: Arc<Reconciler>,
}

impl App {
    fn bootstrap() -> Result<Self> {
        let config = AppConfig::from_env()?;
        logging::init_logging(&config.log_level, config.log_json)?;

        info!(
            network = ?config.network,
            rpc = %config.rpc_url,
            program = %config.program_id,
            db = %config.db_path,
            "payflow starting"
        );

        let store = Arc::new(SqliteMirrorStore::new(&config.db_path)?);
        let ledger: Arc<dyn LedgerClient> = Arc::new(RpcLedgerClient::new(
            &config.rpc_url,
            config.program_id,
        ));
        let reconciler = Arc::new(Reconciler::new(
            ledger.clone(),
            store.clone(),
            config.program_id,
        ));

        Ok(Self {
            config,
            ledger,
            store,
            reconciler,
        })
    }

    /// Configured reference token, if any
    fn reference_token(&self) -> Option<TokenRecord> {
        self.config.mint.as_ref().map(|mint| {
            TokenRecord::new(
                mint,
                &self.config.token_name,
                &self.config.token_symbol,
                self.config.token_decimals,
            )
        })
    }

    async fn sync_reference_rows(&self) -> Result<()> {
        self.reconciler
            .sync_reference_rows(
                self.reference_token().as_ref(),
                self.config.pool_name.as_deref(),
            )
            .await?;
        Ok(())
    }
}

async fn run_sync() -> Result<()> {
    let app = App::bootstrap()?;
    app.sync_reference_rows().await?;
    info!("reference rows synced");
    Ok(())
}

async fn run_api() -> Result<()> {
    let app = App::bootstrap()?;
    app.sync_reference_rows().await?;

    let builder = Arc::new(TxBuilder::new(
        app.ledger.clone(),
        app.store.clone(),
        app.config.program_id,
        app.config.token_program(),
    ));
    let gateway = Arc::new(SubmissionGateway::new(
        app.ledger.clone(),
        app.reconciler.clone(),
        Duration::from_secs(app.config.confirm_timeout_secs),
    ));
    let query = Arc::new(QueryService::new(app.store.clone()));

    let faucet = if app.config.faucet_enabled {
        Some(Arc::new(build_faucet(&app)?))
    } else {
        None
    };

    // Background sweep for abandoned optimistic rows
    spawn_pending_sweep(app.store.clone(), app.config.pending_ttl_secs);

    let state = Arc::new(ApiState {
        builder,
        gateway,
        query,
        faucet,
    });
    let router = create_router(state);

    let addr = format!("0.0.0.0:{}", app.config.api_port);
    info!(addr = %addr, "API listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn build_faucet(app: &App) -> Result<Faucet> {
    let signer_path = app.config.resolved_signer_path();
    let signer = match load_keypair_from_file(&signer_path) {
        Ok(keypair) => {
            info!(path = %signer_path, "system signer loaded");
            keypair
        }
        Err(e) => {
            warn!(path = %signer_path, error = %e, "using ephemeral system signer");
            Keypair::new()
        }
    };

    let mint = app
        .config
        .mint
        .as_ref()
        .and_then(|m| m.parse().ok());

    Ok(Faucet::new(
        app.ledger.clone(),
        signer,
        mint,
        app.config.token_program(),
        app.config.token_decimals,
    ))
}

/// Periodically remove PENDING rows whose build was abandoned before signing
fn spawn_pending_sweep(store: Arc<SqliteMirrorStore>, ttl_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600));
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now().timestamp() - ttl_secs as i64;
            match store.sweep_stale_pending(cutoff).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "stale pending transfers swept"),
                Err(e) => warn!(error = %e, "pending sweep failed"),
            }
        }
    });
}
