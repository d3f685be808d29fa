use std::sync::Arc;

use clap::Parser;
use tracing::info;

use rust_teller::account::store::AccountStore;
use rust_teller::account::{CredentialGuard, KeyedStore, LedgerTransfer};
use rust_teller::config::TellerConfig;
use rust_teller::rpc::RpcServer;
use rust_teller::storage::Storage;
use rust_teller::token::TokenIssuer;

#[derive(Parser, Debug)]
#[command(name = "rust_teller", about = "Account service with login rate limiting and balance transfers")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "teller.toml")]
    config: String,

    /// Override the RPC port from the config
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the database path from the config
    #[arg(long)]
    db_path: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = TellerConfig::load_or_default(&cli.config);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let db_path = cli.db_path.unwrap_or_else(|| config.server.db_path.clone());
    let port = cli.port.unwrap_or(config.server.rpc_port);

    let storage = match Storage::open(&db_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to open database at {}: {}", db_path, e);
            std::process::exit(1);
        }
    };

    let store = match KeyedStore::with_storage(storage) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to load account store: {}", e);
            std::process::exit(1);
        }
    };
    info!(accounts = store.account_count(), "account store loaded");

    let dyn_store: Arc<dyn AccountStore> = store.clone();
    let guard = Arc::new(CredentialGuard::with_policy(
        dyn_store.clone(),
        config.security.lockout_threshold,
        config.lockout_window_ms(),
        config.security.commit_retry_limit,
    ));
    let ledger = Arc::new(LedgerTransfer::with_retry_limit(
        dyn_store,
        guard.clone(),
        config.security.commit_retry_limit,
    ));
    let tokens = Arc::new(TokenIssuer::new(
        &config.security.token_secret,
        config.token_ttl_ms(),
    ));

    RpcServer::new(store, guard, ledger, tokens, port).start().await;
}
