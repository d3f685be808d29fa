pub mod handlers;
pub mod types;

use axum::{routing::post, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::account::{CredentialGuard, KeyedStore, LedgerTransfer};
use crate::token::TokenIssuer;

#[derive(Clone)]
pub struct RpcState {
    pub store: Arc<KeyedStore>,
    pub guard: Arc<CredentialGuard>,
    pub ledger: Arc<LedgerTransfer>,
    pub tokens: Arc<TokenIssuer>,
}

pub struct RpcServer {
    state: RpcState,
    bind_addr: String,
}

impl RpcServer {
    pub fn new(
        store: Arc<KeyedStore>,
        guard: Arc<CredentialGuard>,
        ledger: Arc<LedgerTransfer>,
        tokens: Arc<TokenIssuer>,
        port: u16,
    ) -> Self {
        Self {
            state: RpcState {
                store,
                guard,
                ledger,
                tokens,
            },
            bind_addr: format!("0.0.0.0:{}", port),
        }
    }

    pub async fn start(self) {
        let app = Router::new()
            .route("/", post(handlers::handle_rpc_request))
            .layer(CorsLayer::permissive())
            .with_state(self.state);

        let listener = tokio::net::TcpListener::bind(&self.bind_addr)
            .await
            .expect("Failed to bind RPC server");

        tracing::info!("RPC server listening on {}", self.bind_addr);
        axum::serve(listener, app).await.expect("RPC server failed");
    }
}
