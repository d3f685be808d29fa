use super::types::*;
use crate::account::store::AccountStore;
use crate::error::TellerError;
use crate::rpc::RpcState;
use axum::{debug_handler, extract::State, Json};
use tracing::{debug, info};

/// Main dispatcher: routes incoming JSON-RPC requests to the correct handler.
#[debug_handler]
pub async fn handle_rpc_request(
    State(state): State<RpcState>,
    Json(req): Json<RpcRequest>,
) -> Json<RpcResponse> {
    debug!("RPC Request: method={}, id={}", req.method, req.id);

    // Dispatch based on method name
    let result = match req.method.as_str() {
        "login" => handle_login(state.clone(), req.params).await,
        "transfer" => handle_transfer(state.clone(), req.params).await,
        "getAccountInfo" => handle_get_account_info(state.clone(), req.params).await,
        "getBalance" => handle_get_balance(state.clone(), req.params).await,
        "createAccount" => handle_create_account(state.clone(), req.params).await,
        "getVersion" => handle_get_version().await,
        _ => Err(RpcError {
            code: -32601,
            message: format!("Method not found: {}", req.method),
        }),
    };

    // Build response
    match result {
        Ok(val) => Json(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(val),
            error: None,
            id: req.id,
        }),
        Err(err) => Json(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(err),
            id: req.id,
        }),
    }
}

//
// === Helper Functions ===
//

/// Parse method params into their typed form
fn parse_params<T: serde::de::DeserializeOwned>(
    params: serde_json::Value,
) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError {
        code: -32602,
        message: format!("Invalid params: {}", e),
    })
}

/// Safely serialize to JSON value
fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError {
        code: -32603,
        message: format!("Serialization error: {}", e),
    })
}

/// Run Argon2 verification and commit-retry backoff off the async runtime
/// threads.
async fn run_blocking<F>(f: F) -> Result<serde_json::Value, RpcError>
where
    F: FnOnce() -> Result<serde_json::Value, RpcError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| RpcError {
        code: -32603,
        message: format!("Internal error: {}", e),
    })?
}

fn rpc_error(err: &TellerError) -> RpcError {
    let code = match err {
        TellerError::AccountLocked => -32030,
        TellerError::InvalidCredentials => -32031,
        TellerError::AccountNotFound => -32032,
        TellerError::ReceiverNotFound => -32033,
        TellerError::InsufficientBalance => -32034,
        TellerError::InvalidAmount => -32035,
        TellerError::VersionConflict => -32036,
        TellerError::AccountExists => -32037,
        TellerError::IdempotencyConflict => -32038,
        TellerError::PersistenceFailure(_) => -32603,
    };
    RpcError {
        code,
        message: err.to_string(),
    }
}

//
// === Individual Handlers ===
//

/// Handle login(email, password)
///
/// Attempt bookkeeping runs first and exactly once per request; the
/// credential check runs afterwards regardless of the outcome so that a
/// locked or unknown identity costs the same wall time as a wrong password.
async fn handle_login(
    state: RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: LoginParams = parse_params(params)?;
    let guard = state.guard.clone();
    let tokens = state.tokens.clone();

    run_blocking(move || {
        let decision = match guard.evaluate_attempt(&p.email) {
            Ok(d) => Some(d),
            // Unknown identities fall through to the dummy-hash check below
            // and surface exactly like a wrong password.
            Err(TellerError::AccountNotFound) => None,
            Err(e) => return Err(rpc_error(&e)),
        };

        let credentials = guard.check_credentials(&p.email, &p.password);

        if let Some(d) = &decision {
            if !d.allowed {
                return Err(rpc_error(&TellerError::AccountLocked));
            }
        }

        match credentials {
            Ok(account) => {
                guard
                    .reset_attempts(&account.email)
                    .map_err(|e| rpc_error(&e))?;
                let token = tokens.issue(&account.email, &account.id);
                info!(email = %account.email, "login succeeded");
                to_json(&LoginResponse {
                    email: account.email,
                    name: account.name,
                    account_id: account.id,
                    token,
                })
            }
            Err(_) => {
                if let Some(d) = &decision {
                    debug!(email = %p.email, attempts = d.attempts, "login failed");
                }
                // One response for wrong secrets and unknown identities
                // alike; the attempt count stays in the logs so the body
                // does not reveal which emails are registered.
                Err(rpc_error(&TellerError::InvalidCredentials))
            }
        }
    })
    .await
}

/// Handle transfer(sender_email, password, receiver_ref, amount)
async fn handle_transfer(
    state: RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: TransferParams = parse_params(params)?;
    let ledger = state.ledger.clone();

    run_blocking(move || {
        let receipt = ledger
            .transfer(
                &p.sender_email,
                &p.password,
                &p.receiver_ref,
                p.amount,
                p.idempotency_key.as_deref(),
            )
            .map_err(|e| rpc_error(&e))?;

        to_json(&receipt)
    })
    .await
}

/// Handle getAccountInfo(email)
async fn handle_get_account_info(
    state: RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: GetAccountInfoParams = parse_params(params)?;

    let account = state
        .store
        .find_by_identity(&p.email)
        .ok_or_else(|| rpc_error(&TellerError::AccountNotFound))?;

    to_json(&AccountInfo {
        id: account.id,
        name: account.name,
        email: account.email,
        account_ref: account.account_ref,
        balance: account.balance,
        created_at: account.created_at,
    })
}

/// Handle getBalance(account_ref)
async fn handle_get_balance(
    state: RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: GetBalanceParams = parse_params(params)?;

    let account = state
        .store
        .find_by_reference(&p.account_ref)
        .ok_or_else(|| rpc_error(&TellerError::AccountNotFound))?;

    to_json(&GetBalanceResponse {
        account_ref: account.account_ref,
        name: account.name,
        balance: account.balance,
    })
}

/// Handle createAccount(name, email, password, account_ref)
async fn handle_create_account(
    state: RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: CreateAccountParams = parse_params(params)?;

    if p.password.len() < 8 {
        return Err(RpcError {
            code: -32602,
            message: "Invalid params: password must be at least 8 characters".to_string(),
        });
    }

    let store = state.store.clone();

    run_blocking(move || {
        let account = store
            .create_account(
                &p.name,
                &p.email,
                &p.password,
                &p.account_ref,
                p.opening_balance,
            )
            .map_err(|e| rpc_error(&e))?;

        info!(email = %account.email, "account created");
        to_json(&AccountInfo {
            id: account.id,
            name: account.name,
            email: account.email,
            account_ref: account.account_ref,
            balance: account.balance,
            created_at: account.created_at,
        })
    })
    .await
}

/// Handle getVersion()
async fn handle_get_version() -> Result<serde_json::Value, RpcError> {
    Ok(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }))
}
