// RPC types for JSON-RPC 2.0 protocol
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
    pub id: u64,
}

#[derive(Serialize, Debug)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: u64,
}

#[derive(Serialize, Debug, Clone)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

// Method-specific parameter types

#[derive(Deserialize, Debug)]
pub struct LoginParams {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Debug)]
pub struct LoginResponse {
    pub email: String,
    pub name: String,
    pub account_id: String,
    pub token: String,
}

#[derive(Deserialize, Debug)]
pub struct TransferParams {
    pub sender_email: String,
    pub password: String,
    pub receiver_ref: String,
    pub amount: u64,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct GetAccountInfoParams {
    pub email: String,
}

#[derive(Deserialize, Debug)]
pub struct GetBalanceParams {
    pub account_ref: String,
}

#[derive(Serialize, Debug)]
pub struct GetBalanceResponse {
    pub account_ref: String,
    pub name: String,
    pub balance: u64,
}

#[derive(Deserialize, Debug)]
pub struct CreateAccountParams {
    pub name: String,
    pub email: String,
    pub password: String,
    pub account_ref: String,
    #[serde(default)]
    pub opening_balance: u64,
}

#[derive(Serialize, Debug)]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    pub account_ref: String,
    pub balance: u64,
    pub created_at: u64,
}
