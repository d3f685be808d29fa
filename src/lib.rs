pub mod account;
pub mod config;
pub mod error;
pub mod rpc;
pub mod storage;
pub mod token;
