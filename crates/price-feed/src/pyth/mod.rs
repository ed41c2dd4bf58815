//! Pyth oracle access over Solana JSON-RPC

pub mod accounts;
pub mod client;
pub mod rpc;

pub use accounts::{AccountKey, AccountSnapshot, PriceAccount, PriceStatus, ProductAccount};
pub use client::{OracleClient, PythClient};
