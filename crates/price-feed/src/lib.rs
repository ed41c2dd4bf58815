//! stAPT price feed
//!
//! Features:
//! - Pyth oracle client over Solana JSON-RPC
//! - Exchange rate from the Amnis staking contract view function
//! - Lock-free price cache shared with the publisher
//! - Update loop with exponential backoff on oracle failures

pub mod amnis;
pub mod provider;
pub mod pyth;
pub mod rate;
pub mod retry;
pub mod state;

#[cfg(test)]
mod test_support;

pub use amnis::AmnisProvider;
pub use provider::Provider;
pub use pyth::{OracleClient, PythClient};
pub use rate::{RateSource, ViewFunctionRate};
pub use state::PriceState;
