//! Core type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Price feed identifier, e.g. `Crypto.APT/USD`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// Base asset read from the oracle
    pub fn apt_usd() -> Self {
        Self::new("Crypto.APT/USD")
    }

    /// Derived asset written by the Amnis provider
    pub fn stapt_usd() -> Self {
        Self::new("Crypto.STAPT/USD")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for Symbol {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// A published price. Replaced wholesale on every update, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub value: f64,
    pub confidence: f64,
    /// Unix seconds
    pub timestamp: i64,
}

impl Price {
    pub fn new(value: f64, confidence: f64, timestamp: i64) -> Self {
        Self { value, confidence, timestamp }
    }

    /// Price of an asset quoted as `base * rate`, with a confidence band of
    /// `confidence_ratio_bps` basis points of the derived value.
    pub fn derived(base: f64, rate: f64, confidence_ratio_bps: u64, timestamp: i64) -> Self {
        let value = base * rate;
        Self {
            value,
            confidence: value * confidence_ratio_bps as f64 / 10_000.0,
            timestamp,
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ± {} @ {}", self.value, self.confidence, self.timestamp)
    }
}
