//! Lock-free price cache
//!
//! Uses DashMap so the update loop can swap a symbol's price while any
//! number of readers look it up. Each insert replaces the whole `Price`.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use amnis_core::{Price, Symbol};

/// Latest published price per symbol
#[derive(Debug)]
pub struct PriceState {
    prices: DashMap<Symbol, Price>,

    /// Stats
    update_count: AtomicU64,
    last_update: RwLock<Option<Instant>>,
}

impl PriceState {
    pub fn new() -> Self {
        Self {
            prices: DashMap::new(),
            update_count: AtomicU64::new(0),
            last_update: RwLock::new(None),
        }
    }

    /// Replace the price for `symbol`
    pub fn update_price(&self, symbol: Symbol, price: Price) {
        self.prices.insert(symbol, price);
        self.update_count.fetch_add(1, Ordering::Relaxed);
        *self.last_update.write() = Some(Instant::now());
    }

    /// Get a price
    pub fn get_price(&self, symbol: &Symbol) -> Option<Price> {
        self.prices.get(symbol).map(|r| *r.value())
    }

    /// Copy of every cached price, ordered by symbol
    pub fn snapshot(&self) -> BTreeMap<Symbol, Price> {
        self.prices
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Stats
    pub fn stats(&self) -> PriceStateStats {
        PriceStateStats {
            price_count: self.prices.len(),
            update_count: self.update_count.load(Ordering::Relaxed),
            last_update_age: self.last_update.read().map(|t| t.elapsed()),
        }
    }
}

impl Default for PriceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about price state
#[derive(Debug, Clone)]
pub struct PriceStateStats {
    pub price_count: usize,
    pub update_count: u64,
    /// `None` until the first update
    pub last_update_age: Option<Duration>,
}
