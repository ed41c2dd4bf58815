//! Shared provider interface consumed by the publisher

use amnis_core::{Price, Symbol};

/// A source of prices for the publisher
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Replace the set of products this provider should track
    fn upd_products(&self, product_symbols: &[Symbol]);

    /// Keep prices fresh. Runs until the task is dropped.
    async fn run_update_loop(&self);

    /// Latest cached price for `symbol`
    fn latest_price(&self, symbol: &Symbol) -> Option<Price>;
}
