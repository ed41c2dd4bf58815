//! Amnis stAPT provider
//!
//! stAPT price = APT price (Pyth) * stAPT rate (Amnis staking contract).

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use amnis_core::{AmnisConfig, OracleResult, Price, Symbol};
use crate::provider::Provider;
use crate::pyth::{AccountSnapshot, OracleClient, PythClient};
use crate::rate::{RateSource, ViewFunctionRate};
use crate::retry::Backoff;
use crate::state::PriceState;

pub struct AmnisProvider {
    config: AmnisConfig,
    state: Arc<PriceState>,
    oracle: Arc<dyn OracleClient>,
    rate: Arc<dyn RateSource>,
    base_symbol: Symbol,
    derived_symbol: Symbol,
}

impl AmnisProvider {
    /// Build the Pyth client and rate source. Nothing touches the network
    /// until the update loop runs.
    pub fn new(config: AmnisConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
                reqwest::Client::new()
            });

        let oracle = Arc::new(PythClient::new(
            &config.http_endpoint,
            &config.first_mapping,
            &config.program_key,
            client.clone(),
        ));
        let rate = Arc::new(ViewFunctionRate::new(&config.node_url, client));

        Self::with_sources(config, oracle, rate)
    }

    pub fn with_sources(
        config: AmnisConfig,
        oracle: Arc<dyn OracleClient>,
        rate: Arc<dyn RateSource>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(PriceState::new()),
            oracle,
            rate,
            base_symbol: Symbol::apt_usd(),
            derived_symbol: Symbol::stapt_usd(),
        }
    }

    /// Get shared state reference
    pub fn state(&self) -> Arc<PriceState> {
        Arc::clone(&self.state)
    }

    /// One refresh-then-derive cycle.
    ///
    /// Oracle failures are returned to the caller. A missing base price or
    /// exchange rate leaves the cached stAPT price untouched.
    pub async fn update_prices(&self) -> OracleResult<()> {
        self.oracle.refresh_all_prices().await?;
        let accounts = self.oracle.get_all_accounts().await?;

        for account in &accounts {
            let AccountSnapshot::Price(price_account) = account else {
                continue;
            };
            if price_account.symbol() != Some(self.base_symbol.as_str()) {
                continue;
            }

            let Some(base_price) = price_account.aggregate_price() else {
                debug!(
                    "{} aggregate is {:?}, skipping",
                    self.base_symbol,
                    price_account.aggregate_status()
                );
                continue;
            };
            debug!("{}: {}", self.base_symbol, base_price);

            let Some(rate) = self.fetch_exchange_rate().await else {
                continue;
            };

            let price = Price::derived(
                base_price,
                rate,
                self.config.confidence_ratio_bps,
                chrono::Utc::now().timestamp(),
            );
            self.state.update_price(self.derived_symbol.clone(), price);
        }

        info!(prices = ?self.state.snapshot(), "Updated stAPT price");
        Ok(())
    }

    /// Current stAPT/APT rate, or `None` if the lookup failed
    pub async fn fetch_exchange_rate(&self) -> Option<f64> {
        match self.rate.fetch_rate().await {
            Ok(rate) => Some(rate),
            Err(e) => {
                error!(error = %e, "Error getting stAPT rate");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl Provider for AmnisProvider {
    /// Single fixed symbol; product updates are ignored
    fn upd_products(&self, _product_symbols: &[Symbol]) {}

    async fn run_update_loop(&self) {
        info!(
            http_endpoint = %self.config.http_endpoint,
            ws_endpoint = %self.config.ws_endpoint,
            node_url = %self.config.node_url,
            "Starting {} update loop every {}s",
            self.derived_symbol,
            self.config.update_interval_secs
        );
        let mut backoff = Backoff::from_config(&self.config.retry);

        loop {
            match self.update_prices().await {
                Ok(()) => {
                    backoff.reset();
                    tokio::time::sleep(self.config.update_interval()).await;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    error!(
                        "Oracle refresh failed: {}; retrying in {:?} (attempt {})",
                        e,
                        delay,
                        backoff.attempts()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn latest_price(&self, symbol: &Symbol) -> Option<Price> {
        self.state.get_price(symbol)
    }
}
