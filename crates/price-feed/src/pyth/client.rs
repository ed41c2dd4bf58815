//! Pyth oracle client
//!
//! Walks the mapping account chain once to discover products, then on every
//! refresh reloads just the price accounts.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use amnis_core::{OracleError, OracleResult};
use super::accounts::{
    parse_mapping, parse_price, parse_product, AccountKey, AccountSnapshot, MappingAccount,
    PriceAccount, ProductAccount,
};
use super::rpc::RpcClient;

/// Account-data source backing a provider
#[async_trait::async_trait]
pub trait OracleClient: Send + Sync {
    /// Reload all tracked accounts from the network
    async fn refresh_all_prices(&self) -> OracleResult<()>;

    /// Every account known after the last refresh
    async fn get_all_accounts(&self) -> OracleResult<Vec<AccountSnapshot>>;
}

#[derive(Debug, Default)]
struct Accounts {
    /// Set once a mapping walk has completed, even if it found no products
    products_loaded: bool,
    mappings: Vec<MappingAccount>,
    products: Vec<ProductAccount>,
    prices: Vec<PriceAccount>,
}

pub struct PythClient {
    rpc: RpcClient,
    first_mapping: String,
    program_key: String,
    accounts: RwLock<Accounts>,
}

impl PythClient {
    /// No network activity happens until the first refresh
    pub fn new(
        http_endpoint: &str,
        first_mapping: &str,
        program_key: &str,
        client: reqwest::Client,
    ) -> Self {
        Self {
            rpc: RpcClient::new(http_endpoint, client),
            first_mapping: first_mapping.to_string(),
            program_key: program_key.to_string(),
            accounts: RwLock::new(Accounts::default()),
        }
    }

    /// Re-read the mapping chain and every product it lists
    pub async fn refresh_products(&self) -> OracleResult<()> {
        let program: AccountKey = self.program_key.parse()?;
        let mut next: Option<AccountKey> = Some(self.first_mapping.parse()?);
        let mut seen = HashSet::new();
        let mut mappings = Vec::new();

        while let Some(key) = next {
            if !seen.insert(key) {
                warn!("Mapping account {} already visited, stopping", key);
                break;
            }

            let raw = self.rpc.get_account(&key).await?;
            if raw.owner != program {
                return Err(OracleError::InvalidAccount {
                    key: key.to_string(),
                    reason: format!("mapping owned by {}, expected {}", raw.owner, program),
                });
            }

            let mapping = parse_mapping(key, &raw.data)?;
            next = mapping.next;
            mappings.push(mapping);
        }

        let product_keys: Vec<AccountKey> = mappings
            .iter()
            .flat_map(|m| m.product_keys.iter().copied())
            .collect();

        let fetched = self.rpc.get_multiple_accounts(&product_keys).await?;
        let mut products = Vec::with_capacity(fetched.len());
        for (key, raw) in product_keys.iter().zip(fetched) {
            let Some(raw) = raw else {
                warn!("Product account {} not found", key);
                continue;
            };
            if raw.owner != program {
                warn!("Skipping product {} owned by {}", key, raw.owner);
                continue;
            }
            match parse_product(*key, &raw.data) {
                Ok(product) => products.push(product),
                Err(e) => warn!("Skipping product {}: {}", key, e),
            }
        }

        info!(
            "Loaded {} Pyth products from {} mapping accounts",
            products.len(),
            mappings.len()
        );

        let mut accounts = self.accounts.write();
        accounts.products_loaded = true;
        accounts.mappings = mappings;
        accounts.products = products;
        accounts.prices.clear();
        Ok(())
    }

    async fn refresh_prices(&self) -> OracleResult<()> {
        let program: AccountKey = self.program_key.parse()?;

        let (price_keys, products_by_key) = {
            let accounts = self.accounts.read();
            let price_keys: Vec<AccountKey> = accounts
                .products
                .iter()
                .filter_map(|p| p.price_account)
                .collect();
            let products_by_key: HashMap<AccountKey, ProductAccount> = accounts
                .products
                .iter()
                .map(|p| (p.key, p.clone()))
                .collect();
            (price_keys, products_by_key)
        };

        let fetched = self.rpc.get_multiple_accounts(&price_keys).await?;
        let mut prices = Vec::with_capacity(fetched.len());
        for (key, raw) in price_keys.iter().zip(fetched) {
            let Some(raw) = raw else {
                warn!("Price account {} not found", key);
                continue;
            };
            if raw.owner != program {
                warn!("Skipping price account {} owned by {}", key, raw.owner);
                continue;
            }
            match parse_price(*key, raw.slot, &raw.data) {
                Ok(mut price) => {
                    price.product = products_by_key.get(&price.product_key).cloned();
                    prices.push(price);
                }
                Err(e) => warn!("Skipping price account {}: {}", key, e),
            }
        }

        debug!("Refreshed {} Pyth price accounts", prices.len());
        self.accounts.write().prices = prices;
        Ok(())
    }
}

#[async_trait::async_trait]
impl OracleClient for PythClient {
    async fn refresh_all_prices(&self) -> OracleResult<()> {
        let needs_products = !self.accounts.read().products_loaded;
        if needs_products {
            self.refresh_products().await?;
        }
        self.refresh_prices().await
    }

    async fn get_all_accounts(&self) -> OracleResult<Vec<AccountSnapshot>> {
        let accounts = self.accounts.read();
        let snapshots = accounts
            .mappings
            .iter()
            .cloned()
            .map(AccountSnapshot::Mapping)
            .chain(accounts.products.iter().cloned().map(AccountSnapshot::Product))
            .chain(accounts.prices.iter().cloned().map(AccountSnapshot::Price))
            .collect();
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyth::accounts::fixtures::{self, PUB_SLOT};
    use crate::pyth::PriceStatus;
    use crate::test_support::serve;
    use base64::{engine::general_purpose, Engine as _};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const PROGRAM: u8 = 7;

    fn ui_account(data: &[u8], owner: u8) -> Value {
        json!({
            "data": [general_purpose::STANDARD.encode(data), "base64"],
            "executable": false,
            "lamports": 1_000_000,
            "owner": fixtures::key(owner).to_string(),
            "rentEpoch": 0
        })
    }

    /// Mapping 1 -> products 2 (APT) and 3 (BTC) -> price accounts 5 and 6.
    /// Price account 6 is owned by a foreign program.
    fn pyth_accounts() -> HashMap<String, Value> {
        let k = fixtures::key;
        let apt = fixtures::product(Some(k(5)), &[("symbol", "Crypto.APT/USD")]);
        let btc = fixtures::product(Some(k(6)), &[("symbol", "Crypto.BTC/USD")]);

        let mut store = HashMap::new();
        store.insert(
            k(1).to_string(),
            ui_account(&fixtures::mapping(&[k(2), k(3)], None), PROGRAM),
        );
        store.insert(k(2).to_string(), ui_account(&apt, PROGRAM));
        store.insert(k(3).to_string(), ui_account(&btc, PROGRAM));
        store.insert(
            k(5).to_string(),
            ui_account(&fixtures::price(k(2), -8, 1_000_000_000, 100_000, 1), PROGRAM),
        );
        store.insert(
            k(6).to_string(),
            ui_account(&fixtures::price(k(3), -8, 6_000_000_000_000, 100_000, 1), 8),
        );
        store
    }

    /// JSON-RPC node serving `store` at `slot`; counts `getAccountInfo` calls
    async fn pyth_node(
        store: HashMap<String, Value>,
        slot: u64,
        account_info_calls: Arc<AtomicUsize>,
    ) -> String {
        let lookup = move |key: &Value| {
            store
                .get(key.as_str().unwrap_or_default())
                .cloned()
                .unwrap_or(Value::Null)
        };

        serve(move |_, body| {
            let request: Value = serde_json::from_str(body).unwrap();
            let params = &request["params"][0];
            let value = match request["method"].as_str() {
                Some("getAccountInfo") => {
                    account_info_calls.fetch_add(1, Ordering::SeqCst);
                    lookup(params)
                }
                Some("getMultipleAccounts") => Value::Array(
                    params
                        .as_array()
                        .map(|keys| keys.iter().map(&lookup).collect())
                        .unwrap_or_default(),
                ),
                _ => Value::Null,
            };
            let response = json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": { "context": { "slot": slot }, "value": value }
            });
            (200, response.to_string())
        })
        .await
    }

    fn client(base: &str) -> PythClient {
        PythClient::new(
            base,
            &fixtures::key(1).to_string(),
            &fixtures::key(PROGRAM).to_string(),
            reqwest::Client::new(),
        )
    }

    fn price_accounts(accounts: &[AccountSnapshot]) -> Vec<&PriceAccount> {
        accounts
            .iter()
            .filter_map(|a| match a {
                AccountSnapshot::Price(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_refresh_loads_products_and_prices() {
        let calls = Arc::new(AtomicUsize::new(0));
        let base = pyth_node(pyth_accounts(), PUB_SLOT + 2, Arc::clone(&calls)).await;
        let client = client(&base);

        assert!(client.get_all_accounts().await.unwrap().is_empty());

        client.refresh_all_prices().await.unwrap();
        let accounts = client.get_all_accounts().await.unwrap();

        let count = |f: fn(&AccountSnapshot) -> bool| accounts.iter().filter(|a| f(a)).count();
        assert_eq!(count(|a| matches!(a, AccountSnapshot::Mapping(_))), 1);
        assert_eq!(count(|a| matches!(a, AccountSnapshot::Product(_))), 2);

        // Foreign-owned price account is dropped
        let prices = price_accounts(&accounts);
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].symbol(), Some("Crypto.APT/USD"));
        assert_eq!(prices[0].slot, PUB_SLOT + 2);
        assert_eq!(prices[0].aggregate_price(), Some(10.0));
    }

    #[tokio::test]
    async fn test_stale_aggregate_has_no_price() {
        let calls = Arc::new(AtomicUsize::new(0));
        let base = pyth_node(pyth_accounts(), 1_000_000, Arc::clone(&calls)).await;
        let client = client(&base);

        client.refresh_all_prices().await.unwrap();
        let accounts = client.get_all_accounts().await.unwrap();
        let prices = price_accounts(&accounts);

        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].aggregate.status, PriceStatus::Trading);
        assert_eq!(prices[0].aggregate_status(), PriceStatus::Unknown);
        assert!(prices[0].aggregate_price().is_none());
    }

    #[tokio::test]
    async fn test_second_refresh_skips_mapping_walk() {
        let calls = Arc::new(AtomicUsize::new(0));
        let base = pyth_node(pyth_accounts(), PUB_SLOT, Arc::clone(&calls)).await;
        let client = client(&base);

        client.refresh_all_prices().await.unwrap();
        client.refresh_all_prices().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_mapping_walked_once() {
        let mut store = HashMap::new();
        store.insert(
            fixtures::key(1).to_string(),
            ui_account(&fixtures::mapping(&[], None), PROGRAM),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let base = pyth_node(store, PUB_SLOT, Arc::clone(&calls)).await;
        let client = client(&base);

        client.refresh_all_prices().await.unwrap();
        client.refresh_all_prices().await.unwrap();
        client.refresh_all_prices().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.get_all_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_fails_when_node_unreachable() {
        let client = client("http://127.0.0.1:9");
        assert!(matches!(
            client.refresh_all_prices().await,
            Err(OracleError::Request(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_mapping_key() {
        let client = PythClient::new(
            "http://127.0.0.1:9",
            "not-a-key",
            &fixtures::key(PROGRAM).to_string(),
            reqwest::Client::new(),
        );
        assert!(matches!(
            client.refresh_all_prices().await,
            Err(OracleError::InvalidKey(_))
        ));
    }
}
