//! Minimal Solana JSON-RPC client for reading account data

use base64::{engine::general_purpose, Engine as _};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use amnis_core::{OracleError, OracleResult};
use super::accounts::AccountKey;

/// `getMultipleAccounts` accepts at most 100 keys per call
const MAX_MULTIPLE_ACCOUNTS: usize = 100;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcContext {
    slot: u64,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    context: RpcContext,
    value: T,
}

#[derive(Debug, Deserialize)]
struct UiAccount {
    /// `[payload, encoding]`
    data: (String, String),
    owner: String,
}

/// Account as returned by the node, data already decoded
#[derive(Debug, Clone)]
pub struct RawAccount {
    pub key: AccountKey,
    /// Slot the node was at when it served the account
    pub slot: u64,
    pub owner: AccountKey,
    pub data: Vec<u8>,
}

pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> OracleResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Request(format!("{} returned HTTP {}", method, status)));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| OracleError::Request(format!("{} response: {}", method, e)))?;

        if let Some(err) = body.error {
            return Err(OracleError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result
            .ok_or_else(|| OracleError::Request(format!("{} returned no result", method)))
    }

    /// Fetch a single account, failing if it does not exist
    pub async fn get_account(&self, key: &AccountKey) -> OracleResult<RawAccount> {
        let result: WithContext<Option<UiAccount>> = self
            .call(
                "getAccountInfo",
                json!([key.to_string(), { "encoding": "base64" }]),
            )
            .await?;

        let account = result
            .value
            .ok_or_else(|| OracleError::AccountNotFound(key.to_string()))?;
        decode_account(*key, result.context.slot, account)
    }

    /// Fetch many accounts; missing accounts come back as `None`, in order
    pub async fn get_multiple_accounts(
        &self,
        keys: &[AccountKey],
    ) -> OracleResult<Vec<Option<RawAccount>>> {
        let mut accounts = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(MAX_MULTIPLE_ACCOUNTS) {
            let encoded: Vec<String> = chunk.iter().map(ToString::to_string).collect();
            let result: WithContext<Vec<Option<UiAccount>>> = self
                .call(
                    "getMultipleAccounts",
                    json!([encoded, { "encoding": "base64" }]),
                )
                .await?;

            if result.value.len() != chunk.len() {
                return Err(OracleError::Request(format!(
                    "getMultipleAccounts returned {} accounts for {} keys",
                    result.value.len(),
                    chunk.len()
                )));
            }

            let slot = result.context.slot;
            for (key, account) in chunk.iter().zip(result.value) {
                accounts.push(account.map(|a| decode_account(*key, slot, a)).transpose()?);
            }
        }

        debug!("Fetched {} accounts from {}", accounts.len(), self.url);
        Ok(accounts)
    }
}

fn decode_account(key: AccountKey, slot: u64, account: UiAccount) -> OracleResult<RawAccount> {
    let (payload, encoding) = account.data;
    if encoding != "base64" {
        return Err(OracleError::InvalidAccount {
            key: key.to_string(),
            reason: format!("unexpected encoding {}", encoding),
        });
    }

    let data = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| OracleError::InvalidAccount {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

    Ok(RawAccount {
        key,
        slot,
        owner: account.owner.parse()?,
        data,
    })
}
