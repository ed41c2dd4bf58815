//! Pyth v2 on-chain account layouts
//!
//! All integers are little-endian. Every account starts with a 16 byte
//! header: magic, version, account type, used size.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use amnis_core::{OracleError, OracleResult};

pub const MAGIC: u32 = 0xa1b2_c3d4;
pub const VERSION_2: u32 = 2;

const HEADER_LEN: usize = 16;
const KEY_LEN: usize = 32;

const MAPPING_NUM_OFFSET: usize = 16;
const MAPPING_NEXT_OFFSET: usize = 24;
const MAPPING_PRODUCTS_OFFSET: usize = 56;

const PRODUCT_PRICE_KEY_OFFSET: usize = 16;
const PRODUCT_ATTRS_OFFSET: usize = 48;

const PRICE_EXPO_OFFSET: usize = 20;
const PRICE_VALID_SLOT_OFFSET: usize = 40;
const PRICE_TIMESTAMP_OFFSET: usize = 96;
const PRICE_PRODUCT_OFFSET: usize = 112;
const PRICE_AGG_OFFSET: usize = 208;
const PRICE_MIN_LEN: usize = PRICE_AGG_OFFSET + 32;

/// Aggregates published more than this many slots before the fetch are stale
pub const MAX_SLOT_DIFFERENCE: u64 = 25;

/// 32 byte Solana account address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountKey([u8; KEY_LEN]);

impl AccountKey {
    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountKey({})", self)
    }
}

impl FromStr for AccountKey {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|e| OracleError::InvalidKey(format!("{}: {}", s, e)))?;
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| OracleError::InvalidKey(format!("{}: {} bytes", s, v.len())))?;
        Ok(Self(bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    Mapping,
    Product,
    Price,
}

impl AccountType {
    fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(AccountType::Mapping),
            2 => Some(AccountType::Product),
            3 => Some(AccountType::Price),
            _ => None,
        }
    }
}

/// Page of product keys; mapping accounts form a linked list
#[derive(Debug, Clone)]
pub struct MappingAccount {
    pub key: AccountKey,
    pub product_keys: Vec<AccountKey>,
    pub next: Option<AccountKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductAccount {
    pub key: AccountKey,
    /// First price account of the product, if one is attached
    pub price_account: Option<AccountKey>,
    pub attrs: BTreeMap<String, String>,
}

impl ProductAccount {
    pub fn symbol(&self) -> Option<&str> {
        self.attrs.get("symbol").map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceStatus {
    Unknown,
    Trading,
    Halted,
    Auction,
    Ignored,
}

impl PriceStatus {
    fn from_u32(v: u32) -> Self {
        match v {
            1 => PriceStatus::Trading,
            2 => PriceStatus::Halted,
            3 => PriceStatus::Auction,
            4 => PriceStatus::Ignored,
            _ => PriceStatus::Unknown,
        }
    }
}

/// Raw price component, to be scaled by the account exponent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceInfo {
    pub raw_price: i64,
    pub raw_confidence: u64,
    pub status: PriceStatus,
    pub pub_slot: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceAccount {
    pub key: AccountKey,
    pub product_key: AccountKey,
    /// Filled in by the client once the owning product is known
    pub product: Option<ProductAccount>,
    pub exponent: i32,
    /// Slot at which the account was fetched
    pub slot: u64,
    pub valid_slot: u64,
    pub timestamp: i64,
    pub aggregate: PriceInfo,
}

impl PriceAccount {
    /// Aggregate status as of the fetch slot. A trading aggregate that has
    /// not been republished within `MAX_SLOT_DIFFERENCE` slots is `Unknown`.
    pub fn aggregate_status(&self) -> PriceStatus {
        if self.slot.saturating_sub(self.aggregate.pub_slot) > MAX_SLOT_DIFFERENCE {
            PriceStatus::Unknown
        } else {
            self.aggregate.status
        }
    }

    /// Aggregate price, only while the feed is trading
    pub fn aggregate_price(&self) -> Option<f64> {
        (self.aggregate_status() == PriceStatus::Trading)
            .then(|| self.scale(self.aggregate.raw_price as f64))
    }

    pub fn symbol(&self) -> Option<&str> {
        self.product.as_ref().and_then(ProductAccount::symbol)
    }

    fn scale(&self, raw: f64) -> f64 {
        // 10^-n is inexact in f64, 10^n is exact up to n = 22
        if self.exponent < 0 {
            raw / 10f64.powi(-self.exponent)
        } else {
            raw * 10f64.powi(self.exponent)
        }
    }
}

/// Account state as last fetched by the oracle client
#[derive(Debug, Clone)]
pub enum AccountSnapshot {
    Mapping(MappingAccount),
    Product(ProductAccount),
    Price(PriceAccount),
}

struct AccountData<'a> {
    key: &'a AccountKey,
    data: &'a [u8],
}

impl<'a> AccountData<'a> {
    fn invalid(&self, reason: impl Into<String>) -> OracleError {
        OracleError::InvalidAccount {
            key: self.key.to_string(),
            reason: reason.into(),
        }
    }

    fn bytes<const N: usize>(&self, offset: usize) -> OracleResult<[u8; N]> {
        self.data
            .get(offset..offset + N)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| self.invalid(format!("truncated at offset {}", offset)))
    }

    fn u32_at(&self, offset: usize) -> OracleResult<u32> {
        self.bytes(offset).map(u32::from_le_bytes)
    }

    fn i32_at(&self, offset: usize) -> OracleResult<i32> {
        self.bytes(offset).map(i32::from_le_bytes)
    }

    fn u64_at(&self, offset: usize) -> OracleResult<u64> {
        self.bytes(offset).map(u64::from_le_bytes)
    }

    fn i64_at(&self, offset: usize) -> OracleResult<i64> {
        self.bytes(offset).map(i64::from_le_bytes)
    }

    fn key_at(&self, offset: usize) -> OracleResult<AccountKey> {
        self.bytes(offset).map(AccountKey::new)
    }

    fn optional_key_at(&self, offset: usize) -> OracleResult<Option<AccountKey>> {
        let key = self.key_at(offset)?;
        Ok((!key.is_zero()).then_some(key))
    }

    /// Validates the header and returns the account type and used size
    fn header(&self) -> OracleResult<(AccountType, usize)> {
        if self.data.len() < HEADER_LEN {
            return Err(self.invalid("shorter than header"));
        }
        let magic = self.u32_at(0)?;
        if magic != MAGIC {
            return Err(self.invalid(format!("bad magic {:#x}", magic)));
        }
        let version = self.u32_at(4)?;
        if version != VERSION_2 {
            return Err(self.invalid(format!("unsupported version {}", version)));
        }
        let kind = self.u32_at(8)?;
        let kind = AccountType::from_u32(kind)
            .ok_or_else(|| self.invalid(format!("unknown account type {}", kind)))?;
        let size = self.u32_at(12)? as usize;
        Ok((kind, size.min(self.data.len())))
    }

    fn expect(&self, expected: AccountType) -> OracleResult<usize> {
        let (kind, size) = self.header()?;
        if kind != expected {
            return Err(self.invalid(format!("expected {:?} account, found {:?}", expected, kind)));
        }
        Ok(size)
    }
}

pub fn parse_mapping(key: AccountKey, data: &[u8]) -> OracleResult<MappingAccount> {
    let acc = AccountData { key: &key, data };
    acc.expect(AccountType::Mapping)?;

    let num = acc.u32_at(MAPPING_NUM_OFFSET)? as usize;
    let next = acc.optional_key_at(MAPPING_NEXT_OFFSET)?;
    let product_keys = (0..num)
        .map(|i| acc.key_at(MAPPING_PRODUCTS_OFFSET + i * KEY_LEN))
        .collect::<OracleResult<Vec<_>>>()?;

    Ok(MappingAccount { key, product_keys, next })
}

pub fn parse_product(key: AccountKey, data: &[u8]) -> OracleResult<ProductAccount> {
    let acc = AccountData { key: &key, data };
    let size = acc.expect(AccountType::Product)?;

    let price_account = acc.optional_key_at(PRODUCT_PRICE_KEY_OFFSET)?;

    let mut attrs = BTreeMap::new();
    let mut offset = PRODUCT_ATTRS_OFFSET;
    while offset < size {
        let Some((name, next)) = read_short_str(data, offset, size) else {
            break;
        };
        let Some((value, next)) = read_short_str(data, next, size) else {
            break;
        };
        attrs.insert(name, value);
        offset = next;
    }

    Ok(ProductAccount { key, price_account, attrs })
}

pub fn parse_price(key: AccountKey, slot: u64, data: &[u8]) -> OracleResult<PriceAccount> {
    let acc = AccountData { key: &key, data };
    acc.expect(AccountType::Price)?;
    if data.len() < PRICE_MIN_LEN {
        return Err(acc.invalid(format!("price account is {} bytes", data.len())));
    }

    let aggregate = PriceInfo {
        raw_price: acc.i64_at(PRICE_AGG_OFFSET)?,
        raw_confidence: acc.u64_at(PRICE_AGG_OFFSET + 8)?,
        status: PriceStatus::from_u32(acc.u32_at(PRICE_AGG_OFFSET + 16)?),
        pub_slot: acc.u64_at(PRICE_AGG_OFFSET + 24)?,
    };

    Ok(PriceAccount {
        key,
        product_key: acc.key_at(PRICE_PRODUCT_OFFSET)?,
        product: None,
        exponent: acc.i32_at(PRICE_EXPO_OFFSET)?,
        slot,
        valid_slot: acc.u64_at(PRICE_VALID_SLOT_OFFSET)?,
        timestamp: acc.i64_at(PRICE_TIMESTAMP_OFFSET)?,
        aggregate,
    })
}

/// Length-prefixed string; `None` when it would run past `end`
fn read_short_str(data: &[u8], offset: usize, end: usize) -> Option<(String, usize)> {
    let len = *data.get(offset)? as usize;
    let start = offset + 1;
    if start + len > end {
        return None;
    }
    let s = String::from_utf8_lossy(data.get(start..start + len)?).into_owned();
    Some((s, start + len))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    fn header(kind: u32, size: usize) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&MAGIC.to_le_bytes());
        data.extend_from_slice(&VERSION_2.to_le_bytes());
        data.extend_from_slice(&kind.to_le_bytes());
        data.extend_from_slice(&(size as u32).to_le_bytes());
        data
    }

    pub fn key(byte: u8) -> AccountKey {
        AccountKey::new([byte; KEY_LEN])
    }

    pub fn mapping(products: &[AccountKey], next: Option<AccountKey>) -> Vec<u8> {
        let size = MAPPING_PRODUCTS_OFFSET + products.len() * KEY_LEN;
        let mut data = header(1, size);
        data.extend_from_slice(&(products.len() as u32).to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(next.unwrap_or(AccountKey::new([0; KEY_LEN])).as_bytes());
        for p in products {
            data.extend_from_slice(p.as_bytes());
        }
        data
    }

    pub fn product(price_account: Option<AccountKey>, attrs: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        let price_key = price_account.unwrap_or(AccountKey::new([0; KEY_LEN]));
        body.extend_from_slice(price_key.as_bytes());
        for (k, v) in attrs {
            body.push(k.len() as u8);
            body.extend_from_slice(k.as_bytes());
            body.push(v.len() as u8);
            body.extend_from_slice(v.as_bytes());
        }
        let mut data = header(2, HEADER_LEN + body.len());
        data.extend_from_slice(&body);
        // Accounts are allocated larger than their used size
        data.resize(512, 0);
        data
    }

    /// Aggregate published at `PUB_SLOT`
    pub const PUB_SLOT: u64 = 80;

    pub fn price(
        product: AccountKey,
        expo: i32,
        raw_price: i64,
        raw_conf: u64,
        status: u32,
    ) -> Vec<u8> {
        let mut data = header(3, PRICE_MIN_LEN);
        data.resize(PRICE_MIN_LEN, 0);

        let mut put = |offset: usize, bytes: &[u8]| {
            data[offset..offset + bytes.len()].copy_from_slice(bytes);
        };
        put(PRICE_EXPO_OFFSET, &expo.to_le_bytes());
        put(PRICE_VALID_SLOT_OFFSET, &77u64.to_le_bytes());
        put(PRICE_TIMESTAMP_OFFSET, &1_700_000_000i64.to_le_bytes());
        put(PRICE_PRODUCT_OFFSET, product.as_bytes());
        put(PRICE_AGG_OFFSET, &raw_price.to_le_bytes());
        put(PRICE_AGG_OFFSET + 8, &raw_conf.to_le_bytes());
        put(PRICE_AGG_OFFSET + 16, &status.to_le_bytes());
        put(PRICE_AGG_OFFSET + 24, &PUB_SLOT.to_le_bytes());
        data
    }
}
