//! Wire types
//!
//! Blocks and transactions returned by the node's JSON-RPC endpoint, and
//! the transaction records returned by the indexing API. The node encodes
//! numbers as hex strings; the indexing API encodes them as decimal strings.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Deserializer};

/// Block with full transaction bodies (`eth_getBlockByNumber(n, true)`).
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    /// Block number (hex string in JSON)
    #[serde(deserialize_with = "deserialize_hex_u64")]
    pub number: u64,

    /// Block hash (hex string in JSON)
    #[serde(deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    /// Unix timestamp in seconds (hex string in JSON)
    #[serde(deserialize_with = "deserialize_hex_u64")]
    pub timestamp: u64,

    /// Transactions in block order
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// Transaction as embedded in a full block.
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    #[serde(deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    #[serde(deserialize_with = "deserialize_hex_address")]
    pub from: Address,

    /// Recipient address (None for contract creation)
    #[serde(default, deserialize_with = "deserialize_hex_address_opt")]
    pub to: Option<Address>,

    /// Value transferred in wei
    #[serde(deserialize_with = "deserialize_hex_u256")]
    pub value: U256,

    /// Call data ("0x" for plain transfers)
    #[serde(default, deserialize_with = "deserialize_hex_bytes")]
    pub input: Vec<u8>,
}

/// Response envelope shared by every indexing API action.
///
/// `result` is an array of records on success and a plain string on most
/// failures, so it is kept untyped until the status has been inspected.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

/// Transaction record from the indexing API.
///
/// Normal (`txlist`) and internal (`txlistinternal`) records share most
/// fields; the ones only present on one side default to empty.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedTx {
    /// Transaction hash; the parent transaction for internal records
    #[serde(deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    #[serde(deserialize_with = "deserialize_dec_u64")]
    pub block_number: u64,

    #[serde(rename = "timeStamp", deserialize_with = "deserialize_dec_u64")]
    pub timestamp: u64,

    #[serde(deserialize_with = "deserialize_hex_address")]
    pub from: Address,

    /// Empty for contract creations
    #[serde(default, deserialize_with = "deserialize_hex_address_opt")]
    pub to: Option<Address>,

    /// Value in wei, decimal
    #[serde(deserialize_with = "deserialize_dec_u256")]
    pub value: U256,

    /// Call data (normal records only)
    #[serde(default, deserialize_with = "deserialize_lenient_hex_bytes")]
    pub input: Vec<u8>,

    /// Call type such as "call" or "create" (internal records only)
    #[serde(rename = "type", default)]
    pub call_type: String,

    /// Position in the call tree, e.g. "0_1" (internal records only)
    #[serde(default)]
    pub trace_id: String,
}

// Hex / decimal deserialization helpers

/// Pad an odd-length hex string with a leading zero.
fn pad_hex_string(s: &str) -> String {
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

pub(crate) fn parse_hex_u64(s: &str) -> Result<u64, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).map_err(|e| format!("invalid hex quantity {s:?}: {e}"))
}

pub(crate) fn parse_address(s: &str) -> Result<Address, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(pad_hex_string(s)).map_err(|e| e.to_string())?;
    if bytes.len() != 20 {
        return Err(format!("expected 20 bytes for address, got {}", bytes.len()));
    }
    Ok(Address::from_slice(&bytes))
}

fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_u64(&s).map_err(serde::de::Error::custom)
}

fn deserialize_dec_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.trim().parse::<u64>().map_err(serde::de::Error::custom)
}

/// Wei amounts overflow every native integer on some chains, so they go
/// straight into a `U256`.
fn deserialize_dec_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.trim();
    if s.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(s, 10).map_err(serde::de::Error::custom)
}

fn deserialize_hex_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    if s.is_empty() {
        return Ok(U256::ZERO);
    }
    let bytes = hex::decode(pad_hex_string(s)).map_err(serde::de::Error::custom)?;
    if bytes.len() > 32 {
        return Err(serde::de::Error::custom("value wider than 256 bits"));
    }
    Ok(U256::from_be_slice(&bytes))
}

fn deserialize_hex_b256<'de, D>(deserializer: D) -> Result<B256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    let bytes = hex::decode(pad_hex_string(s)).map_err(serde::de::Error::custom)?;
    if bytes.len() != 32 {
        return Err(serde::de::Error::custom(format!(
            "Expected 32 bytes for hash, got {}",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

fn deserialize_hex_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_address(&s).map_err(serde::de::Error::custom)
}

/// `null`, missing, `""` and `"0x"` all mean "no recipient".
fn deserialize_hex_address_opt<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    match s {
        Some(s) if !s.strip_prefix("0x").unwrap_or(&s).is_empty() => {
            parse_address(&s).map(Some).map_err(serde::de::Error::custom)
        }
        _ => Ok(None),
    }
}

fn deserialize_hex_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    let s = s.strip_prefix("0x").unwrap_or(&s);
    if s.is_empty() {
        Ok(Vec::new())
    } else {
        hex::decode(pad_hex_string(s)).map_err(serde::de::Error::custom)
    }
}

/// Some indexers put placeholder text in `input` for internal records;
/// anything that is not hex is treated as empty call data.
fn deserialize_lenient_hex_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    let s = s.strip_prefix("0x").unwrap_or(&s);
    Ok(hex::decode(pad_hex_string(s)).unwrap_or_default())
}
