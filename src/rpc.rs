//! JSON-RPC client for the chain node
//!
//! Only the two calls the watcher needs: the current head number and a
//! block with full transaction bodies. Errors are classified into
//! [`SourceError`] so the tailer can decide whether to retry or skip.

use crate::error::SourceError;
use crate::types::{parse_hex_u64, Block};
use serde_json::{json, Value};
use std::time::Duration;

/// JSON-RPC client for Ethereum nodes.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Create a new RPC client whose requests time out after `timeout`.
    pub fn new(url: String, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, url })
    }

    /// Make a JSON-RPC call and return its `result` field.
    async fn call(&self, method: &str, params: Value) -> Result<Value, SourceError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let json: Value = response.json().await?;

        if let Some(error) = json.get("error") {
            return Err(classify_rpc_error(error));
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| SourceError::Malformed(format!("{method}: response missing 'result'")))
    }

    /// Get a block by number with full transaction objects.
    pub async fn get_block_by_number(&self, number: u64) -> Result<Block, SourceError> {
        let params = json!([format!("0x{:x}", number), true]);
        let result = self.call("eth_getBlockByNumber", params).await?;
        if result.is_null() {
            return Err(SourceError::BlockNotFound(number));
        }
        Ok(serde_json::from_value(result)?)
    }

    /// Current head block number.
    pub async fn block_number(&self) -> Result<u64, SourceError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let number = result
            .as_str()
            .ok_or_else(|| SourceError::Malformed("eth_blockNumber: result is not a string".into()))?;
        parse_hex_u64(number).map_err(SourceError::Malformed)
    }
}

/// Map a JSON-RPC error object. Providers report throttling as code
/// -32005 or 429, or only in the message text.
fn classify_rpc_error(error: &Value) -> SourceError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if code == -32005 || code == 429 || message.to_ascii_lowercase().contains("rate limit") {
        SourceError::RateLimited(format!("RPC error {code}: {message}"))
    } else if (-32099..=-32000).contains(&code) {
        SourceError::Unavailable(format!("RPC error {code}: {message}"))
    } else {
        SourceError::Malformed(format!("RPC error {code}: {message}"))
    }
}
