//! Chain head source
//!
//! New block numbers arrive over a WebSocket `newHeads` subscription; block
//! bodies are pulled over HTTP JSON-RPC. A closed [`HeadSubscription`]
//! means the connection dropped; reconnecting is the engine's job.

use crate::error::SourceError;
use crate::rpc::RpcClient;
use crate::types::{parse_hex_u64, Block};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Stream of new head block numbers. `recv()` returning `None` means the
/// underlying subscription is gone.
pub type HeadSubscription = mpsc::Receiver<u64>;

const HEAD_CHANNEL_CAPACITY: usize = 256;

/// Push notifications of new blocks plus pull access to block bodies.
#[async_trait]
pub trait ChainHeadSource: Send + Sync {
    /// Open a new head subscription.
    async fn subscribe(&self) -> Result<HeadSubscription, SourceError>;

    /// Fetch a block with full transaction bodies.
    async fn get_block(&self, number: u64) -> Result<Block, SourceError>;
}

/// `eth_subscribe("newHeads")` over WebSocket, bodies over HTTP.
pub struct WsHeadSource {
    ws_url: String,
    rpc: RpcClient,
    connect_timeout: Duration,
}

impl WsHeadSource {
    pub fn new(ws_url: String, rpc: RpcClient, connect_timeout: Duration) -> Self {
        Self {
            ws_url,
            rpc,
            connect_timeout,
        }
    }
}

#[async_trait]
impl ChainHeadSource for WsHeadSource {
    async fn subscribe(&self) -> Result<HeadSubscription, SourceError> {
        info!(url = %self.ws_url, "subscribing to new heads");

        let (ws_stream, _) = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(self.ws_url.as_str()),
        )
        .await
        .map_err(|_| SourceError::Unavailable("WebSocket connect timed out".into()))?
        .map_err(|e| SourceError::Unavailable(format!("WebSocket connect failed: {e}")))?;

        let (mut sink, mut stream) = ws_stream.split();

        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": ["newHeads"]
        });
        sink.send(Message::Text(request.to_string()))
            .await
            .map_err(|e| SourceError::Unavailable(format!("WebSocket send failed: {e}")))?;

        // First text frame answering id 1 carries the subscription id.
        let subscription_id = tokio::time::timeout(self.connect_timeout, async {
            while let Some(msg) = stream.next().await {
                let msg = msg.map_err(|e| SourceError::Unavailable(e.to_string()))?;
                let Message::Text(text) = msg else { continue };
                let value: Value = serde_json::from_str(&text)?;
                if value.get("id").and_then(Value::as_u64) != Some(1) {
                    continue;
                }
                if let Some(error) = value.get("error") {
                    return Err(SourceError::Malformed(format!("eth_subscribe rejected: {error}")));
                }
                return value
                    .get("result")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| SourceError::Malformed("eth_subscribe: missing result".into()));
            }
            Err(SourceError::Unavailable("WebSocket closed before subscribing".into()))
        })
        .await
        .map_err(|_| SourceError::Unavailable("eth_subscribe timed out".into()))??;

        info!(%subscription_id, "new heads subscription active");

        let (tx, rx) = mpsc::channel(HEAD_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            // Hold the write half for the lifetime of the subscription.
            let _sink = sink;
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let Some(number) = parse_head_notification(&text, &subscription_id) else {
                            debug!("ignoring non-head WebSocket message");
                            continue;
                        };
                        if tx.send(number).await.is_err() {
                            // Receiver dropped: engine is shutting down.
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        warn!(?frame, "WebSocket closed by node");
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "WebSocket receive error");
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn get_block(&self, number: u64) -> Result<Block, SourceError> {
        self.rpc.get_block_by_number(number).await
    }
}

/// Extract the block number from an `eth_subscription` notification for
/// `subscription_id`.
fn parse_head_notification(text: &str, subscription_id: &str) -> Option<u64> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("method")?.as_str()? != "eth_subscription" {
        return None;
    }
    let params = value.get("params")?;
    if params.get("subscription")?.as_str()? != subscription_id {
        return None;
    }
    parse_hex_u64(params.get("result")?.get("number")?.as_str()?).ok()
}
