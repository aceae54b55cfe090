//! Indexing API client
//!
//! Paginated `txlist` / `txlistinternal` queries against an
//! Etherscan-compatible endpoint. Pagination is transparent to callers:
//! pages are requested until one comes back short or the configured result
//! cap is reached.

use crate::error::SourceError;
use crate::events::{ActivityBatch, TransactionEvent, WatchedAddress};
use crate::types::{ApiEnvelope, IndexedTx};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::future::Future;
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::{debug, warn};

/// Inclusive block range; `None` on a query means `[0, latest]`.
pub type BlockRange = RangeInclusive<u64>;

/// Events returned by one list query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub events: ActivityBatch,
    /// The result cap stopped pagination while more pages may exist.
    pub truncated: bool,
}

impl Listing {
    pub fn complete(events: ActivityBatch) -> Self {
        Self {
            events,
            truncated: false,
        }
    }
}

/// Records gathered by [`paginate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paginated<T> {
    pub records: Vec<T>,
    pub truncated: bool,
}

/// Source of historical transactions for an address.
#[async_trait]
pub trait IndexingClient: Send + Sync {
    /// Top-level transactions touching `address`, oldest first.
    async fn fetch_normal(
        &self,
        address: &WatchedAddress,
        range: Option<BlockRange>,
    ) -> Result<Listing, SourceError>;

    /// Internal value transfers touching `address`, oldest first.
    async fn fetch_internal(
        &self,
        address: &WatchedAddress,
        range: Option<BlockRange>,
    ) -> Result<Listing, SourceError>;
}

/// Which list endpoint to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxListAction {
    Normal,
    Internal,
}

impl TxListAction {
    fn as_param(self) -> &'static str {
        match self {
            Self::Normal => "txlist",
            Self::Internal => "txlistinternal",
        }
    }
}

/// Paging limits for one query.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    /// `offset` parameter: records per page.
    pub page_size: usize,
    /// Stop after this many records even if more pages exist.
    pub max_results: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        // Etherscan refuses page * offset > 10_000
        Self {
            page_size: 1000,
            max_results: 10_000,
        }
    }
}

/// Etherscan-compatible HTTP client.
pub struct EtherscanClient {
    client: reqwest::Client,
    base_url: String,
    chain_id: u64,
    api_key: String,
    limits: PageLimits,
}

impl EtherscanClient {
    /// Create a client for `chain_id` whose requests time out after `timeout`.
    pub fn new(
        base_url: String,
        chain_id: u64,
        api_key: String,
        limits: PageLimits,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            chain_id,
            api_key,
            limits,
        })
    }

    /// Fetch every record for `action`, following pages.
    pub async fn list(
        &self,
        action: TxListAction,
        address: &WatchedAddress,
        range: Option<BlockRange>,
    ) -> Result<Paginated<IndexedTx>, SourceError> {
        let listed = paginate(self.limits, move |page| {
            self.request_page(action, address, range.clone(), page)
        })
        .await?;
        if listed.truncated {
            warn!(
                action = action.as_param(),
                records = listed.records.len(),
                "result cap reached, older pages only"
            );
        }
        Ok(listed)
    }

    /// Query string for one page request.
    pub fn query_params(
        &self,
        action: TxListAction,
        address: &WatchedAddress,
        range: Option<&BlockRange>,
        page: usize,
    ) -> Vec<(&'static str, String)> {
        let (start, end) = match range {
            Some(r) => (r.start().to_string(), r.end().to_string()),
            None => ("0".to_string(), "latest".to_string()),
        };
        vec![
            ("chainid", self.chain_id.to_string()),
            ("module", "account".to_string()),
            ("action", action.as_param().to_string()),
            ("address", address.to_string()),
            ("startblock", start),
            ("endblock", end),
            ("page", page.to_string()),
            ("offset", self.limits.page_size.to_string()),
            ("sort", "asc".to_string()),
            ("apikey", self.api_key.clone()),
        ]
    }

    async fn request_page(
        &self,
        action: TxListAction,
        address: &WatchedAddress,
        range: Option<BlockRange>,
        page: usize,
    ) -> Result<Vec<IndexedTx>, SourceError> {
        let params = self.query_params(action, address, range.as_ref(), page);
        debug!(action = action.as_param(), %address, ?range, page, "indexer request");

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        classify_response(status, &body)
    }
}

#[async_trait]
impl IndexingClient for EtherscanClient {
    async fn fetch_normal(
        &self,
        address: &WatchedAddress,
        range: Option<BlockRange>,
    ) -> Result<Listing, SourceError> {
        let listed = self.list(TxListAction::Normal, address, range).await?;
        Ok(Listing {
            events: listed.records.iter().map(TransactionEvent::normal_from_indexed).collect(),
            truncated: listed.truncated,
        })
    }

    async fn fetch_internal(
        &self,
        address: &WatchedAddress,
        range: Option<BlockRange>,
    ) -> Result<Listing, SourceError> {
        let listed = self.list(TxListAction::Internal, address, range).await?;
        Ok(Listing {
            events: listed.records.iter().map(TransactionEvent::internal_from_indexed).collect(),
            truncated: listed.truncated,
        })
    }
}

/// Request pages `1, 2, ...` until a short page or the result cap.
///
/// Stopping at the cap while the last page was full, or with records left
/// over, marks the result as truncated.
pub async fn paginate<T, F, Fut>(
    limits: PageLimits,
    mut fetch_page: F,
) -> Result<Paginated<T>, SourceError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, SourceError>>,
{
    let page_size = limits.page_size.max(1);
    let mut out = Vec::new();
    let mut page = 1;
    loop {
        let mut batch = fetch_page(page).await?;
        let short = batch.len() < page_size;
        let room = limits.max_results.saturating_sub(out.len());
        let overflow = batch.len() > room;
        batch.truncate(room);
        out.append(&mut batch);
        if overflow || (!short && out.len() >= limits.max_results) {
            return Ok(Paginated {
                records: out,
                truncated: true,
            });
        }
        if short {
            return Ok(Paginated {
                records: out,
                truncated: false,
            });
        }
        page += 1;
    }
}

/// Turn an HTTP status and body into records or a classified error.
///
/// `status = "0"` with "No transactions found" is an empty result, not a
/// failure. Throttling is reported either as HTTP 429 or as a `status = "0"`
/// envelope whose `result` mentions the rate limit.
pub fn classify_response(status: StatusCode, body: &str) -> Result<Vec<IndexedTx>, SourceError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(SourceError::RateLimited(format!("HTTP {status}")));
    }
    if status.is_server_error() {
        return Err(SourceError::Unavailable(format!("HTTP {status}")));
    }
    if !status.is_success() {
        return Err(SourceError::Malformed(format!("HTTP {status}")));
    }

    let envelope: ApiEnvelope = serde_json::from_str(body)?;

    if envelope.status == "1" {
        return Ok(serde_json::from_value(envelope.result)?);
    }

    let message = envelope.message.to_ascii_lowercase();
    if message.starts_with("no transactions found") || message.starts_with("no records found") {
        return Ok(Vec::new());
    }

    let detail = envelope.result.as_str().unwrap_or_default();

    let text = format!("{}: {}", envelope.message, detail);
    let lower = text.to_ascii_lowercase();
    if lower.contains("rate limit") {
        Err(SourceError::RateLimited(text))
    } else if lower.contains("timeout") || lower.contains("timed out") {
        Err(SourceError::Unavailable(text))
    } else {
        Err(SourceError::Malformed(text))
    }
}
