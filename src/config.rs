//! Process configuration
//!
//! Every setting can come from a flag or from the environment. Required
//! settings are optional at the clap level so that a missing one surfaces as
//! a [`ConfigError`] naming the variable instead of a usage dump.

use crate::engine::EngineConfig;
use crate::error::ConfigError;
use crate::events::WatchedAddress;
use crate::indexer::PageLimits;
use crate::retry::RetryPolicy;
use crate::sink::OutputFormat;
use clap::Parser;
use std::time::Duration;

pub const DEFAULT_INDEXER_URL: &str = "https://api.etherscan.io/v2/api";
/// Sepolia.
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;

/// Reconcile on-chain activity for one address
#[derive(Parser, Debug, Clone)]
#[command(name = "addrwatch")]
#[command(about = "Backfill and live-tail every transaction touching one address")]
pub struct Args {
    /// JSON-RPC HTTP endpoint used for block bodies
    #[arg(long, env = "HTTP_URL")]
    pub http_url: Option<String>,

    /// JSON-RPC WebSocket endpoint used for the newHeads subscription
    #[arg(long, env = "WS_URL")]
    pub ws_url: Option<String>,

    /// Address to watch (hex, any casing, 0x optional)
    #[arg(long, env = "WATCH_ADDRESS")]
    pub address: Option<String>,

    /// Indexing API key
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Etherscan-compatible indexing API base URL
    #[arg(long, env = "INDEXER_URL", default_value = DEFAULT_INDEXER_URL)]
    pub indexer_url: String,

    /// Chain id sent with every indexing API query
    #[arg(long, env = "CHAIN_ID", default_value_t = DEFAULT_CHAIN_ID)]
    pub chain_id: u64,

    /// Records requested per indexing API page
    #[arg(long, default_value_t = 1000)]
    pub page_size: usize,

    /// Cap on records fetched per list query
    #[arg(long, default_value_t = 10_000)]
    pub max_results: usize,

    /// Timeout for every HTTP request and for WebSocket connects
    #[arg(long, default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Attempts per indexing call or block fetch
    #[arg(long, default_value_t = 4)]
    pub retry_attempts: u32,

    #[arg(long, default_value_t = 500)]
    pub retry_initial_ms: u64,

    /// Consecutive failed reconnects before giving up
    #[arg(long, default_value_t = 10)]
    pub reconnect_attempts: u32,

    #[arg(long, default_value_t = 1000)]
    pub reconnect_initial_ms: u64,

    #[arg(long, default_value_t = 60)]
    pub reconnect_max_secs: u64,

    /// Number of emitted events remembered for deduplication
    #[arg(long, default_value_t = 10_000)]
    pub dedup_window: usize,

    /// Most blocks walked to fill a gap between head notifications
    #[arg(long, default_value_t = 256)]
    pub max_catchup_blocks: u64,

    /// Print events as JSON lines on stdout instead of log lines
    #[arg(long)]
    pub json: bool,
}

/// Validated settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub http_url: String,
    pub ws_url: String,
    pub address: WatchedAddress,
    pub api_key: String,
    pub indexer_url: String,
    pub chain_id: u64,
    pub page_limits: PageLimits,
    pub request_timeout: Duration,
    pub engine: EngineConfig,
    pub output: OutputFormat,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let http_url = require(args.http_url, "HTTP_URL")?;
        check_scheme(&http_url, "HTTP_URL", &["http://", "https://"])?;

        let ws_url = require(args.ws_url, "WS_URL")?;
        check_scheme(&ws_url, "WS_URL", &["ws://", "wss://"])?;

        let raw_address = require(args.address, "WATCH_ADDRESS")?;
        let address = raw_address
            .parse::<WatchedAddress>()
            .map_err(|reason| ConfigError::InvalidAddress {
                input: raw_address.clone(),
                reason,
            })?;

        let api_key = require(args.api_key, "ETHERSCAN_API_KEY")?;
        check_scheme(&args.indexer_url, "INDEXER_URL", &["http://", "https://"])?;

        let retry = RetryPolicy {
            max_attempts: args.retry_attempts.max(1),
            initial_backoff: Duration::from_millis(args.retry_initial_ms),
            ..RetryPolicy::default()
        };
        let reconnect = RetryPolicy {
            max_attempts: args.reconnect_attempts.max(1),
            initial_backoff: Duration::from_millis(args.reconnect_initial_ms),
            max_backoff: Duration::from_secs(args.reconnect_max_secs),
            multiplier: 2,
        };

        Ok(Self {
            http_url,
            ws_url,
            address,
            api_key,
            indexer_url: args.indexer_url,
            chain_id: args.chain_id,
            page_limits: PageLimits {
                page_size: args.page_size.max(1),
                max_results: args.max_results.max(1),
            },
            request_timeout: Duration::from_secs(args.request_timeout_secs.max(1)),
            engine: EngineConfig {
                retry,
                reconnect,
                dedup_window: args.dedup_window,
                max_catchup_blocks: args.max_catchup_blocks.max(1),
            },
            output: if args.json {
                OutputFormat::JsonLines
            } else {
                OutputFormat::Text
            },
        })
    }
}

fn require(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn check_scheme(url: &str, name: &'static str, schemes: &[&str]) -> Result<(), ConfigError> {
    let lower = url.to_ascii_lowercase();
    if schemes.iter().any(|s| lower.starts_with(s) && lower.len() > s.len()) {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            name,
            input: url.to_string(),
        })
    }
}
