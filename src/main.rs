//! addrwatch binary
//!
//! Backfills and then live-tails activity for one address until Ctrl+C.

use addrwatch::rpc::RpcClient;
use addrwatch::{Args, Config, Engine, EtherscanClient, LogSink, WsHeadSource};
use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_args(Args::parse()).context("Invalid configuration")?;

    info!("Starting address watcher");
    info!(address = %config.address, "Watching");
    info!(
        http = %config.http_url,
        ws = %config.ws_url,
        indexer = %config.indexer_url,
        chain_id = config.chain_id,
        "Endpoints"
    );

    let rpc = RpcClient::new(config.http_url.clone(), config.request_timeout)
        .context("Failed to create RPC client")?;
    match rpc.block_number().await {
        Ok(head) => info!(head, "Connected to node"),
        Err(e) => warn!(error = %e, "Could not read chain head, continuing"),
    }

    let indexer = EtherscanClient::new(
        config.indexer_url.clone(),
        config.chain_id,
        config.api_key.clone(),
        config.page_limits,
        config.request_timeout,
    )
    .context("Failed to create indexing client")?;
    let heads = WsHeadSource::new(config.ws_url.clone(), rpc, config.request_timeout);
    let sink = LogSink::new(config.output);

    let mut engine = Engine::new(config.address, &config.engine, indexer, heads, sink);

    // Handle Ctrl+C gracefully
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown.clone()));

    let cursor = engine.run(shutdown).await.context("Watcher error")?;

    info!(last_block = ?cursor.last_processed(), "Watcher stopped");
    Ok(())
}

/// Cancel `shutdown` once `signal` fires. A handler that could not be
/// installed leaves the engine running.
async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
    }
}
