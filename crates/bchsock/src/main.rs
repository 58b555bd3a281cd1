//! bchsock: Bitcoin Cash event relay
//!
//! Reads raw blocks and transactions from NATS and pushes them to WebSocket
//! clients according to their subscriptions.

mod config;
mod feed;
mod health;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use bchsock_relay::Relay;
use bchsock_websocket::Server;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use feed::FeedConfig;
use health::HealthState;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);

    info!(
        bind_ip = %config.bind_ip,
        port = config.port,
        nats_url = %config.nats_url,
        address_prefix = %config.address_prefix,
        "bchsock starting"
    );

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx_clone.send(true).ok();
    });

    let relay = Arc::new(Relay::start(&config.address_prefix).context("failed to start relay")?);
    let server = Server::bind(config.server_config())
        .await
        .context("failed to bind websocket listener")?;

    let feed_connected = Arc::new(AtomicBool::new(false));
    let health_task = tokio::spawn(health::run_server(
        config.health_addr,
        HealthState::new(Arc::clone(&feed_connected)),
        shutdown_rx.clone(),
    ));

    let feed_config = FeedConfig {
        nats_url: config.nats_url.clone(),
        block_subject: config.block_subject.clone(),
        tx_subject: config.tx_subject.clone(),
    };
    let feed_relay = Arc::clone(&relay);
    let feed_shutdown = shutdown_rx.clone();
    let feed_task = tokio::spawn(async move {
        if let Err(e) = feed::run(feed_config, feed_relay, feed_connected, feed_shutdown).await {
            error!(error = ?e, "feed failed");
        }
    });

    let served = server.run(relay.handler(), shutdown_rx).await;
    // The listener can also stop on its own; take the rest down with it
    shutdown_tx.send(true).ok();

    if let Err(e) = feed_task.await {
        error!(error = %e, "feed task panicked");
    }
    match health_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "health server failed"),
        Err(e) => error!(error = %e, "health task panicked"),
    }

    let pipelines = Arc::clone(&relay);
    tokio::task::spawn_blocking(move || pipelines.shutdown()).await?;

    served.context("websocket server failed")?;
    info!("bchsock stopped");
    Ok(())
}
