//! Upstream feed: raw blocks and transactions from NATS into the relay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use bchsock_relay::Relay;
use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub nats_url: String,
    pub block_subject: String,
    pub tx_subject: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedEvent {
    Block,
    Transaction,
}

/// Subscribe to both subjects and forward payloads until shutdown or until
/// the subscriptions end.
pub async fn run(
    config: FeedConfig,
    relay: Arc<Relay>,
    connected: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let client = async_nats::connect(&config.nats_url)
        .await
        .with_context(|| format!("failed to connect to NATS at {}", config.nats_url))?;
    let blocks = client
        .subscribe(config.block_subject.clone())
        .await
        .context("failed to subscribe to block subject")?;
    let transactions = client
        .subscribe(config.tx_subject.clone())
        .await
        .context("failed to subscribe to transaction subject")?;

    connected.store(true, Ordering::SeqCst);
    info!(
        nats_url = %config.nats_url,
        block_subject = %config.block_subject,
        tx_subject = %config.tx_subject,
        "feed subscribed"
    );

    let mut messages = futures_util::stream::select(
        blocks.map(|msg| (FeedEvent::Block, msg.payload)),
        transactions.map(|msg| (FeedEvent::Transaction, msg.payload)),
    );

    loop {
        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,
            next = messages.next() => match next {
                Some((event, payload)) => forward(&relay, event, payload.to_vec()),
                None => {
                    warn!("feed subscriptions closed");
                    break;
                }
            },
        }
    }

    connected.store(false, Ordering::SeqCst);
    info!("feed stopped");
    Ok(())
}

fn forward(relay: &Relay, event: FeedEvent, payload: Vec<u8>) {
    debug!(?event, bytes = payload.len(), "feed message");
    let result = match event {
        FeedEvent::Block => relay.submit_block(payload),
        FeedEvent::Transaction => relay.submit_transaction(payload),
    };
    if let Err(e) = result {
        warn!(?event, error = %e, "dropping feed message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_after_shutdown_is_dropped() {
        let relay = Relay::start("bitcoincash").unwrap();
        relay.shutdown();
        forward(&relay, FeedEvent::Block, vec![0u8; 4]);
        forward(&relay, FeedEvent::Transaction, Vec::new());
        assert!(relay.submit_transaction(Vec::new()).is_err());
    }
}
