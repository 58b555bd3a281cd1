//! Wires the registry, dispatcher and both decode pipelines together.

use std::sync::Arc;

use bchsock_chain::{Block, Transaction};
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::handler::RelayHandler;
use crate::metrics::EventMetrics;
use crate::pipeline::DecodePipeline;
use crate::registry::SubscriptionRegistry;

pub struct Relay {
    registry: Arc<SubscriptionRegistry>,
    handler: Arc<RelayHandler>,
    blocks: DecodePipeline,
    transactions: DecodePipeline,
}

impl Relay {
    /// Start both decode workers. `address_prefix` is the CashAddr network
    /// prefix used to read client addresses and render outputs.
    pub fn start(address_prefix: &str) -> Result<Self> {
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), address_prefix));

        let block_dispatcher = Arc::clone(&dispatcher);
        let blocks = DecodePipeline::spawn(
            EventMetrics::new("block"),
            Block::decode,
            move |block: Block| block_dispatcher.handle_block(&block),
        )?;
        let transactions = DecodePipeline::spawn(
            EventMetrics::new("transaction"),
            Transaction::decode,
            move |tx: Transaction| dispatcher.handle_transaction(&tx),
        )?;

        let handler = Arc::new(RelayHandler::new(Arc::clone(&registry), address_prefix));
        info!(address_prefix, "relay started");
        Ok(Self {
            registry,
            handler,
            blocks,
            transactions,
        })
    }

    /// Connection callbacks to hand to the WebSocket server.
    pub fn handler(&self) -> Arc<RelayHandler> {
        Arc::clone(&self.handler)
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Queue a raw serialized block.
    pub fn submit_block(&self, raw: Vec<u8>) -> Result<()> {
        self.blocks.submit(raw)
    }

    /// Queue a raw serialized transaction.
    pub fn submit_transaction(&self, raw: Vec<u8>) -> Result<()> {
        self.transactions.submit(raw)
    }

    /// Drain and stop both pipelines.
    pub fn shutdown(&self) {
        self.blocks.shutdown();
        self.transactions.shutdown();
    }
}
