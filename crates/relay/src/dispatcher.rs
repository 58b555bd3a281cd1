//! Fan decoded events out to the connections subscribed to them.

use std::sync::Arc;

use bchsock_chain::{Block, ScriptType, Transaction};
use bchsock_websocket::{close_code, Connection};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::messages::{NewBlock, NewTx};
use crate::metrics::EventMetrics;
use crate::registry::SubscriptionRegistry;
use crate::subscription::{OpReturnPrefix, Subscription, MAX_OPRETURN_PREFIX};

pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    address_prefix: String,
    block_metrics: EventMetrics,
    tx_metrics: EventMetrics,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>, address_prefix: impl Into<String>) -> Self {
        Self {
            registry,
            address_prefix: address_prefix.into(),
            block_metrics: EventMetrics::new("block"),
            tx_metrics: EventMetrics::new("transaction"),
        }
    }

    pub fn handle_block(&self, block: &Block) {
        let targets = self.registry.sockets_with_subscription(&Subscription::Block);
        debug!(
            block_hash = %block.hash_hex(),
            targets = targets.len(),
            "dispatching block"
        );
        if targets.is_empty() {
            return;
        }
        broadcast(&self.block_metrics, &NewBlock::new(block), &targets);
    }

    /// Every matching output contributes its subscribers, so a connection that
    /// matches twice is sent the transaction twice.
    pub fn handle_transaction(&self, tx: &Transaction) {
        let mut targets = Vec::new();
        for output in &tx.outputs {
            let sub = match output.script_type {
                ScriptType::P2pkh | ScriptType::P2sh => output
                    .decoded_address(&self.address_prefix)
                    .map(Subscription::Address),
                ScriptType::Data => output
                    .op_return_data(MAX_OPRETURN_PREFIX)
                    .map(|data| Subscription::OpReturn(OpReturnPrefix::truncated(&data))),
                ScriptType::P2pk | ScriptType::Other => None,
            };
            if let Some(sub) = sub {
                targets.extend(self.registry.sockets_with_subscription(&sub));
            }
        }
        targets.extend(
            self.registry
                .sockets_with_subscription(&Subscription::Transaction),
        );

        debug!(txid = %tx.txid_hex(), targets = targets.len(), "dispatching transaction");
        if targets.is_empty() {
            return;
        }
        broadcast(
            &self.tx_metrics,
            &NewTx::new(tx, &self.address_prefix),
            &targets,
        );
    }
}

/// Serialize once and send to each target. A failed send closes that
/// connection and the rest still receive the message.
fn broadcast<T: Serialize>(metrics: &EventMetrics, message: &T, targets: &[Arc<Connection>]) {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            error!(event = metrics.event(), error = %e, "failed to serialize broadcast");
            return;
        }
    };

    let mut sent = 0;
    for conn in targets {
        match conn.send_text(&text) {
            Ok(()) => sent += 1,
            Err(e) => {
                metrics.inc_broadcast_failure();
                warn!(
                    conn_id = conn.id(),
                    peer = %conn.peer(),
                    event = metrics.event(),
                    error = %e,
                    "broadcast failed, closing connection"
                );
                conn.close(close_code::INTERNAL_ERROR);
            }
        }
    }
    metrics.add_broadcasts(sent);
}
