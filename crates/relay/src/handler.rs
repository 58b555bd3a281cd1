use std::sync::Arc;

use bchsock_websocket::{Connection, ConnectionHandler, WebSocketError};
use tracing::debug;

use crate::message_handler;
use crate::metrics;
use crate::registry::SubscriptionRegistry;

/// Ties WebSocket connection lifecycle to the subscription registry.
pub struct RelayHandler {
    registry: Arc<SubscriptionRegistry>,
    address_prefix: String,
}

impl RelayHandler {
    pub fn new(registry: Arc<SubscriptionRegistry>, address_prefix: impl Into<String>) -> Self {
        Self {
            registry,
            address_prefix: address_prefix.into(),
        }
    }
}

impl ConnectionHandler for RelayHandler {
    fn on_open(&self, conn: &Arc<Connection>) {
        self.registry.add_socket(conn);
        metrics::inc_connections();
    }

    fn on_message(&self, conn: &Arc<Connection>, text: String) {
        message_handler::handle_message(conn, &text, &self.registry, &self.address_prefix);
    }

    fn on_error(&self, conn: &Arc<Connection>, error: &WebSocketError) {
        debug!(
            conn_id = conn.id(),
            subscriptions = self.registry.subscription_count(conn),
            error = %error,
            "subscriber connection error"
        );
    }

    fn on_close(&self, conn: &Arc<Connection>) {
        if self.registry.remove_socket(conn) {
            metrics::dec_connections();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::Subscription;
    use bchsock_websocket::Protocol;

    #[test]
    fn test_lifecycle_updates_registry() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let handler = RelayHandler::new(Arc::clone(&registry), "bitcoincash");
        let (conn, _rx) = Connection::detached("127.0.0.1:1".parse().unwrap(), Protocol::Draft76);

        handler.on_open(&conn);
        assert_eq!(registry.socket_count(), 1);

        handler.on_message(&conn, r#"{"op":"block"}"#.to_string());
        assert_eq!(
            registry.sockets_with_subscription(&Subscription::Block).len(),
            1
        );

        handler.on_close(&conn);
        assert_eq!(registry.socket_count(), 0);
        assert!(registry
            .sockets_with_subscription(&Subscription::Block)
            .is_empty());
    }
}
