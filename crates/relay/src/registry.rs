//! Live connections and the subscriptions each one holds.
//!
//! One coarse mutex serializes every mutation and lookup. Lookups return a
//! snapshot of matching connections so callers send after the lock is
//! released; a send that ends up closing a connection can then re-enter the
//! registry without deadlocking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bchsock_websocket::Connection;
use tracing::debug;

use crate::metrics;
use crate::subscription::Subscription;

#[derive(Debug)]
struct Entry {
    conn: Arc<Connection>,
    subscriptions: Vec<Subscription>,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<HashMap<u64, Entry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track a connection with an empty subscription set. Re-adding a tracked
    /// connection leaves its subscriptions in place.
    pub fn add_socket(&self, conn: &Arc<Connection>) {
        let mut inner = self.lock();
        inner.entry(conn.id()).or_insert_with(|| Entry {
            conn: Arc::clone(conn),
            subscriptions: Vec::new(),
        });
        debug!(conn_id = conn.id(), sockets = inner.len(), "socket registered");
    }

    /// Forget a connection and everything it subscribed to.
    pub fn remove_socket(&self, conn: &Connection) -> bool {
        let Some(entry) = self.lock().remove(&conn.id()) else {
            return false;
        };
        for sub in &entry.subscriptions {
            metrics::add_subscriptions(sub.kind().as_str(), -1);
        }
        debug!(
            conn_id = conn.id(),
            subscriptions = entry.subscriptions.len(),
            "socket removed"
        );
        true
    }

    /// Append `sub` to the connection's set. Duplicates are allowed.
    /// Returns false when the connection is not tracked.
    pub fn add_subscription(&self, conn: &Connection, sub: Subscription) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.get_mut(&conn.id()) else {
            return false;
        };
        metrics::add_subscriptions(sub.kind().as_str(), 1);
        entry.subscriptions.push(sub);
        true
    }

    /// Remove the first subscription that matches `sub`.
    pub fn remove_subscription(&self, conn: &Connection, sub: &Subscription) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.get_mut(&conn.id()) else {
            return false;
        };
        match entry.subscriptions.iter().position(|s| s.matches(sub)) {
            Some(index) => {
                let removed = entry.subscriptions.remove(index);
                metrics::add_subscriptions(removed.kind().as_str(), -1);
                true
            }
            None => false,
        }
    }

    /// Connections holding at least one subscription that matches `sub`.
    pub fn sockets_with_subscription(&self, sub: &Subscription) -> Vec<Arc<Connection>> {
        self.lock()
            .values()
            .filter(|entry| entry.subscriptions.iter().any(|s| s.matches(sub)))
            .map(|entry| Arc::clone(&entry.conn))
            .collect()
    }

    pub fn socket_count(&self) -> usize {
        self.lock().len()
    }

    /// Subscriptions held by one connection, zero if it is not tracked.
    pub fn subscription_count(&self, conn: &Connection) -> usize {
        self.lock()
            .get(&conn.id())
            .map_or(0, |entry| entry.subscriptions.len())
    }
}
