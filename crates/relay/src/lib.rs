//! bchsock-relay: subscription matching and event fan-out
//!
//! Raw blocks and transactions are decoded on one worker thread per event
//! type, matched against each client's subscriptions and broadcast as JSON.
//! Clients manage their subscriptions with small JSON control messages.

pub mod byte_cmp;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod message_handler;
pub mod messages;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod relay;
pub mod subscription;

pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use handler::RelayHandler;
pub use message_handler::{handle_message, ControlError};
pub use pipeline::DecodePipeline;
pub use registry::SubscriptionRegistry;
pub use relay::Relay;
pub use subscription::{OpReturnPrefix, Subscription, SubscriptionKind, MAX_OPRETURN_PREFIX};
