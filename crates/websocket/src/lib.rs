//! bchsock-websocket: WebSocket server over raw TCP
//!
//! Speaks RFC 6455 (versions 7, 8 and 13) and the older hixie-76 draft, and
//! answers flash `<policy-file-request/>` probes on the same port.

pub mod connection;
pub mod draft76;
pub mod error;
pub mod frame;
pub mod hybi13;
pub mod negotiate;
pub mod policy;
pub mod protocol;
pub mod request;
pub mod server;

pub use connection::{Connection, ConnectionHandler, ConnectionInfo, ConnectionState, Outbound};
pub use error::{close_code, WebSocketError};
pub use frame::{Frame, Message, OpCode};
pub use negotiate::negotiate_sub_protocol;
pub use protocol::Protocol;
pub use request::{HandshakeRequest, ParseOutcome};
pub use server::{Server, ServerConfig};

/// Largest message accepted from a client, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 5 * 1024 * 1024;
