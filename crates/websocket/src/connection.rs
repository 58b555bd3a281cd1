//! Per-connection lifecycle.
//!
//! Each accepted socket gets a reader task that owns the negotiated decoder
//! and a writer task that drains the connection's outbound queue, so frames
//! from concurrent producers never interleave on the wire.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{close_code, WebSocketError};
use crate::frame::{Message, OpCode};
use crate::negotiate::negotiate_sub_protocol;
use crate::policy;
use crate::protocol::{Decoder, Protocol};
use crate::request::{self, HandshakeRequest, ParseOutcome};
use crate::server::ServerConfig;

const READ_SIZE: usize = 4 * 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Connecting => 0,
            ConnectionState::Open => 1,
            ConnectionState::Closing => 2,
            ConnectionState::Closed => 3,
        }
    }
}

/// Details fixed at handshake time.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub protocol: Protocol,
    pub sub_protocol: Option<String>,
    pub path: String,
    pub origin: Option<String>,
    pub host: Option<String>,
}

impl ConnectionInfo {
    fn from_request(
        protocol: Protocol,
        request: &HandshakeRequest,
        sub_protocol: Option<String>,
    ) -> Self {
        Self {
            protocol,
            sub_protocol,
            path: request.path.clone(),
            origin: request.header("Origin").map(str::to_string),
            host: request.header("Host").map(str::to_string),
        }
    }
}

/// Items queued for a connection's writer.
#[derive(Debug, PartialEq, Eq)]
pub enum Outbound {
    Data(Vec<u8>),
    /// Write the optional close frame, then shut the socket down.
    Close(Option<Vec<u8>>),
}

/// Handle to one client connection, shared between the reader task and
/// anyone who wants to send to it.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    peer: SocketAddr,
    state: AtomicU8,
    info: OnceLock<ConnectionInfo>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    fn new(peer: SocketAddr, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
            info: OnceLock::new(),
            outbound,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `None` until the handshake completes.
    pub fn info(&self) -> Option<&ConnectionInfo> {
        self.info.get()
    }

    pub fn is_available(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Open
        )
    }

    pub fn send_text(&self, text: &str) -> Result<(), WebSocketError> {
        self.send(OpCode::Text, text.as_bytes())
    }

    pub fn send_binary(&self, data: &[u8]) -> Result<(), WebSocketError> {
        self.send(OpCode::Binary, data)
    }

    pub fn send_ping(&self, data: &[u8]) -> Result<(), WebSocketError> {
        self.send(OpCode::Ping, data)
    }

    pub fn send_pong(&self, data: &[u8]) -> Result<(), WebSocketError> {
        self.send(OpCode::Pong, data)
    }

    fn send(&self, opcode: OpCode, payload: &[u8]) -> Result<(), WebSocketError> {
        match self.state() {
            ConnectionState::Open => {}
            ConnectionState::Connecting => return Err(WebSocketError::NotOpen),
            ConnectionState::Closing | ConnectionState::Closed => {
                return Err(WebSocketError::Closed)
            }
        }
        let info = self.info.get().ok_or(WebSocketError::NotOpen)?;
        match info.protocol.encode(opcode, payload) {
            Some(frame) => self.enqueue(Outbound::Data(frame)),
            None => Ok(()),
        }
    }

    fn enqueue(&self, item: Outbound) -> Result<(), WebSocketError> {
        self.outbound.send(item).map_err(|_| WebSocketError::Closed)
    }

    /// Start closing with `code`. No-op once closing has begun.
    pub fn close(&self, code: u16) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            match ConnectionState::from_u8(current) {
                ConnectionState::Closing | ConnectionState::Closed => return,
                _ => {}
            }
            match self.state.compare_exchange(
                current,
                ConnectionState::Closing.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        debug!(conn_id = self.id, code, "closing connection");
        let frame = self
            .info
            .get()
            .and_then(|info| info.protocol.close_frame(code));
        let _ = self.enqueue(Outbound::Close(frame));
    }

    fn complete_handshake(
        &self,
        info: ConnectionInfo,
        response: Vec<u8>,
    ) -> Result<(), WebSocketError> {
        self.info
            .set(info)
            .map_err(|_| WebSocketError::Handshake("handshake already completed".to_string()))?;
        self.enqueue(Outbound::Data(response))?;
        self.state
            .compare_exchange(
                ConnectionState::Connecting.as_u8(),
                ConnectionState::Open.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| WebSocketError::Closed)
    }

    /// An open connection with no socket behind it; everything it would
    /// write arrives on the returned receiver.
    pub fn detached(
        peer: SocketAddr,
        protocol: Protocol,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new(peer, tx);
        let _ = conn.info.set(ConnectionInfo {
            protocol,
            sub_protocol: None,
            path: "/".to_string(),
            origin: None,
            host: None,
        });
        conn.state
            .store(ConnectionState::Open.as_u8(), Ordering::Release);
        (Arc::new(conn), rx)
    }

    /// Returns true the first time the connection reaches `Closed`.
    fn mark_closed(&self) -> bool {
        self.state
            .swap(ConnectionState::Closed.as_u8(), Ordering::AcqRel)
            != ConnectionState::Closed.as_u8()
    }
}

/// Lifecycle callbacks, invoked on the connection's reader task.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn on_open(&self, _conn: &Arc<Connection>) {}

    fn on_message(&self, _conn: &Arc<Connection>, _text: String) {}

    fn on_binary(&self, _conn: &Arc<Connection>, _data: Vec<u8>) {}

    fn on_ping(&self, conn: &Arc<Connection>, data: Vec<u8>) {
        if let Err(e) = conn.send_pong(&data) {
            debug!(conn_id = conn.id(), error = %e, "failed to send pong");
        }
    }

    fn on_pong(&self, _conn: &Arc<Connection>, _data: Vec<u8>) {}

    fn on_error(&self, _conn: &Arc<Connection>, _error: &WebSocketError) {}

    /// Fires once for every connection that reached `Open`.
    fn on_close(&self, _conn: &Arc<Connection>) {}
}

enum Step {
    Continue,
    Stop,
}

/// Run one accepted socket until it closes.
pub(crate) async fn drive<H: ConnectionHandler>(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    handler: Arc<H>,
) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    let conn = Arc::new(Connection::new(peer, outbound_tx));
    let (mut reader, writer) = stream.into_split();

    tokio::spawn(write_loop(conn.id, writer, outbound_rx, cancel_tx));

    let mut pending = BytesMut::new();
    let mut decoder: Option<Decoder> = None;
    let mut buf = vec![0u8; READ_SIZE];

    while conn.is_available() {
        let read = tokio::select! {
            read = reader.read(&mut buf) => read,
            _ = cancel_rx.changed() => break,
        };

        let n = match read {
            Ok(0) => {
                debug!(conn_id = conn.id, "peer closed socket");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                fail(&conn, handler.as_ref(), WebSocketError::Io(e));
                break;
            }
        };

        let step = match decoder.as_mut() {
            Some(decoder) => receive(&conn, handler.as_ref(), decoder, &buf[..n]),
            None => {
                pending.extend_from_slice(&buf[..n]);
                match handshake(&conn, handler.as_ref(), &config, &pending) {
                    Ok(Some((negotiated, consumed))) => {
                        decoder = Some(negotiated);
                        let leftover = pending.split_off(consumed);
                        pending.clear();
                        match (decoder.as_mut(), leftover.is_empty()) {
                            (Some(decoder), false) => {
                                receive(&conn, handler.as_ref(), decoder, &leftover)
                            }
                            _ => Step::Continue,
                        }
                    }
                    Ok(None) if pending.len() > config.max_handshake_bytes => {
                        debug!(conn_id = conn.id, bytes = pending.len(), "handshake too large");
                        Step::Stop
                    }
                    Ok(None) => Step::Continue,
                    Err(step) => step,
                }
            }
        };

        if let Step::Stop = step {
            break;
        }
    }

    // The writer exits after its first close item; any later one is dropped.
    let _ = conn.enqueue(Outbound::Close(None));
    let opened = conn.info().is_some_and(|info| info.protocol != Protocol::FlashPolicy);
    if conn.mark_closed() && opened {
        info!(conn_id = conn.id, peer = %conn.peer, "client disconnected");
        handler.on_close(&conn);
    }
}

/// Try to complete the handshake from buffered bytes.
///
/// `Ok(None)` means more bytes are needed.
fn handshake<H: ConnectionHandler>(
    conn: &Arc<Connection>,
    handler: &H,
    config: &ServerConfig,
    pending: &[u8],
) -> Result<Option<(Decoder, usize)>, Step> {
    let (request, consumed) = match request::parse(pending, &config.scheme) {
        ParseOutcome::Incomplete => return Ok(None),
        ParseOutcome::Invalid => {
            debug!(conn_id = conn.id, peer = %conn.peer, "unrecognised handshake");
            return Err(Step::Stop);
        }
        ParseOutcome::PolicyFile => {
            debug!(conn_id = conn.id, peer = %conn.peer, "serving flash policy");
            let info = ConnectionInfo {
                protocol: Protocol::FlashPolicy,
                sub_protocol: None,
                path: String::new(),
                origin: None,
                host: None,
            };
            let _ = conn.info.set(info);
            let _ = conn.enqueue(Outbound::Data(policy::handshake()));
            conn.close(close_code::NORMAL);
            return Err(Step::Stop);
        }
        ParseOutcome::Request { request, consumed } => (request, consumed),
    };

    let Some(protocol) = Protocol::select(&request) else {
        debug!(conn_id = conn.id, peer = %conn.peer, "unsupported websocket version");
        return Err(Step::Stop);
    };

    let negotiated = negotiate_sub_protocol(&config.sub_protocols, &request.sub_protocols())
        .and_then(|sub_protocol| {
            let response = protocol.handshake(&request, sub_protocol.as_deref())?;
            Ok((sub_protocol, response))
        });
    let (sub_protocol, response) = match negotiated {
        Ok(negotiated) => negotiated,
        Err(e) => {
            warn!(conn_id = conn.id, peer = %conn.peer, error = %e, "handshake rejected");
            fail(conn, handler, e);
            return Err(Step::Stop);
        }
    };

    let info = ConnectionInfo::from_request(protocol, &request, sub_protocol);
    if let Err(e) = conn.complete_handshake(info, response) {
        fail(conn, handler, e);
        return Err(Step::Stop);
    }

    info!(conn_id = conn.id, peer = %conn.peer, %protocol, path = %request.path, "client connected");
    handler.on_open(conn);

    match protocol.decoder() {
        Some(decoder) => Ok(Some((decoder, consumed))),
        None => Err(Step::Stop),
    }
}

fn receive<H: ConnectionHandler>(
    conn: &Arc<Connection>,
    handler: &H,
    decoder: &mut Decoder,
    data: &[u8],
) -> Step {
    let messages = match decoder.feed(data) {
        Ok(messages) => messages,
        Err(e) => {
            fail(conn, handler, e);
            return Step::Stop;
        }
    };

    for message in messages {
        if !conn.is_available() {
            return Step::Stop;
        }
        match message {
            Message::Text(text) => handler.on_message(conn, text),
            Message::Binary(data) => handler.on_binary(conn, data),
            Message::Ping(data) => handler.on_ping(conn, data),
            Message::Pong(data) => handler.on_pong(conn, data),
            Message::Close(code) => {
                conn.close(code.unwrap_or(close_code::NORMAL));
                return Step::Stop;
            }
        }
    }
    Step::Continue
}

fn fail<H: ConnectionHandler>(conn: &Arc<Connection>, handler: &H, error: WebSocketError) {
    match &error {
        WebSocketError::Io(e) => debug!(conn_id = conn.id, error = %e, "read failed"),
        e => warn!(conn_id = conn.id, peer = %conn.peer, error = %e, "protocol error"),
    }
    if conn.info().is_some() {
        handler.on_error(conn, &error);
    }
    conn.close(error.status_code());
}

async fn write_loop(
    conn_id: u64,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    cancel: watch::Sender<bool>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Data(bytes) => {
                if let Err(e) = writer.write_all(&bytes).await {
                    debug!(conn_id, error = %e, "failed to send, disconnecting");
                    break;
                }
            }
            Outbound::Close(frame) => {
                if let Some(frame) = frame {
                    if let Err(e) = writer.write_all(&frame).await {
                        debug!(conn_id, error = %e, "failed to send close frame");
                    }
                }
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
    let _ = cancel.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_send_uses_negotiated_framing() {
        let (conn, mut rx) = Connection::detached(peer(), Protocol::Draft76);
        conn.send_text("hi").unwrap();
        assert_eq!(rx.try_recv().unwrap(), Outbound::Data(vec![0x00, b'h', b'i', 0xff]));

        let (conn, mut rx) = Connection::detached(peer(), Protocol::Hybi13);
        conn.send_text("hi").unwrap();
        assert_eq!(rx.try_recv().unwrap(), Outbound::Data(vec![0x81, 0x02, b'h', b'i']));
    }

    #[test]
    fn test_no_send_before_handshake() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = Connection::new(peer(), tx);
        assert_eq!(conn.state(), ConnectionState::Connecting);

        assert!(matches!(conn.send_text("early"), Err(WebSocketError::NotOpen)));
        assert!(matches!(conn.send_ping(b"early"), Err(WebSocketError::NotOpen)));
        assert!(rx.try_recv().is_err());

        conn.close(close_code::NORMAL);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close(None));
        assert!(rx.try_recv().is_err());
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (conn, mut rx) = Connection::detached(peer(), Protocol::Hybi13);
        conn.close(close_code::NORMAL);
        conn.close(close_code::PROTOCOL_ERROR);

        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Close(Some(vec![0x88, 0x02, 0x03, 0xe8]))
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(matches!(conn.send_text("late"), Err(WebSocketError::Closed)));
    }

    #[test]
    fn test_draft76_close_has_no_frame() {
        let (conn, mut rx) = Connection::detached(peer(), Protocol::Draft76);
        conn.close(close_code::NORMAL);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close(None));
    }

    #[test]
    fn test_send_fails_once_writer_is_gone() {
        let (conn, rx) = Connection::detached(peer(), Protocol::Hybi13);
        drop(rx);
        assert!(matches!(conn.send_text("hi"), Err(WebSocketError::Closed)));
    }

    #[test]
    fn test_mark_closed_reports_first_transition() {
        let (conn, _rx) = Connection::detached(peer(), Protocol::Hybi13);
        assert!(conn.mark_closed());
        assert!(!conn.mark_closed());
        assert!(!conn.is_available());
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let (a, _rx_a) = Connection::detached(peer(), Protocol::Hybi13);
        let (b, _rx_b) = Connection::detached(peer(), Protocol::Hybi13);
        assert_ne!(a.id(), b.id());
    }
}
