use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol as SocketProtocol, SockRef, Socket, TcpKeepalive, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::connection::{self, ConnectionHandler};
use crate::error::WebSocketError;

const LISTEN_BACKLOG: i32 = 1024;
const RESTART_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// `ws`, echoed into Draft76 `Sec-WebSocket-Location`.
    pub scheme: String,
    pub sub_protocols: Vec<String>,
    pub restart_after_listen_error: bool,
    pub keepalive_time: Duration,
    pub keepalive_interval: Duration,
    /// Connections whose handshake exceeds this many bytes are dropped.
    pub max_handshake_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8181)),
            scheme: "ws".to_string(),
            sub_protocols: Vec::new(),
            restart_after_listen_error: true,
            keepalive_time: Duration::from_secs(60),
            keepalive_interval: Duration::from_secs(10),
            max_handshake_bytes: 16 * 1024,
        }
    }
}

/// Accept loop handing each socket to a connection task.
pub struct Server {
    config: Arc<ServerConfig>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, WebSocketError> {
        let listener = listen(config.bind_addr)?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "websocket server listening");
        Ok(Self {
            config: Arc::new(config),
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` flips to true.
    pub async fn run<H: ConnectionHandler>(
        self,
        handler: Arc<H>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), WebSocketError> {
        let Server {
            config,
            mut listener,
            local_addr,
        } = self;

        loop {
            let accepted = tokio::select! {
                _ = shutdown.changed() => {
                    info!("websocket server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = configure(&stream, &config) {
                        debug!(peer = %peer, error = %e, "failed to set socket options");
                    }
                    debug!(peer = %peer, "accepted connection");
                    tokio::spawn(connection::drive(
                        stream,
                        peer,
                        config.clone(),
                        handler.clone(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "listener accept failed");
                    if !config.restart_after_listen_error {
                        return Err(e.into());
                    }
                    // The old socket must be released before the address can be bound again.
                    drop(listener);
                    listener = rebind(local_addr).await?;
                }
            }
        }
    }
}

async fn rebind(addr: SocketAddr) -> Result<TcpListener, WebSocketError> {
    info!(addr = %addr, "restarting listener");
    tokio::time::sleep(RESTART_DELAY).await;
    match listen(addr) {
        Ok(listener) => {
            info!(addr = %addr, "listener restarted");
            Ok(listener)
        }
        Err(e) => {
            error!(addr = %addr, error = %e, "listener could not be restarted");
            Err(e.into())
        }
    }
}

fn listen(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(SocketProtocol::TCP))?;
    socket.set_reuse_address(true)?;
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    TcpListener::from_std(socket.into())
}

fn configure(stream: &TcpStream, config: &ServerConfig) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let keepalive = TcpKeepalive::new()
        .with_time(config.keepalive_time)
        .with_interval(config.keepalive_interval);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8181);
        assert_eq!(config.scheme, "ws");
        assert!(config.restart_after_listen_error);
        assert_eq!(config.max_handshake_bytes, 16 * 1024);
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = Server::bind(config).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_restart_rebinds_same_address() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr();
        drop(server);

        let listener = rebind(addr).await.unwrap();
        assert_eq!(listener.local_addr().unwrap(), addr);
    }
}
