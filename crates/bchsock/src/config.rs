use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use bchsock_websocket::ServerConfig;
use clap::{ArgAction, Parser};

/// bchsock: Bitcoin Cash block and transaction relay over WebSocket
#[derive(Parser, Debug)]
#[command(name = "bchsock")]
pub struct Config {
    /// WebSocket listener bind IP
    #[arg(long, env = "BCHSOCK_BIND_IP", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_ip: IpAddr,

    /// WebSocket listener port
    #[arg(long, env = "BCHSOCK_PORT", default_value_t = 8181)]
    pub port: u16,

    /// Rebind the listener after an accept failure instead of exiting
    #[arg(
        long,
        env = "BCHSOCK_RESTART_LISTENER",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub restart_after_listen_error: bool,

    /// Comma-separated WebSocket sub-protocols the server accepts
    #[arg(long, env = "BCHSOCK_SUB_PROTOCOLS", value_delimiter = ',')]
    pub sub_protocols: Vec<String>,

    /// NATS server URL carrying the raw block/tx feed
    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
    pub nats_url: String,

    /// Subject publishing raw serialized blocks
    #[arg(long, env = "BCHSOCK_BLOCK_SUBJECT", default_value = "bch.rawblock")]
    pub block_subject: String,

    /// Subject publishing raw serialized transactions
    #[arg(long, env = "BCHSOCK_TX_SUBJECT", default_value = "bch.rawtx")]
    pub tx_subject: String,

    /// CashAddr network prefix (bitcoincash, bchtest, bchreg)
    #[arg(long, env = "BCHSOCK_ADDRESS_PREFIX", default_value = "bitcoincash")]
    pub address_prefix: String,

    /// Health and metrics listen address
    #[arg(long, env = "BCHSOCK_HEALTH_ADDR", default_value = "0.0.0.0:9090")]
    pub health_addr: SocketAddr,

    /// Emit logs as JSON
    #[arg(long, env = "BCHSOCK_LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: SocketAddr::new(self.bind_ip, self.port),
            sub_protocols: self
                .sub_protocols
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            restart_after_listen_error: self.restart_after_listen_error,
            ..Default::default()
        }
    }
}
