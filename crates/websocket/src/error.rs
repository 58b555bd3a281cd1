use thiserror::Error;

/// RFC 6455 close status codes.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const UNSUPPORTED_DATA: u16 = 1003;
    pub const NO_STATUS: u16 = 1005;
    pub const ABNORMAL: u16 = 1006;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    pub const MANDATORY_EXTENSION: u16 = 1010;
    pub const INTERNAL_ERROR: u16 = 1011;

    /// Codes a peer may legally put on the wire in a close frame.
    pub fn is_sendable(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
    }
}

#[derive(Error, Debug)]
pub enum WebSocketError {
    #[error("protocol error ({code}): {reason}")]
    Protocol { code: u16, reason: String },
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("sub-protocol negotiation failed: {0}")]
    SubProtocol(String),
    #[error("connection is not open")]
    NotOpen,
    #[error("connection closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WebSocketError {
    pub fn protocol(code: u16, reason: impl Into<String>) -> Self {
        WebSocketError::Protocol {
            code,
            reason: reason.into(),
        }
    }

    /// Close code used when this error tears the connection down.
    pub fn status_code(&self) -> u16 {
        match self {
            WebSocketError::Protocol { code, .. } => *code,
            WebSocketError::Handshake(_) | WebSocketError::SubProtocol(_) => {
                close_code::PROTOCOL_ERROR
            }
            WebSocketError::Io(_) => close_code::ABNORMAL,
            WebSocketError::NotOpen | WebSocketError::Closed => close_code::INTERNAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            WebSocketError::protocol(close_code::MESSAGE_TOO_BIG, "too big").status_code(),
            1009
        );
        assert_eq!(
            WebSocketError::SubProtocol("none".into()).status_code(),
            close_code::PROTOCOL_ERROR
        );
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert_eq!(WebSocketError::from(io).status_code(), close_code::ABNORMAL);
    }

    #[test]
    fn test_sendable_codes() {
        assert!(close_code::is_sendable(close_code::NORMAL));
        assert!(close_code::is_sendable(4000));
        assert!(!close_code::is_sendable(close_code::NO_STATUS));
        assert!(!close_code::is_sendable(close_code::ABNORMAL));
        assert!(!close_code::is_sendable(999));
    }
}
