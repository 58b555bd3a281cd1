use std::fmt;

use crate::error::WebSocketError;
use crate::frame::{Message, OpCode};
use crate::request::HandshakeRequest;
use crate::{draft76, hybi13, policy};

/// Wire protocol negotiated for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Hybi13,
    Draft76,
    FlashPolicy,
}

impl Protocol {
    /// Choose a protocol from the version headers of an upgrade request.
    pub fn select(request: &HandshakeRequest) -> Option<Protocol> {
        let version = request
            .header("Sec-WebSocket-Version")
            .or_else(|| request.header("Sec-WebSocket-Draft"))
            .or_else(|| request.header("Sec-WebSocket-Key1").map(|_| "76"));

        match version? {
            "7" | "8" | "13" => Some(Protocol::Hybi13),
            "76" => Some(Protocol::Draft76),
            _ => None,
        }
    }

    pub fn handshake(
        &self,
        request: &HandshakeRequest,
        sub_protocol: Option<&str>,
    ) -> Result<Vec<u8>, WebSocketError> {
        match self {
            Protocol::Hybi13 => hybi13::handshake(request, sub_protocol),
            Protocol::Draft76 => draft76::handshake(request, sub_protocol),
            Protocol::FlashPolicy => Ok(policy::handshake()),
        }
    }

    /// Frame an outbound payload; `None` when the protocol has no such frame.
    pub fn encode(&self, opcode: OpCode, payload: &[u8]) -> Option<Vec<u8>> {
        match (self, opcode) {
            (Protocol::Hybi13, OpCode::Continuation) => None,
            (Protocol::Hybi13, _) => Some(hybi13::encode_frame(opcode, payload, true)),
            (Protocol::Draft76, OpCode::Text) => {
                std::str::from_utf8(payload).ok().map(draft76::encode_text)
            }
            _ => None,
        }
    }

    pub fn close_frame(&self, code: u16) -> Option<Vec<u8>> {
        match self {
            Protocol::Hybi13 => Some(hybi13::close_frame(code)),
            Protocol::Draft76 | Protocol::FlashPolicy => None,
        }
    }

    pub fn decoder(&self) -> Option<Decoder> {
        match self {
            Protocol::Hybi13 => Some(Decoder::Hybi13(hybi13::Decoder::new())),
            Protocol::Draft76 => Some(Decoder::Draft76(draft76::Decoder::new())),
            Protocol::FlashPolicy => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Hybi13 => write!(f, "hybi13"),
            Protocol::Draft76 => write!(f, "draft76"),
            Protocol::FlashPolicy => write!(f, "flash-policy"),
        }
    }
}

/// Inbound decoder for a negotiated protocol.
#[derive(Debug)]
pub enum Decoder {
    Hybi13(hybi13::Decoder),
    Draft76(draft76::Decoder),
}

impl Decoder {
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Message>, WebSocketError> {
        match self {
            Decoder::Hybi13(decoder) => decoder.feed(data),
            Decoder::Draft76(decoder) => decoder.feed(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> HandshakeRequest {
        HandshakeRequest {
            method: "GET".to_string(),
            path: "/".to_string(),
            scheme: "ws".to_string(),
            headers: headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            body: Vec::new(),
            raw: Vec::new(),
        }
    }

    #[test]
    fn test_select_by_version() {
        for version in ["7", "8", "13"] {
            assert_eq!(
                Protocol::select(&request(&[("Sec-WebSocket-Version", version)])),
                Some(Protocol::Hybi13)
            );
        }
        assert_eq!(
            Protocol::select(&request(&[("Sec-WebSocket-Draft", "8")])),
            Some(Protocol::Hybi13)
        );
        assert_eq!(
            Protocol::select(&request(&[("Sec-WebSocket-Key1", "1 2")])),
            Some(Protocol::Draft76)
        );
    }

    #[test]
    fn test_select_unsupported() {
        assert_eq!(Protocol::select(&request(&[])), None);
        assert_eq!(
            Protocol::select(&request(&[("Sec-WebSocket-Version", "4")])),
            None
        );
    }

    #[test]
    fn test_draft76_frames_only_text() {
        assert_eq!(
            Protocol::Draft76.encode(OpCode::Text, b"hi"),
            Some(vec![0x00, b'h', b'i', 0xff])
        );
        assert_eq!(Protocol::Draft76.encode(OpCode::Ping, b"hi"), None);
        assert_eq!(Protocol::Draft76.close_frame(1000), None);
    }

    #[test]
    fn test_hybi13_close_frame() {
        assert_eq!(
            Protocol::Hybi13.close_frame(1002),
            Some(vec![0x88, 0x02, 0x03, 0xea])
        );
    }
}
