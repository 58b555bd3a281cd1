//! hixie-76 handshake and `0x00 ... 0xFF` text framing.

use bytes::{Buf, BytesMut};

use crate::error::{close_code, WebSocketError};
use crate::frame::Message;
use crate::request::HandshakeRequest;
use crate::MAX_MESSAGE_SIZE;

const START: u8 = 0x00;
const END: u8 = 0xFF;

pub fn handshake(
    request: &HandshakeRequest,
    sub_protocol: Option<&str>,
) -> Result<Vec<u8>, WebSocketError> {
    let key1 = required_header(request, "Sec-WebSocket-Key1")?;
    let key2 = required_header(request, "Sec-WebSocket-Key2")?;
    let challenge: [u8; 8] = request
        .body
        .as_slice()
        .try_into()
        .map_err(|_| WebSocketError::Handshake("challenge must be 8 bytes".to_string()))?;
    let answer = answer_bytes(key1, key2, &challenge)?;

    let mut response = String::from("HTTP/1.1 101 WebSocket Protocol Handshake\r\n");
    response.push_str("Upgrade: WebSocket\r\n");
    response.push_str("Connection: Upgrade\r\n");
    response.push_str(&format!(
        "Sec-WebSocket-Origin: {}\r\n",
        request.header("Origin").unwrap_or_default()
    ));
    response.push_str(&format!(
        "Sec-WebSocket-Location: {}://{}{}\r\n",
        request.scheme,
        request.header("Host").unwrap_or_default(),
        request.path
    ));
    if let Some(protocol) = sub_protocol {
        response.push_str(&format!("Sec-WebSocket-Protocol: {}\r\n", protocol));
    }
    response.push_str("\r\n");

    let mut bytes = response.into_bytes();
    bytes.extend_from_slice(&answer);
    Ok(bytes)
}

fn required_header<'a>(
    request: &'a HandshakeRequest,
    name: &str,
) -> Result<&'a str, WebSocketError> {
    request
        .header(name)
        .ok_or_else(|| WebSocketError::Handshake(format!("missing {}", name)))
}

/// MD5 over both decoded keys and the 8-byte challenge.
pub fn answer_bytes(key1: &str, key2: &str, challenge: &[u8; 8]) -> Result<[u8; 16], WebSocketError> {
    let mut raw = [0u8; 16];
    raw[..4].copy_from_slice(&parse_key(key1)?.to_be_bytes());
    raw[4..8].copy_from_slice(&parse_key(key2)?.to_be_bytes());
    raw[8..].copy_from_slice(challenge);
    Ok(md5::compute(raw).0)
}

/// Digits of the key read as one integer, divided by the number of spaces.
pub fn parse_key(key: &str) -> Result<u32, WebSocketError> {
    let spaces = key.chars().filter(|&c| c == ' ').count() as u64;
    if spaces == 0 {
        return Err(WebSocketError::Handshake(format!(
            "key '{}' contains no spaces",
            key
        )));
    }

    let number = key
        .chars()
        .filter_map(|c| c.to_digit(10))
        .try_fold(0u64, |acc, d| acc.checked_mul(10)?.checked_add(u64::from(d)))
        .ok_or_else(|| WebSocketError::Handshake(format!("key '{}' overflows", key)))?;

    u32::try_from(number / spaces)
        .map_err(|_| WebSocketError::Handshake(format!("key '{}' out of range", key)))
}

pub fn encode_text(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 2);
    out.push(START);
    out.extend_from_slice(text.as_bytes());
    out.push(END);
    out
}

#[derive(Debug, Default)]
pub struct Decoder {
    buf: BytesMut,
    /// Bytes of `buf` already searched for the end marker.
    scanned: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Message>, WebSocketError> {
        self.buf.extend_from_slice(data);
        let mut messages = Vec::new();

        while let Some(&first) = self.buf.first() {
            if first != START {
                return Err(WebSocketError::protocol(
                    close_code::INVALID_PAYLOAD,
                    "message does not start with 0x00",
                ));
            }

            let found = self.buf[self.scanned..]
                .iter()
                .position(|&b| b == END)
                .map(|i| self.scanned + i);
            let Some(end) = found else {
                self.scanned = self.buf.len();
                if self.buf.len() - 1 > MAX_MESSAGE_SIZE {
                    return Err(WebSocketError::protocol(
                        close_code::MESSAGE_TOO_BIG,
                        format!("unterminated message of {} bytes", self.buf.len() - 1),
                    ));
                }
                break;
            };
            if end - 1 > MAX_MESSAGE_SIZE {
                return Err(WebSocketError::protocol(
                    close_code::MESSAGE_TOO_BIG,
                    format!("message of {} bytes", end - 1),
                ));
            }

            self.buf.advance(1);
            let payload = self.buf.split_to(end - 1);
            self.buf.advance(1);
            self.scanned = 0;

            let text = String::from_utf8(payload.to_vec()).map_err(|_| {
                WebSocketError::protocol(close_code::INVALID_PAYLOAD, "message is not UTF-8")
            })?;
            messages.push(Message::Text(text));
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY1: &str = "4 @1  46546xW%0l 1 5";
    const KEY2: &str = "12998 5 Y3 1  .P00";

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key(KEY1).unwrap(), 829_309_203);
        assert_eq!(parse_key(KEY2).unwrap(), 259_970_620);
        assert!(parse_key("12345").is_err());
    }

    #[test]
    fn test_answer_matches_published_vector() {
        let answer = answer_bytes(KEY1, KEY2, b"^n:ds[4U").unwrap();
        assert_eq!(&answer, b"8jKS'y:G*Co,Wxa-");
    }

    #[test]
    fn test_handshake_response() {
        let request = HandshakeRequest {
            method: "GET".to_string(),
            path: "/demo".to_string(),
            scheme: "ws".to_string(),
            headers: vec![
                ("Host".to_string(), "example.com".to_string()),
                ("Origin".to_string(), "http://example.com".to_string()),
                ("Sec-WebSocket-Key1".to_string(), KEY1.to_string()),
                ("Sec-WebSocket-Key2".to_string(), KEY2.to_string()),
            ],
            body: b"^n:ds[4U".to_vec(),
            raw: Vec::new(),
        };

        let response = handshake(&request, Some("sample")).unwrap();
        let (head, digest) = response.split_at(response.len() - 16);
        let head = std::str::from_utf8(head).unwrap();

        assert!(head.starts_with("HTTP/1.1 101 WebSocket Protocol Handshake\r\n"));
        assert!(head.contains("Sec-WebSocket-Origin: http://example.com\r\n"));
        assert!(head.contains("Sec-WebSocket-Location: ws://example.com/demo\r\n"));
        assert!(head.contains("Sec-WebSocket-Protocol: sample\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
        assert_eq!(digest, b"8jKS'y:G*Co,Wxa-");
    }

    #[test]
    fn test_decode_messages() {
        let mut decoder = Decoder::new();
        let mut data = encode_text("hello");
        data.extend(encode_text("world"));
        data.extend_from_slice(&[START, b'p']);

        assert_eq!(
            decoder.feed(&data).unwrap(),
            vec![
                Message::Text("hello".to_string()),
                Message::Text("world".to_string())
            ]
        );
        assert_eq!(
            decoder.feed(b"art\xff").unwrap(),
            vec![Message::Text("part".to_string())]
        );
    }

    #[test]
    fn test_missing_start_byte() {
        let err = Decoder::new().feed(b"hello\xff").unwrap_err();
        assert_eq!(err.status_code(), close_code::INVALID_PAYLOAD);
    }

    #[test]
    fn test_oversized_message() {
        let mut data = vec![START];
        data.resize(MAX_MESSAGE_SIZE + 2, b'a');
        let err = Decoder::new().feed(&data).unwrap_err();
        assert_eq!(err.status_code(), close_code::MESSAGE_TOO_BIG);
    }

    #[test]
    fn test_large_message_in_small_reads() {
        let mut decoder = Decoder::new();
        assert!(decoder.feed(&[START]).unwrap().is_empty());

        let chunk = [b'a'; 4096];
        let chunks = (MAX_MESSAGE_SIZE - 1) / chunk.len();
        for _ in 0..chunks {
            assert!(decoder.feed(&chunk).unwrap().is_empty());
            assert_eq!(decoder.scanned, decoder.buf.len());
        }

        let mut tail = b"bc".to_vec();
        tail.push(END);
        tail.extend(encode_text("next"));
        let messages = decoder.feed(&tail).unwrap();
        assert_eq!(messages.len(), 2);
        let Message::Text(first) = &messages[0] else {
            panic!("expected text message");
        };
        assert_eq!(first.len(), chunks * chunk.len() + 2);
        assert!(first.ends_with("abc"));
        assert_eq!(messages[1], Message::Text("next".to_string()));
        assert_eq!(decoder.scanned, 0);
        assert!(decoder.buf.is_empty());
    }

    #[test]
    fn test_empty_message() {
        assert_eq!(
            Decoder::new().feed(&[START, END]).unwrap(),
            vec![Message::Text(String::new())]
        );
    }
}
