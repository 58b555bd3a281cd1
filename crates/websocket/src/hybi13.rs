//! RFC 6455 framing (protocol versions 7, 8 and 13).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Buf, BytesMut};
use sha1::{Digest, Sha1};

use crate::error::{close_code, WebSocketError};
use crate::frame::{Frame, Message, OpCode};
use crate::request::HandshakeRequest;
use crate::MAX_MESSAGE_SIZE;

const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(ACCEPT_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

pub fn handshake(
    request: &HandshakeRequest,
    sub_protocol: Option<&str>,
) -> Result<Vec<u8>, WebSocketError> {
    let key = request
        .header("Sec-WebSocket-Key")
        .ok_or_else(|| WebSocketError::Handshake("missing Sec-WebSocket-Key".to_string()))?;

    let mut response = String::from("HTTP/1.1 101 Switching Protocols\r\n");
    response.push_str("Upgrade: websocket\r\n");
    response.push_str("Connection: Upgrade\r\n");
    if let Some(protocol) = sub_protocol {
        response.push_str(&format!("Sec-WebSocket-Protocol: {}\r\n", protocol));
    }
    response.push_str(&format!("Sec-WebSocket-Accept: {}\r\n\r\n", accept_key(key)));
    Ok(response.into_bytes())
}

/// Encode an unmasked server frame.
pub fn encode_frame(opcode: OpCode, payload: &[u8], fin: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 10);
    write_header(&mut out, opcode, payload.len(), fin, false);
    out.extend_from_slice(payload);
    out
}

/// Encode a masked frame as a client would send it.
pub fn encode_masked_frame(opcode: OpCode, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    write_header(&mut out, opcode, payload.len(), true, true);
    out.extend_from_slice(&mask);
    out.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    out
}

/// Close frame carrying `code`, or an empty close frame for codes that may not be sent.
pub fn close_frame(code: u16) -> Vec<u8> {
    if close_code::is_sendable(code) {
        encode_frame(OpCode::Close, &code.to_be_bytes(), true)
    } else {
        encode_frame(OpCode::Close, &[], true)
    }
}

fn write_header(out: &mut Vec<u8>, opcode: OpCode, len: usize, fin: bool, masked: bool) {
    let fin_bit = if fin { 0x80 } else { 0 };
    let mask_bit = if masked { 0x80 } else { 0 };
    out.push(fin_bit | opcode.as_u8());
    if len < 126 {
        out.push(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
}

/// Parse one complete client frame from the front of `buf`.
///
/// Returns `Ok(None)` and leaves `buf` untouched when the frame is incomplete.
pub fn parse_frame(buf: &mut BytesMut) -> Result<Option<Frame>, WebSocketError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let (b0, b1) = (buf[0], buf[1]);

    if b0 & 0x70 != 0 {
        return Err(WebSocketError::protocol(
            close_code::PROTOCOL_ERROR,
            "reserved bits set",
        ));
    }
    let fin = b0 & 0x80 != 0;
    let opcode = OpCode::from_u8(b0 & 0x0f).ok_or_else(|| {
        WebSocketError::protocol(
            close_code::PROTOCOL_ERROR,
            format!("unknown opcode {:#x}", b0 & 0x0f),
        )
    })?;
    if b1 & 0x80 == 0 {
        return Err(WebSocketError::protocol(
            close_code::PROTOCOL_ERROR,
            "client frames must be masked",
        ));
    }

    let (len, mut offset) = match b1 & 0x7f {
        126 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            (u64::from_be_bytes(raw), 10)
        }
        n => (u64::from(n), 2),
    };

    if opcode.is_control() && (!fin || len > 125) {
        return Err(WebSocketError::protocol(
            close_code::PROTOCOL_ERROR,
            "fragmented or oversized control frame",
        ));
    }
    if len > MAX_MESSAGE_SIZE as u64 {
        return Err(WebSocketError::protocol(
            close_code::MESSAGE_TOO_BIG,
            format!("frame of {} bytes", len),
        ));
    }

    let len = len as usize;
    if buf.len() < offset + 4 + len {
        return Ok(None);
    }
    let mask = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
    offset += 4;

    buf.advance(offset);
    let mut payload = buf.split_to(len);
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }

    Ok(Some(Frame {
        opcode,
        payload: payload.freeze(),
        fin,
    }))
}

/// Reassembles fragmented client messages.
#[derive(Debug, Default)]
pub struct Decoder {
    buf: BytesMut,
    fragments: Option<(OpCode, Vec<u8>)>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Message>, WebSocketError> {
        self.buf.extend_from_slice(data);
        let mut messages = Vec::new();

        while let Some(frame) = parse_frame(&mut self.buf)? {
            match frame.opcode {
                OpCode::Continuation => {
                    let Some((opcode, mut data)) = self.fragments.take() else {
                        return Err(WebSocketError::protocol(
                            close_code::PROTOCOL_ERROR,
                            "continuation without a started message",
                        ));
                    };
                    data.extend_from_slice(&frame.payload);
                    if data.len() > MAX_MESSAGE_SIZE {
                        return Err(WebSocketError::protocol(
                            close_code::MESSAGE_TOO_BIG,
                            format!("message of {} bytes", data.len()),
                        ));
                    }
                    if frame.fin {
                        messages.push(data_message(opcode, data)?);
                    } else {
                        self.fragments = Some((opcode, data));
                    }
                }
                OpCode::Text | OpCode::Binary => {
                    if self.fragments.is_some() {
                        return Err(WebSocketError::protocol(
                            close_code::PROTOCOL_ERROR,
                            "new message before previous fragments completed",
                        ));
                    }
                    if frame.fin {
                        messages.push(data_message(frame.opcode, frame.payload.to_vec())?);
                    } else {
                        self.fragments = Some((frame.opcode, frame.payload.to_vec()));
                    }
                }
                OpCode::Close => messages.push(close_message(&frame.payload)?),
                OpCode::Ping => messages.push(Message::Ping(frame.payload.to_vec())),
                OpCode::Pong => messages.push(Message::Pong(frame.payload.to_vec())),
            }
        }

        Ok(messages)
    }
}

fn data_message(opcode: OpCode, data: Vec<u8>) -> Result<Message, WebSocketError> {
    match opcode {
        OpCode::Text => String::from_utf8(data).map(Message::Text).map_err(|_| {
            WebSocketError::protocol(close_code::INVALID_PAYLOAD, "text frame is not UTF-8")
        }),
        _ => Ok(Message::Binary(data)),
    }
}

fn close_message(payload: &[u8]) -> Result<Message, WebSocketError> {
    match payload {
        [] => Ok(Message::Close(None)),
        [_] => Err(WebSocketError::protocol(
            close_code::PROTOCOL_ERROR,
            "truncated close code",
        )),
        [hi, lo, reason @ ..] => {
            let code = u16::from_be_bytes([*hi, *lo]);
            if !close_code::is_sendable(code) {
                return Err(WebSocketError::protocol(
                    close_code::PROTOCOL_ERROR,
                    format!("invalid close code {}", code),
                ));
            }
            if std::str::from_utf8(reason).is_err() {
                return Err(WebSocketError::protocol(
                    close_code::INVALID_PAYLOAD,
                    "close reason is not UTF-8",
                ));
            }
            Ok(Message::Close(Some(code)))
        }
    }
}
