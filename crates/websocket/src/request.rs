//! Upgrade request parsing.
//!
//! Accepts an HTTP/1.1 request line plus headers, or the legacy
//! `<policy-file-request/>` probe sent by flash clients.

use once_cell::sync::Lazy;
use regex::Regex;

static REQUEST_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<method>\S+) (?P<path>\S+) HTTP/1\.1$")
        .expect("Failed to compile request line pattern")
});

static POLICY_REQUEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^<policy-file-request\s*/>").expect("Failed to compile policy request pattern")
});

const POLICY_TAG: &[u8] = b"<policy-file-request";
const HEADER_END: &[u8] = b"\r\n\r\n";
const CHALLENGE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub method: String,
    pub path: String,
    pub scheme: String,
    /// Headers in the order received.
    pub headers: Vec<(String, String)>,
    /// Bytes following the header block that belong to the handshake.
    pub body: Vec<u8>,
    pub raw: Vec<u8>,
}

impl HandshakeRequest {
    /// Case-insensitive header lookup; a repeated header resolves to its last value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sub-protocols offered by the client, in preference order.
    pub fn sub_protocols(&self) -> Vec<String> {
        self.header("Sec-WebSocket-Protocol")
            .map(|value| {
                value
                    .split([',', ' '])
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// A complete upgrade request; `consumed` bytes belong to the handshake.
    Request {
        request: HandshakeRequest,
        consumed: usize,
    },
    PolicyFile,
    /// More bytes are needed before the request can be classified.
    Incomplete,
    Invalid,
}

pub fn parse(data: &[u8], scheme: &str) -> ParseOutcome {
    if data.first() == Some(&b'<') {
        return parse_policy(data);
    }

    let Some(header_end) = find(data, HEADER_END) else {
        return ParseOutcome::Incomplete;
    };
    let Ok(head) = std::str::from_utf8(&data[..header_end]) else {
        return ParseOutcome::Invalid;
    };

    let mut lines = head.split("\r\n");
    let Some(caps) = lines.next().and_then(|line| REQUEST_LINE.captures(line)) else {
        return ParseOutcome::Invalid;
    };

    let mut headers = Vec::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            return ParseOutcome::Invalid;
        };
        let name = name.trim();
        if name.is_empty() {
            return ParseOutcome::Invalid;
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }

    let mut request = HandshakeRequest {
        method: caps["method"].to_string(),
        path: caps["path"].to_string(),
        scheme: scheme.to_string(),
        headers,
        body: Vec::new(),
        raw: Vec::new(),
    };

    // Draft76 clients send an 8-byte challenge after the header block.
    let body_start = header_end + HEADER_END.len();
    let body_len = if request.header("Sec-WebSocket-Key1").is_some() {
        CHALLENGE_LEN
    } else {
        0
    };
    let consumed = body_start + body_len;
    if data.len() < consumed {
        return ParseOutcome::Incomplete;
    }

    request.body = data[body_start..consumed].to_vec();
    request.raw = data[..consumed].to_vec();
    ParseOutcome::Request { request, consumed }
}

fn parse_policy(data: &[u8]) -> ParseOutcome {
    let text = String::from_utf8_lossy(data);
    if POLICY_REQUEST.is_match(&text) {
        return ParseOutcome::PolicyFile;
    }
    let prefix_len = data.len().min(POLICY_TAG.len());
    if data.len() < POLICY_TAG.len() + 2
        && data[..prefix_len].eq_ignore_ascii_case(&POLICY_TAG[..prefix_len])
    {
        return ParseOutcome::Incomplete;
    }
    ParseOutcome::Invalid
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
