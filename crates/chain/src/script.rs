//! Output script classification and data extraction.

use std::fmt;

const OP_RETURN: u8 = 0x6a;
const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_EQUAL: u8 = 0x87;
const OP_CHECKSIG: u8 = 0xac;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;

/// Standard output script templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptType {
    P2pkh,
    P2sh,
    P2pk,
    Data,
    Other,
}

impl ScriptType {
    /// Classify a raw locking script.
    pub fn classify(script: &[u8]) -> Self {
        match script {
            [OP_DUP, OP_HASH160, 20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
                ScriptType::P2pkh
            }
            [OP_HASH160, 20, hash @ .., OP_EQUAL] if hash.len() == 20 => ScriptType::P2sh,
            [OP_RETURN, ..] => ScriptType::Data,
            [33, key @ .., OP_CHECKSIG] if key.len() == 33 => ScriptType::P2pk,
            [65, key @ .., OP_CHECKSIG] if key.len() == 65 => ScriptType::P2pk,
            _ => ScriptType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::P2pkh => "P2PKH",
            ScriptType::P2sh => "P2SH",
            ScriptType::P2pk => "P2PK",
            ScriptType::Data => "DATA",
            ScriptType::Other => "OTHER",
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The 20-byte hash carried by a P2PKH or P2SH script.
pub fn hash160(script: &[u8]) -> Option<[u8; 20]> {
    let hash = match ScriptType::classify(script) {
        ScriptType::P2pkh => &script[3..23],
        ScriptType::P2sh => &script[2..22],
        _ => return None,
    };
    let mut out = [0u8; 20];
    out.copy_from_slice(hash);
    Some(out)
}

/// Concatenated push payloads following OP_RETURN, truncated to `max` bytes.
///
/// Stops at the first non-push opcode or truncated push.
pub fn op_return_data(script: &[u8], max: usize) -> Option<Vec<u8>> {
    let mut rest = script.strip_prefix(&[OP_RETURN])?;
    let mut data = Vec::new();

    while data.len() < max {
        let Some((&opcode, tail)) = rest.split_first() else {
            break;
        };
        let (len, tail) = match opcode {
            1..=0x4b => (usize::from(opcode), tail),
            OP_PUSHDATA1 => match tail {
                [n, tail @ ..] => (usize::from(*n), tail),
                _ => break,
            },
            OP_PUSHDATA2 => match tail {
                [a, b, tail @ ..] => (usize::from(u16::from_le_bytes([*a, *b])), tail),
                _ => break,
            },
            OP_PUSHDATA4 => match tail {
                [a, b, c, d, tail @ ..] => (u32::from_le_bytes([*a, *b, *c, *d]) as usize, tail),
                _ => break,
            },
            _ => break,
        };
        if tail.len() < len {
            break;
        }
        data.extend_from_slice(&tail[..len]);
        rest = &tail[len..];
    }

    data.truncate(max);
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: [u8; 20] = [0x11; 20];

    fn p2pkh() -> Vec<u8> {
        let mut s = vec![OP_DUP, OP_HASH160, 20];
        s.extend_from_slice(&HASH);
        s.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        s
    }

    fn p2sh() -> Vec<u8> {
        let mut s = vec![OP_HASH160, 20];
        s.extend_from_slice(&HASH);
        s.push(OP_EQUAL);
        s
    }

    #[test]
    fn test_classify_standard_scripts() {
        assert_eq!(ScriptType::classify(&p2pkh()), ScriptType::P2pkh);
        assert_eq!(ScriptType::classify(&p2sh()), ScriptType::P2sh);
        assert_eq!(ScriptType::classify(&[OP_RETURN, 2, 0x6d, 0x02]), ScriptType::Data);
        assert_eq!(ScriptType::classify(&[0x51]), ScriptType::Other);
        assert_eq!(ScriptType::classify(&[]), ScriptType::Other);

        let mut p2pk = vec![33];
        p2pk.extend_from_slice(&[0x02; 33]);
        p2pk.push(OP_CHECKSIG);
        assert_eq!(ScriptType::classify(&p2pk), ScriptType::P2pk);
    }

    #[test]
    fn test_hash160_extraction() {
        assert_eq!(hash160(&p2pkh()), Some(HASH));
        assert_eq!(hash160(&p2sh()), Some(HASH));
        assert_eq!(hash160(&[OP_RETURN]), None);
    }

    #[test]
    fn test_op_return_concatenates_pushes() {
        let script = [OP_RETURN, 2, 0xde, 0xad, OP_PUSHDATA1, 2, 0xbe, 0xef];
        assert_eq!(op_return_data(&script, 16), Some(vec![0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn test_op_return_truncates_to_max() {
        let mut script = vec![OP_RETURN, 40];
        script.extend(0u8..40);
        let data = op_return_data(&script, 16).unwrap();
        assert_eq!(data, (0u8..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_op_return_stops_at_non_push() {
        let script = [OP_RETURN, 1, 0xaa, OP_CHECKSIG, 1, 0xbb];
        assert_eq!(op_return_data(&script, 16), Some(vec![0xaa]));
    }

    #[test]
    fn test_op_return_truncated_push() {
        let script = [OP_RETURN, 1, 0xaa, 5, 0xbb];
        assert_eq!(op_return_data(&script, 16), Some(vec![0xaa]));
    }

    #[test]
    fn test_op_return_requires_op_return() {
        assert_eq!(op_return_data(&p2pkh(), 16), None);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ScriptType::P2pkh.to_string(), "P2PKH");
        assert_eq!(ScriptType::Data.to_string(), "DATA");
    }
}
