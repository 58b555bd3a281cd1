//! CashAddr address format.
//!
//! An address is `prefix:payload` where the payload is base32 over a version
//! byte, the 20-byte hash160, and a 40-bit BCH checksum that also covers the
//! prefix.

use std::fmt;

use crate::error::AddressError;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const CHECKSUM_LEN: usize = 8;
const HASH_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    P2pkh,
    P2sh,
}

impl AddressKind {
    fn type_bits(self) -> u8 {
        match self {
            AddressKind::P2pkh => 0,
            AddressKind::P2sh => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAddress {
    pub prefix: String,
    pub kind: AddressKind,
    pub hash160: [u8; HASH_LEN],
}

impl DecodedAddress {
    pub fn new(prefix: &str, kind: AddressKind, hash160: [u8; HASH_LEN]) -> Self {
        Self {
            prefix: prefix.to_ascii_lowercase(),
            kind,
            hash160,
        }
    }

    /// True when both addresses pay the same destination, whatever the network prefix.
    pub fn same_destination(&self, other: &DecodedAddress) -> bool {
        self.kind == other.kind && self.hash160 == other.hash160
    }
}

impl fmt::Display for DecodedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

pub fn encode(address: &DecodedAddress) -> String {
    let mut raw = Vec::with_capacity(HASH_LEN + 1);
    raw.push(address.kind.type_bits() << 3);
    raw.extend_from_slice(&address.hash160);

    let mut values = convert_bits(&raw, 8, 5, true).unwrap_or_default();
    let checksum = polymod(&checksum_input(&address.prefix, &values, true));
    for i in 0..CHECKSUM_LEN {
        values.push(((checksum >> (5 * (7 - i))) & 0x1f) as u8);
    }

    let mut out = String::with_capacity(address.prefix.len() + 1 + values.len());
    out.push_str(&address.prefix);
    out.push(':');
    out.extend(values.iter().map(|&v| CHARSET[usize::from(v)] as char));
    out
}

/// Decode `prefix:payload`, or a bare payload under `default_prefix`.
pub fn decode(text: &str, default_prefix: &str) -> Result<DecodedAddress, AddressError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AddressError::Empty);
    }
    let has_lower = text.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = text.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(AddressError::MixedCase);
    }
    let text = text.to_ascii_lowercase();

    let (prefix, payload) = match text.split_once(':') {
        Some((prefix, payload)) => (prefix.to_string(), payload),
        None => (default_prefix.to_ascii_lowercase(), text.as_str()),
    };
    if prefix.is_empty() || payload.is_empty() {
        return Err(AddressError::Empty);
    }

    let values = payload
        .chars()
        .map(|c| {
            CHARSET
                .iter()
                .position(|&b| b as char == c)
                .map(|p| p as u8)
                .ok_or(AddressError::InvalidCharacter(c))
        })
        .collect::<Result<Vec<u8>, _>>()?;
    if values.len() <= CHECKSUM_LEN {
        return Err(AddressError::InvalidLength(values.len()));
    }
    if polymod(&checksum_input(&prefix, &values, false)) != 0 {
        return Err(AddressError::Checksum);
    }

    let data = &values[..values.len() - CHECKSUM_LEN];
    let raw = convert_bits(data, 5, 8, false).ok_or(AddressError::InvalidPadding)?;
    let (&version, hash) = raw
        .split_first()
        .ok_or(AddressError::InvalidLength(0))?;

    // Low three bits encode the hash size; only 160-bit hashes are supported.
    if version & 0x07 != 0 {
        return Err(AddressError::UnsupportedVersion(version));
    }
    let kind = match version >> 3 {
        0 => AddressKind::P2pkh,
        1 => AddressKind::P2sh,
        _ => return Err(AddressError::UnsupportedVersion(version)),
    };
    let hash160: [u8; HASH_LEN] = hash
        .try_into()
        .map_err(|_| AddressError::InvalidLength(hash.len()))?;

    Ok(DecodedAddress {
        prefix,
        kind,
        hash160,
    })
}

fn checksum_input(prefix: &str, values: &[u8], with_template: bool) -> Vec<u8> {
    let mut input: Vec<u8> = prefix.bytes().map(|b| b & 0x1f).collect();
    input.push(0);
    input.extend_from_slice(values);
    if with_template {
        input.extend_from_slice(&[0; CHECKSUM_LEN]);
    }
    input
}

fn polymod(values: &[u8]) -> u64 {
    const GENERATORS: [u64; 5] = [
        0x98f2bc8e61,
        0x79b76d99e2,
        0xf33e5fb3c4,
        0xae2eabe2a8,
        0x1e4f43e470,
    ];

    let mut c: u64 = 1;
    for &d in values {
        let c0 = c >> 35;
        c = ((c & 0x07_ffff_ffff) << 5) ^ u64::from(d);
        for (i, g) in GENERATORS.iter().enumerate() {
            if (c0 >> i) & 1 == 1 {
                c ^= g;
            }
        }
    }
    c ^ 1
}

fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max = (1u32 << to) - 1;
    let max_acc = (1u32 << (from + to - 1)) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);

    for &value in data {
        let value = u32::from(value);
        if value >> from != 0 {
            return None;
        }
        acc = ((acc << from) | value) & max_acc;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max) as u8);
        }
    }

    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max) as u8);
        }
    } else if bits >= from || (acc << (to - bits)) & max != 0 {
        return None;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "76a04053bda0a88bda5177b86a15c3b29f559873";
    const P2PKH: &str = "bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a";
    const P2SH: &str = "bitcoincash:ppm2qsznhks23z7629mms6s4cwef74vcwvn0h829pq";

    fn hash() -> [u8; 20] {
        hex::decode(HASH).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_encode_known_vectors() {
        let p2pkh = DecodedAddress::new("bitcoincash", AddressKind::P2pkh, hash());
        let p2sh = DecodedAddress::new("bitcoincash", AddressKind::P2sh, hash());
        let testnet = DecodedAddress::new("bchtest", AddressKind::P2pkh, hash());

        assert_eq!(encode(&p2pkh), P2PKH);
        assert_eq!(encode(&p2sh), P2SH);
        assert_eq!(
            testnet.to_string(),
            "bchtest:qpm2qsznhks23z7629mms6s4cwef74vcwvqcw003ap"
        );
    }

    #[test]
    fn test_decode_with_prefix() {
        let address = decode(P2PKH, "bitcoincash").unwrap();
        assert_eq!(address.kind, AddressKind::P2pkh);
        assert_eq!(address.hash160, hash());

        let address = decode(P2SH, "bitcoincash").unwrap();
        assert_eq!(address.kind, AddressKind::P2sh);
    }

    #[test]
    fn test_decode_bare_payload_uses_default_prefix() {
        let bare = P2PKH.split_once(':').unwrap().1;
        let address = decode(bare, "bitcoincash").unwrap();
        assert_eq!(address.prefix, "bitcoincash");
        assert_eq!(address.hash160, hash());

        assert_eq!(decode(bare, "bchtest"), Err(AddressError::Checksum));
    }

    #[test]
    fn test_decode_upper_case() {
        let address = decode(&P2PKH.to_ascii_uppercase(), "bitcoincash").unwrap();
        assert_eq!(address.prefix, "bitcoincash");
        assert_eq!(address.kind, AddressKind::P2pkh);
    }

    #[test]
    fn test_decode_rejects_mixed_case() {
        let mixed = P2PKH.replacen('q', "Q", 1);
        assert_eq!(decode(&mixed, "bitcoincash"), Err(AddressError::MixedCase));
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let mut corrupted = P2PKH.to_string();
        corrupted.pop();
        corrupted.push('q');
        assert_eq!(decode(&corrupted, "bitcoincash"), Err(AddressError::Checksum));
    }

    #[test]
    fn test_decode_rejects_invalid_character() {
        assert_eq!(
            decode("bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdxb1", "bitcoincash"),
            Err(AddressError::InvalidCharacter('b'))
        );
        assert_eq!(decode("", "bitcoincash"), Err(AddressError::Empty));
    }

    #[test]
    fn test_same_destination_ignores_prefix() {
        let main = DecodedAddress::new("bitcoincash", AddressKind::P2pkh, hash());
        let test = DecodedAddress::new("bchtest", AddressKind::P2pkh, hash());
        let script = DecodedAddress::new("bitcoincash", AddressKind::P2sh, hash());

        assert!(main.same_destination(&test));
        assert!(!main.same_destination(&script));
    }
}
