//! bchsock-chain: Bitcoin Cash wire decoding
//!
//! Decodes raw blocks and transactions as delivered by a node's raw block/tx
//! feed, classifies output scripts, and encodes/decodes CashAddr addresses.

pub mod block;
pub mod cashaddr;
pub mod error;
mod reader;
pub mod script;
pub mod transaction;

pub use block::{Block, BlockHeader};
pub use cashaddr::{AddressKind, DecodedAddress};
pub use error::{AddressError, DecodeError};
pub use script::ScriptType;
pub use transaction::{Transaction, TxInput, TxOutput};

use sha2::{Digest, Sha256};

/// Double SHA-256, the hash used for txids and block hashes.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Hex-encode a hash in the byte-reversed order used for display.
pub fn display_hex(hash: &[u8; 32]) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}
