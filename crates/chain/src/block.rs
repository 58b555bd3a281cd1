use crate::error::DecodeError;
use crate::reader::Reader;
use crate::transaction::{Transaction, MIN_TRANSACTION_SIZE};
use crate::{display_hex, sha256d};

const HEADER_SIZE: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub hash: [u8; 32],
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(raw);
        let header_bytes = reader.take(HEADER_SIZE)?;
        let hash = sha256d(header_bytes);

        let mut header_reader = Reader::new(header_bytes);
        let header = BlockHeader {
            version: header_reader.u32_le()?,
            prev_block_hash: header_reader.array()?,
            merkle_root: header_reader.array()?,
            time: header_reader.u32_le()?,
            bits: header_reader.u32_le()?,
            nonce: header_reader.u32_le()?,
        };

        let tx_count = reader.count(MIN_TRANSACTION_SIZE)?;
        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            transactions.push(Transaction::read(&mut reader, raw)?);
        }

        Ok(Self {
            hash,
            header,
            transactions,
        })
    }

    pub fn hash_hex(&self) -> String {
        display_hex(&self.hash)
    }

    pub fn prev_block_hash_hex(&self) -> String {
        display_hex(&self.header.prev_block_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::tests::GENESIS_COINBASE;

    const GENESIS_HEADER: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";

    fn genesis_block() -> Vec<u8> {
        let mut raw = hex::decode(GENESIS_HEADER).unwrap();
        raw.push(1);
        raw.extend(hex::decode(GENESIS_COINBASE).unwrap());
        raw
    }

    #[test]
    fn test_decode_genesis_block() {
        let block = Block::decode(&genesis_block()).unwrap();

        assert_eq!(
            block.hash_hex(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
        assert_eq!(block.prev_block_hash_hex(), "0".repeat(64));
        assert_eq!(block.header.nonce, 2_083_236_893);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(
            block.transactions[0].txid_hex(),
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
    }

    #[test]
    fn test_short_header_rejected() {
        let raw = hex::decode(GENESIS_HEADER).unwrap();
        assert!(Block::decode(&raw[..79]).is_err());
    }

    #[test]
    fn test_transaction_count_larger_than_payload_rejected() {
        let mut raw = hex::decode(GENESIS_HEADER).unwrap();
        raw.extend([0xfe, 0xff, 0xff, 0xff, 0x00]);
        raw.extend(hex::decode(GENESIS_COINBASE).unwrap());
        assert_eq!(
            Block::decode(&raw),
            Err(DecodeError::LengthOverflow(0x00ff_ffff))
        );
    }

    #[test]
    fn test_missing_transactions_rejected() {
        let mut raw = hex::decode(GENESIS_HEADER).unwrap();
        raw.push(2);
        raw.extend(hex::decode(GENESIS_COINBASE).unwrap());
        assert!(Block::decode(&raw).is_err());
    }
}
