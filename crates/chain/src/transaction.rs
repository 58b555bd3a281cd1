use crate::cashaddr::{self, AddressKind, DecodedAddress};
use crate::error::DecodeError;
use crate::reader::Reader;
use crate::script::{self, ScriptType};
use crate::{display_hex, sha256d};

/// Outpoint, empty script length and sequence.
const MIN_INPUT_SIZE: usize = 41;
/// Value and empty script length.
const MIN_OUTPUT_SIZE: usize = 9;
/// Version, two empty counts and lock time.
pub(crate) const MIN_TRANSACTION_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub prev_txid: [u8; 32],
    pub prev_index: u32,
    pub script: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Value in satoshis
    pub value: u64,
    pub script: Vec<u8>,
    pub script_type: ScriptType,
}

impl TxOutput {
    pub fn new(value: u64, script: Vec<u8>) -> Self {
        let script_type = ScriptType::classify(&script);
        Self {
            value,
            script,
            script_type,
        }
    }

    pub fn hash160(&self) -> Option<[u8; 20]> {
        script::hash160(&self.script)
    }

    /// Decoded destination for pay-to-address outputs.
    pub fn decoded_address(&self, prefix: &str) -> Option<DecodedAddress> {
        let kind = match self.script_type {
            ScriptType::P2pkh => AddressKind::P2pkh,
            ScriptType::P2sh => AddressKind::P2sh,
            _ => return None,
        };
        Some(DecodedAddress::new(prefix, kind, self.hash160()?))
    }

    /// CashAddr text for pay-to-address outputs.
    pub fn address(&self, prefix: &str) -> Option<String> {
        self.decoded_address(prefix).map(|a| cashaddr::encode(&a))
    }

    pub fn op_return_data(&self, max: usize) -> Option<Vec<u8>> {
        match self.script_type {
            ScriptType::Data => script::op_return_data(&self.script, max),
            _ => None,
        }
    }

    pub fn script_hex(&self) -> String {
        hex::encode(&self.script)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub txid: [u8; 32],
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// Decode a standalone raw transaction; trailing bytes are rejected.
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(raw);
        let tx = Self::read(&mut reader, raw)?;
        match reader.remaining() {
            0 => Ok(tx),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }

    /// Decode one transaction starting at the reader's position.
    pub(crate) fn read(reader: &mut Reader<'_>, raw: &[u8]) -> Result<Self, DecodeError> {
        let start = reader.position();
        let version = reader.u32_le()?;

        let input_count = reader.count(MIN_INPUT_SIZE)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(TxInput {
                prev_txid: reader.array()?,
                prev_index: reader.u32_le()?,
                script: reader.var_bytes()?.to_vec(),
                sequence: reader.u32_le()?,
            });
        }

        let output_count = reader.count(MIN_OUTPUT_SIZE)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            let value = reader.u64_le()?;
            let script = reader.var_bytes()?.to_vec();
            outputs.push(TxOutput::new(value, script));
        }

        let lock_time = reader.u32_le()?;
        let txid = sha256d(&raw[start..reader.position()]);

        Ok(Self {
            txid,
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn txid_hex(&self) -> String {
        display_hex(&self.txid)
    }
}
