//! JSON messages exchanged with clients.

use bchsock_chain::{Block, Transaction, TxOutput};
use serde::Serialize;

/// `{"op":"new_block", ...}` broadcast.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlock {
    op: &'static str,
    block_hash: String,
    prev_block_hash: String,
    transactions: usize,
}

impl NewBlock {
    pub fn new(block: &Block) -> Self {
        Self {
            op: "new_block",
            block_hash: block.hash_hex(),
            prev_block_hash: block.prev_block_hash_hex(),
            transactions: block.transactions.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OutputInfo {
    #[serde(rename = "type")]
    script_type: &'static str,
    address: String,
    /// Satoshis, as a string
    value: String,
    script: String,
}

impl OutputInfo {
    fn new(output: &TxOutput, address_prefix: &str) -> Self {
        Self {
            script_type: output.script_type.as_str(),
            address: output.address(address_prefix).unwrap_or_default(),
            value: output.value.to_string(),
            script: output.script_hex(),
        }
    }
}

/// `{"op":"new_tx", ...}` broadcast. Carries every output, not only the
/// ones that matched.
#[derive(Debug, Serialize)]
pub struct NewTx {
    op: &'static str,
    txid: String,
    inputs: usize,
    outputs: Vec<OutputInfo>,
}

impl NewTx {
    pub fn new(tx: &Transaction, address_prefix: &str) -> Self {
        Self {
            op: "new_tx",
            txid: tx.txid_hex(),
            inputs: tx.inputs.len(),
            outputs: tx
                .outputs
                .iter()
                .map(|output| OutputInfo::new(output, address_prefix))
                .collect(),
        }
    }
}

/// Acknowledgement of a control message.
#[derive(Debug, Serialize)]
pub struct Reply<'a> {
    op: &'a str,
    result: &'static str,
}

impl<'a> Reply<'a> {
    pub fn ok(op: &'a str) -> Self {
        Self { op, result: "ok" }
    }

    pub fn failed(op: &'a str) -> Self {
        Self {
            op,
            result: "failed",
        }
    }

    pub fn from_outcome(op: &'a str, succeeded: bool) -> Self {
        if succeeded {
            Self::ok(op)
        } else {
            Self::failed(op)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorReply<'a> {
    op: &'static str,
    error: &'a str,
}

impl<'a> ErrorReply<'a> {
    pub fn new(error: &'a str) -> Self {
        Self { op: "error", error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_shapes() {
        assert_eq!(
            serde_json::to_value(Reply::ok("block")).unwrap(),
            json!({"op": "block", "result": "ok"})
        );
        assert_eq!(
            serde_json::to_value(Reply::from_outcome("rm_block", false)).unwrap(),
            json!({"op": "rm_block", "result": "failed"})
        );
        assert_eq!(
            serde_json::to_value(ErrorReply::new("bad")).unwrap(),
            json!({"op": "error", "error": "bad"})
        );
    }

    #[test]
    fn test_new_tx_shape() {
        let mut p2pkh = vec![0x76, 0xa9, 20];
        p2pkh.extend_from_slice(&hex::decode("76a04053bda0a88bda5177b86a15c3b29f559873").unwrap());
        p2pkh.extend_from_slice(&[0x88, 0xac]);

        let tx = Transaction {
            txid: [0u8; 32],
            version: 1,
            inputs: Vec::new(),
            outputs: vec![
                TxOutput::new(1500, p2pkh),
                TxOutput::new(0, vec![0x6a, 0x02, 0xde, 0xad]),
            ],
            lock_time: 0,
        };

        let value = serde_json::to_value(NewTx::new(&tx, "bitcoincash")).unwrap();
        assert_eq!(value["op"], "new_tx");
        assert_eq!(value["txid"], "0".repeat(64));
        assert_eq!(value["inputs"], 0);
        assert_eq!(
            value["outputs"][0],
            json!({
                "type": "P2PKH",
                "address": "bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a",
                "value": "1500",
                "script": "76a91476a04053bda0a88bda5177b86a15c3b29f55987388ac",
            })
        );
        assert_eq!(
            value["outputs"][1],
            json!({"type": "DATA", "address": "", "value": "0", "script": "6a02dead"})
        );
    }
}
