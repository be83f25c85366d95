//! Transaction wire format
//!
//! Format (base):
//! - Version (4 bytes)
//! - Input count (varint), inputs (prevout, scriptSig, sequence)
//! - Output count (varint), outputs (value, scriptPubKey)
//! - Lock time (4 bytes)
//!
//! With witness data the extended format inserts the 0x00 marker and
//! 0x01 flag after the version and appends one witness stack per input
//! before the lock time. Transaction ids always hash the base format.

use bitcoin_hashes::{sha256d, Hash as _, HashEngine};

use super::varint::{encode_varint, varint_size};
use crate::types::{Transaction, Txid};

/// Serialize a transaction to wire bytes
pub fn serialize_transaction(tx: &Transaction, include_witness: bool) -> Vec<u8> {
    let with_witness = include_witness && tx.has_witness();
    let mut data = Vec::with_capacity(stripped_tx_size(tx) as usize + 8);

    data.extend_from_slice(&tx.version.to_le_bytes());

    if with_witness {
        data.push(0x00);
        data.push(0x01);
    }

    data.extend_from_slice(&encode_varint(tx.inputs.len() as u64));
    for input in &tx.inputs {
        data.extend_from_slice(&input.prevout.hash.0);
        data.extend_from_slice(&input.prevout.n.to_le_bytes());
        data.extend_from_slice(&encode_varint(input.script_sig.len() as u64));
        data.extend_from_slice(&input.script_sig);
        data.extend_from_slice(&input.sequence.to_le_bytes());
    }

    data.extend_from_slice(&encode_varint(tx.outputs.len() as u64));
    for output in &tx.outputs {
        data.extend_from_slice(&(output.value as u64).to_le_bytes());
        data.extend_from_slice(&encode_varint(output.script_pubkey.len() as u64));
        data.extend_from_slice(&output.script_pubkey);
    }

    if with_witness {
        for i in 0..tx.inputs.len() {
            let empty = Vec::new();
            let stack = tx.witness.get(i).unwrap_or(&empty);
            data.extend_from_slice(&encode_varint(stack.len() as u64));
            for element in stack {
                data.extend_from_slice(&encode_varint(element.len() as u64));
                data.extend_from_slice(element);
            }
        }
    }

    data.extend_from_slice(&tx.lock_time.to_le_bytes());
    data
}

/// Serialized size without witness data
pub fn stripped_tx_size(tx: &Transaction) -> u64 {
    let mut size = 4 + 4; // version + lock time
    size += varint_size(tx.inputs.len() as u64);
    for input in &tx.inputs {
        size += 32 + 4 + varint_size(input.script_sig.len() as u64) + input.script_sig.len() as u64 + 4;
    }
    size += varint_size(tx.outputs.len() as u64);
    for output in &tx.outputs {
        size += 8 + varint_size(output.script_pubkey.len() as u64) + output.script_pubkey.len() as u64;
    }
    size
}

/// Serialized size including witness data
pub fn serialized_tx_size(tx: &Transaction) -> u64 {
    let mut size = stripped_tx_size(tx);
    if tx.has_witness() {
        size += 2; // marker + flag
        for i in 0..tx.inputs.len() {
            match tx.witness.get(i) {
                Some(stack) => {
                    size += varint_size(stack.len() as u64);
                    for element in stack {
                        size += varint_size(element.len() as u64) + element.len() as u64;
                    }
                }
                None => size += 1,
            }
        }
    }
    size
}

/// Transaction weight: stripped size counts WITNESS_SCALE_FACTOR times,
/// witness bytes once
pub fn tx_weight(tx: &Transaction) -> u64 {
    (crate::constants::WITNESS_SCALE_FACTOR - 1) * stripped_tx_size(tx) + serialized_tx_size(tx)
}

impl Transaction {
    /// Transaction id: double SHA256 of the base serialization
    pub fn txid(&self) -> Txid {
        let data = serialize_transaction(self, false);
        let mut engine = sha256d::Hash::engine();
        engine.input(&data);
        let digest = sha256d::Hash::from_engine(engine);
        Txid(digest.to_byte_array())
    }

    pub fn weight(&self) -> u64 {
        tx_weight(self)
    }

    pub fn serialized_size(&self) -> u64 {
        serialized_tx_size(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OutPoint, TxIn, TxOut, Txid};

    fn sample_tx() -> Transaction {
        Transaction {
            inputs: vec![TxIn {
                prevout: OutPoint::new(Txid([0xab; 32]), 3),
                script_sig: vec![0x51, 0x52],
                sequence: 0xffff_ffff,
            }]
            .into(),
            outputs: vec![TxOut::new(12345, vec![0x51])].into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_size_matches_serialization() {
        let tx = sample_tx();
        assert_eq!(
            stripped_tx_size(&tx),
            serialize_transaction(&tx, false).len() as u64
        );
        assert_eq!(serialized_tx_size(&tx), stripped_tx_size(&tx));
    }

    #[test]
    fn test_witness_size_matches_serialization() {
        let mut tx = sample_tx();
        tx.witness = vec![vec![vec![0x01, 0x02], vec![0x03]]];
        assert_eq!(
            serialized_tx_size(&tx),
            serialize_transaction(&tx, true).len() as u64
        );
        assert!(serialized_tx_size(&tx) > stripped_tx_size(&tx));
    }

    #[test]
    fn test_txid_excludes_witness() {
        let base = sample_tx();
        let mut with_witness = base.clone();
        with_witness.witness = vec![vec![vec![0xaa; 70]]];
        assert_eq!(base.txid(), with_witness.txid());
    }

    #[test]
    fn test_txid_changes_with_content() {
        let tx = sample_tx();
        let mut other = tx.clone();
        other.outputs[0].value += 1;
        assert_ne!(tx.txid(), other.txid());
    }

    #[test]
    fn test_weight_of_plain_tx_is_size_scaled() {
        let tx = sample_tx();
        assert_eq!(tx.weight(), 4 * stripped_tx_size(&tx));
    }

    #[test]
    fn test_weight_counts_witness_once() {
        let mut tx = sample_tx();
        tx.witness = vec![vec![vec![0x01; 10]]];
        let witness_bytes = serialized_tx_size(&tx) - stripped_tx_size(&tx);
        assert_eq!(tx.weight(), 4 * stripped_tx_size(&tx) + witness_bytes);
    }
}
