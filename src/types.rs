//! Core chain types consumed by block assembly
//!
//! Transactions carry the classification predicates the assembler keys
//! off: coinbase, coinstake, contract ops, witness presence.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::script;

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Monetary amount in satoshis
pub type Amount = i64;

/// Witness stack for one input
pub type Witness = Vec<Vec<u8>>;

/// Transaction id: newtype wrapper for type safety
///
/// Prevents mixing up transaction ids with block hashes or other raw
/// 256-bit values. `#[repr(transparent)]` keeps the memory layout of the
/// inner hash.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Txid(pub Hash);

impl Txid {
    #[inline]
    pub fn as_hash(&self) -> &Hash {
        &self.0
    }
}

impl From<Hash> for Txid {
    #[inline]
    fn from(hash: Hash) -> Self {
        Txid(hash)
    }
}

/// OutPoint: identity of one transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Txid,
    pub n: u32,
}

impl OutPoint {
    pub fn new(hash: Txid, n: u32) -> Self {
        OutPoint { hash, n }
    }

    /// The null outpoint used by coinbase inputs
    pub fn null() -> Self {
        OutPoint {
            hash: Txid([0u8; 32]),
            n: u32::MAX,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.hash.0 == [0u8; 32] && self.n == u32::MAX
    }
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    /// Input spending `prevout` with an empty scriptSig and final sequence
    pub fn from_outpoint(prevout: OutPoint) -> Self {
        TxIn {
            prevout,
            script_sig: Vec::new(),
            sequence: crate::constants::SEQUENCE_FINAL,
        }
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    pub fn new(value: Amount, script_pubkey: Vec<u8>) -> Self {
        TxOut {
            value,
            script_pubkey,
        }
    }

    /// The empty output used as the coinstake marker at vout[0]
    pub fn empty() -> Self {
        TxOut {
            value: 0,
            script_pubkey: Vec::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }
}

/// Transaction
///
/// Uses SmallVec for inputs/outputs: the common case of 1-2 entries
/// avoids heap allocation. `witness` is parallel to `inputs`; an empty
/// vector means no witness data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: SmallVec<[TxIn; 2]>,
    pub outputs: SmallVec<[TxOut; 2]>,
    pub lock_time: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub witness: Vec<Witness>,
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction {
            version: 2,
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
            lock_time: 0,
            witness: Vec::new(),
        }
    }
}

impl Transaction {
    /// A transaction is coinbase iff its single input spends the null
    /// outpoint
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// A transaction is coinstake iff it spends a real outpoint and its
    /// first output is the empty marker
    pub fn is_coinstake(&self) -> bool {
        !self.inputs.is_empty()
            && !self.inputs[0].prevout.is_null()
            && self.outputs.len() >= 2
            && self.outputs[0].is_empty()
    }

    /// Whether any output script carries OP_CREATE or OP_CALL
    pub fn has_contract_op(&self) -> bool {
        self.outputs.iter().any(|out| {
            script::script_contains_op(&out.script_pubkey, script::OP_CREATE)
                || script::script_contains_op(&out.script_pubkey, script::OP_CALL)
        })
    }

    /// Whether any input script carries OP_SPEND
    pub fn has_op_spend(&self) -> bool {
        self.inputs
            .iter()
            .any(|input| script::script_contains_op(&input.script_sig, script::OP_SPEND))
    }

    pub fn has_witness(&self) -> bool {
        self.witness.iter().any(|w| !w.is_empty())
    }

    /// Sum of output values; saturates rather than wrapping so callers
    /// comparing against fees see a huge value instead of a small one
    pub fn get_value_out(&self) -> Amount {
        self.outputs
            .iter()
            .fold(0i64, |acc, out| acc.saturating_add(out.value))
    }
}

/// An unspent output record from the chain's UTXO set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub out: TxOut,
    pub height: u32,
    pub is_coinbase: bool,
}

/// Block header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl Default for BlockHeader {
    fn default() -> Self {
        BlockHeader {
            version: 0,
            prev_block_hash: [0u8; 32],
            merkle_root: [0u8; 32],
            time: 0,
            bits: 0,
            nonce: 0,
        }
    }
}

/// Block: header plus ordered transactions (coinbase at index 0, and
/// for proof-of-stake blocks the coinstake at index 1)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn is_proof_of_stake(&self) -> bool {
        self.transactions.len() > 1 && self.transactions[1].is_coinstake()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{OP_CALL, OP_CREATE, OP_SPEND};

    fn coinbase_tx() -> Transaction {
        Transaction {
            inputs: vec![TxIn {
                prevout: OutPoint::null(),
                script_sig: vec![0x51, 0x00],
                sequence: crate::constants::SEQUENCE_FINAL,
            }]
            .into(),
            outputs: vec![TxOut::new(5_000_000_000, vec![0x51])].into(),
            ..Default::default()
        }
    }

    fn coinstake_tx() -> Transaction {
        Transaction {
            inputs: vec![TxIn::from_outpoint(OutPoint::new(Txid([7u8; 32]), 1))].into(),
            outputs: vec![TxOut::empty(), TxOut::new(1000, vec![0x51])].into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_coinbase_classification() {
        assert!(coinbase_tx().is_coinbase());
        assert!(!coinbase_tx().is_coinstake());
        assert!(!coinstake_tx().is_coinbase());
    }

    #[test]
    fn test_coinstake_classification() {
        assert!(coinstake_tx().is_coinstake());

        // A non-empty first output disqualifies a coinstake
        let mut tx = coinstake_tx();
        tx.outputs[0].value = 1;
        assert!(!tx.is_coinstake());
    }

    #[test]
    fn test_contract_op_detection() {
        let mut tx = coinstake_tx();
        assert!(!tx.has_contract_op());

        tx.outputs[1].script_pubkey = vec![0x01, 0xaa, OP_CREATE];
        assert!(tx.has_contract_op());

        tx.outputs[1].script_pubkey = vec![OP_CALL];
        assert!(tx.has_contract_op());
    }

    #[test]
    fn test_contract_op_not_matched_inside_pushdata() {
        // OP_CREATE byte hidden inside push data must not classify the tx
        let mut tx = coinstake_tx();
        tx.outputs[1].script_pubkey = vec![0x02, OP_CREATE, OP_CREATE];
        assert!(!tx.has_contract_op());
    }

    #[test]
    fn test_op_spend_detection() {
        let mut tx = coinstake_tx();
        assert!(!tx.has_op_spend());
        tx.inputs[0].script_sig = vec![OP_SPEND];
        assert!(tx.has_op_spend());
    }

    #[test]
    fn test_witness_detection() {
        let mut tx = coinstake_tx();
        assert!(!tx.has_witness());
        tx.witness = vec![vec![]];
        assert!(!tx.has_witness());
        tx.witness = vec![vec![vec![0x01]]];
        assert!(tx.has_witness());
    }

    #[test]
    fn test_proof_of_stake_block() {
        let mut block = Block::default();
        assert!(!block.is_proof_of_stake());

        block.transactions = vec![coinbase_tx(), coinstake_tx()];
        assert!(block.is_proof_of_stake());

        block.transactions = vec![coinbase_tx()];
        assert!(!block.is_proof_of_stake());
    }

    #[test]
    fn test_value_out() {
        let tx = coinstake_tx();
        assert_eq!(tx.get_value_out(), 1000);
    }
}
