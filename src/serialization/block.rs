//! Block header wire format and merkle root

use super::transaction::serialized_tx_size;
use super::varint::varint_size;
use crate::arith::double_sha256;
use crate::types::{Block, BlockHeader, Hash};

/// Serialize a block header (80 bytes)
pub fn serialize_block_header(header: &BlockHeader) -> Vec<u8> {
    let mut data = Vec::with_capacity(80);
    data.extend_from_slice(&header.version.to_le_bytes());
    data.extend_from_slice(&header.prev_block_hash);
    data.extend_from_slice(&header.merkle_root);
    data.extend_from_slice(&header.time.to_le_bytes());
    data.extend_from_slice(&header.bits.to_le_bytes());
    data.extend_from_slice(&header.nonce.to_le_bytes());
    data
}

/// Double SHA256 of the serialized header
pub fn block_hash(header: &BlockHeader) -> Hash {
    double_sha256(&serialize_block_header(header))
}

/// Merkle root over the block's transaction ids
///
/// Levels with an odd number of hashes duplicate the last entry, the
/// standard construction.
pub fn block_merkle_root(block: &Block) -> Hash {
    let mut hashes: Vec<Hash> = block.transactions.iter().map(|tx| tx.txid().0).collect();
    if hashes.is_empty() {
        return [0u8; 32];
    }

    while hashes.len() > 1 {
        if hashes.len() & 1 != 0 {
            hashes.push(hashes[hashes.len() - 1]);
        }
        let mut next_level = Vec::with_capacity(hashes.len() / 2);
        for pair in hashes.chunks(2) {
            let mut combined = [0u8; 64];
            combined[..32].copy_from_slice(&pair[0]);
            combined[32..].copy_from_slice(&pair[1]);
            next_level.push(double_sha256(&combined));
        }
        hashes = next_level;
    }

    hashes[0]
}

/// Serialized block size, witness included
pub fn serialized_block_size(block: &Block) -> u64 {
    let mut size = 80 + varint_size(block.transactions.len() as u64);
    for tx in &block.transactions {
        size += serialized_tx_size(tx);
    }
    size
}
