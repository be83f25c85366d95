//! Wire format serialization
//!
//! Consensus-critical encoding that must match the chain's wire format
//! exactly: transaction ids, serialized sizes, weights, and merkle
//! roots all derive from these bytes.
//!
//! All integers are little-endian.

pub mod block;
pub mod transaction;
pub mod varint;

pub use block::{block_hash, block_merkle_root, serialize_block_header, serialized_block_size};
pub use transaction::{serialize_transaction, serialized_tx_size, stripped_tx_size, tx_weight};
pub use varint::{decode_varint, encode_varint};
