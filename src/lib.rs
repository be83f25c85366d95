//! # blockforge
//!
//! Block assembly and proof-of-stake kernel search for a UTXO chain
//! with an embedded contract layer.
//!
//! Given the current chain tip, a pool of pending transactions and
//! (for staking) a wallet of spendable coins, [`BlockAssembler`]
//! produces candidate block templates:
//!
//! - proof-of-work templates filled with fee-maximising packages from
//!   the pool plus a coinbase, and
//! - proof-of-stake templates carrying an additional coinstake whose
//!   input satisfies the stake hash-target predicate.
//!
//! Contract-carrying transactions are dry-run against a snapshot of
//! the persistent contract state and committed only when every check
//! passes; the store's root on exit always equals its root on entry,
//! with the new root carried solely in the coinbase. Two hard-coded
//! fork heights replace pool selection with deterministic
//! reconstruction of burning and refund transactions.
//!
//! ## Architecture
//!
//! The crate is a library consumed by a node: chain storage, the
//! mempool's own bookkeeping, script verification, the wallet and the
//! contract VM all stay behind the traits in [`chain`] and
//! [`contract`]. Everything inside runs on the caller's thread against
//! snapshot-consistent views.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blockforge::assembler::{AssemblerOptions, BlockAssembler};
//! use blockforge::chain::{DefaultValidator, MemoryChain, MemoryCoinView};
//! use blockforge::mempool::Mempool;
//! use blockforge::params::ConsensusParams;
//!
//! let params = ConsensusParams::default();
//! let chain = MemoryChain::new();
//! let coins = MemoryCoinView::new();
//! let mempool = Mempool::new();
//! let validator = DefaultValidator;
//!
//! let mut assembler = BlockAssembler::new(
//!     &params, &chain, &coins, &mempool, &validator,
//!     AssemblerOptions::default(),
//! );
//! let template = assembler
//!     .create_new_block(&[0x51], true, None, 0)
//!     .unwrap();
//! ```

pub mod address;
pub mod arith;
pub mod assembler;
pub mod chain;
pub mod constants;
pub mod contract;
pub mod error;
pub mod fork;
pub mod mempool;
pub mod params;
pub mod resources;
pub mod script;
pub mod serialization;
pub mod stake;
pub mod types;

pub use assembler::{AssemblerOptions, AssemblyStats, BlockAssembler, BlockTemplate};
pub use error::{AssemblyError, Result};
pub use params::ConsensusParams;
pub use types::{Amount, Block, BlockHeader, Coin, OutPoint, Transaction, TxIn, TxOut, Txid};
