//! Read-only chain access boundaries
//!
//! Assembly never mutates chain state; everything it reads arrives
//! through these traits. `MemoryChain` and `MemoryCoinView` are
//! reference implementations used by the test suites and by embedders
//! that keep their index in memory.

use std::collections::HashMap;

use crate::constants::{LOCKTIME_THRESHOLD, SEQUENCE_FINAL};
use crate::error::{AssemblyError, Result};
use crate::serialization::block_hash;
use crate::types::{Amount, Block, BlockHeader, Coin, Hash, OutPoint, Transaction};

/// Index entry for one connected block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    pub hash: Hash,
    pub prev_hash: Hash,
    pub height: u32,
    pub time: u32,
    pub bits: u32,
    pub median_time_past: i64,
}

/// Snapshot-consistent view of the active chain
pub trait ChainView {
    /// Index entry of the chain tip; `None` only before genesis
    fn tip(&self) -> Option<BlockIndex>;

    /// Index entry of the active block at `height`
    fn at_height(&self, height: u32) -> Option<BlockIndex>;

    /// Index entry by block hash
    fn block_index(&self, hash: &Hash) -> Option<BlockIndex>;

    /// Full block body for an index entry
    fn read_block(&self, index: &BlockIndex) -> Result<Block>;

    /// Network-adjusted wall clock, seconds
    fn adjusted_time(&self) -> i64;
}

/// Snapshot-consistent view of the UTXO set
pub trait CoinView {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin>;

    /// Sum of the values of a transaction's confirmed inputs
    ///
    /// Inputs not found in the view contribute nothing; callers that
    /// need confirmed funding (the contract fee check) reject the
    /// transaction through the resulting shortfall.
    fn get_value_in(&self, tx: &Transaction) -> Amount {
        tx.inputs.iter().fold(0i64, |acc, input| {
            let value = self
                .get_coin(&input.prevout)
                .map(|coin| coin.out.value)
                .unwrap_or(0);
            acc.saturating_add(value)
        })
    }
}

/// Wallet surface consumed by the kernel search
pub trait StakingWallet {
    fn get_balance(&self) -> Amount;

    /// Outpoints with suitable depth for staking, up to `target` total
    /// value; `None` when selection fails entirely
    fn select_coins_for_staking(&self, target: Amount) -> Option<(Vec<OutPoint>, Amount)>;
}

/// Validation predicates consumed at the end of assembly
///
/// Default implementations carry the standard finality rule and accept
/// everything else; a node embeds its full validator here.
pub trait BlockValidator {
    /// Whether `tx` is final for a block at `height` with the given
    /// lock-time cutoff
    fn contextual_check_transaction(&self, tx: &Transaction, height: u32, lock_time_cutoff: i64) -> bool {
        is_final_tx(tx, height, lock_time_cutoff)
    }

    /// Full contextual block check; an error here aborts assembly
    /// because it indicates the assembler itself built a bad block
    fn test_block_validity(&self, _block: &Block, _prev: &BlockIndex) -> Result<()> {
        Ok(())
    }

    /// Append the witness commitment output to the coinbase and return
    /// the commitment bytes
    fn generate_coinbase_commitment(&self, _block: &mut Block, _prev: &BlockIndex) -> Vec<u8> {
        Vec::new()
    }

    /// Difficulty for the next block
    fn get_next_work_required(&self, prev: &BlockIndex, _header: &BlockHeader) -> u32 {
        prev.bits
    }
}

/// Validator with all default predicates
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl BlockValidator for DefaultValidator {}

/// Standard transaction finality rule
pub fn is_final_tx(tx: &Transaction, height: u32, block_time: i64) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let cutoff = if tx.lock_time < LOCKTIME_THRESHOLD {
        height as i64
    } else {
        block_time
    };
    if (tx.lock_time as i64) < cutoff {
        return true;
    }
    tx.inputs.iter().all(|input| input.sequence == SEQUENCE_FINAL)
}

/// In-memory chain index
#[derive(Debug, Default)]
pub struct MemoryChain {
    by_hash: HashMap<Hash, (BlockIndex, Block)>,
    by_height: Vec<Hash>,
    time: i64,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a block on top of the current tip
    pub fn push_block(&mut self, mut block: Block) -> BlockIndex {
        let height = self.by_height.len() as u32;
        if let Some(tip) = self.tip() {
            block.header.prev_block_hash = tip.hash;
        }
        let hash = block_hash(&block.header);
        let index = BlockIndex {
            hash,
            prev_hash: block.header.prev_block_hash,
            height,
            time: block.header.time,
            bits: block.header.bits,
            median_time_past: block.header.time as i64,
        };
        self.by_height.push(hash);
        self.by_hash.insert(hash, (index.clone(), block));
        index
    }

    pub fn set_adjusted_time(&mut self, time: i64) {
        self.time = time;
    }

    pub fn height(&self) -> Option<u32> {
        self.by_height.len().checked_sub(1).map(|h| h as u32)
    }
}

impl ChainView for MemoryChain {
    fn tip(&self) -> Option<BlockIndex> {
        let hash = self.by_height.last()?;
        self.by_hash.get(hash).map(|(index, _)| index.clone())
    }

    fn at_height(&self, height: u32) -> Option<BlockIndex> {
        let hash = self.by_height.get(height as usize)?;
        self.by_hash.get(hash).map(|(index, _)| index.clone())
    }

    fn block_index(&self, hash: &Hash) -> Option<BlockIndex> {
        self.by_hash.get(hash).map(|(index, _)| index.clone())
    }

    fn read_block(&self, index: &BlockIndex) -> Result<Block> {
        self.by_hash
            .get(&index.hash)
            .map(|(_, block)| block.clone())
            .ok_or(AssemblyError::BlockRead(index.height))
    }

    fn adjusted_time(&self) -> i64 {
        self.time
    }
}

/// In-memory UTXO view
#[derive(Debug, Default)]
pub struct MemoryCoinView {
    coins: HashMap<OutPoint, Coin>,
}

impl MemoryCoinView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_coin(&mut self, outpoint: OutPoint, coin: Coin) {
        self.coins.insert(outpoint, coin);
    }
}

impl CoinView for MemoryCoinView {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.get(outpoint).cloned()
    }
}
