//! Consensus parameters and height-dependent policy
//!
//! Fork heights and activation points are injectable so tests and
//! alternative networks can shrink them; the defaults describe mainnet.

use serde::{Deserialize, Serialize};

use crate::chain::BlockIndex;
use crate::constants::{HALVING_INTERVAL, INITIAL_SUBSIDY, WITNESS_SCALE_FACTOR};
use crate::types::Amount;

/// Version bits signalled by all assembled blocks
pub const VERSIONBITS_TOP_BITS: i32 = 0x2000_0000;

/// Extra version bit marking a proof-of-stake block
pub const VERSIONBITS_POS_BIT: i32 = 0x0800_0000;

/// Which kind of block is being assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningType {
    Pow,
    Pos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Height activating the contract layer (and proof-of-stake)
    pub contract_height: u32,

    /// Height switching the stake hash to include the 10-aligned
    /// ancestor block hash
    pub fork_v3_height: u32,

    /// Height of the holy-burn reconstruction block
    pub fork_v4_height: u32,

    /// Height of the refund reconstruction block
    pub fork_v5_height: u32,

    /// First height scanned for bad outputs by the fork-V4 procedure
    pub scan_bad_tx_height: u32,

    /// First height scanned when seeding the outpoint value map for
    /// the fork-V4 procedure
    pub holy_seed_start_height: u32,

    /// Height activating segregated witness
    pub segwit_height: u32,

    /// Minimum depth before a UTXO may serve as a stake kernel
    pub stake_min_confirmations: u32,

    /// Testnet rule: difficulty may drop to minimum between blocks
    pub pow_allow_min_difficulty_blocks: bool,

    /// Regtest rule: blocks are mined on demand; enables the
    /// `-blockversion` override
    pub mine_blocks_on_demand: bool,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            contract_height: 498_777,
            fork_v3_height: 520_000,
            fork_v4_height: 780_000,
            fork_v5_height: 828_000,
            scan_bad_tx_height: 760_000,
            holy_seed_start_height: 750_000,
            segwit_height: 481_824,
            stake_min_confirmations: 500,
            pow_allow_min_difficulty_blocks: false,
            mine_blocks_on_demand: false,
        }
    }
}

impl ConsensusParams {
    /// Block subsidy at a height; halves every `HALVING_INTERVAL`
    /// blocks, zero after 64 halvings
    pub fn get_block_subsidy(&self, height: u32) -> Amount {
        let halvings = height / HALVING_INTERVAL;
        if halvings >= 64 {
            return 0;
        }
        INITIAL_SUBSIDY >> halvings
    }

    /// Maximum serialized block size at a height
    pub fn max_block_size(&self, height: u32) -> u64 {
        if height >= self.contract_height {
            8_000_000
        } else {
            1_000_000
        }
    }

    /// Maximum block sigop cost at a height
    ///
    /// One fiftieth of the size budget, in cost units (legacy sigops
    /// scale by the witness factor).
    pub fn max_block_sigops(&self, height: u32) -> i64 {
        (self.max_block_size(height) * WITNESS_SCALE_FACTOR / 50) as i64
    }

    /// Whether witness transactions may be included on top of `prev`
    pub fn is_witness_enabled(&self, prev: Option<&BlockIndex>) -> bool {
        let next_height = prev.map(|index| index.height + 1).unwrap_or(0);
        next_height >= self.segwit_height
    }

    /// Block version for a newly assembled block
    pub fn compute_block_version(&self, mining_type: MiningType) -> i32 {
        match mining_type {
            MiningType::Pow => VERSIONBITS_TOP_BITS,
            MiningType::Pos => VERSIONBITS_TOP_BITS | VERSIONBITS_POS_BIT,
        }
    }
}
