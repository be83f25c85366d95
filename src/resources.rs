//! Block resource accounting
//!
//! Tracks the running totals one assembly accumulates and answers
//! whether a candidate package still fits. Budgets are strict: a
//! package that would land exactly on a cap is rejected.

use serde::{Deserialize, Serialize};

use crate::constants::{
    COINBASE_RESERVED_SIGOPS, COINBASE_RESERVED_SIZE, COINBASE_RESERVED_WEIGHT,
    WITNESS_SCALE_FACTOR,
};
use crate::types::Amount;

/// Fee rate in satoshis per kilobyte
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeeRate {
    satoshis_per_k: Amount,
}

impl FeeRate {
    pub fn new(satoshis_per_k: Amount) -> Self {
        FeeRate { satoshis_per_k }
    }

    /// Fee owed by `size` bytes at this rate; never rounds a positive
    /// rate down to zero
    pub fn get_fee(&self, size: u64) -> Amount {
        let mut fee = self.satoshis_per_k.saturating_mul(size as i64) / 1000;
        if fee == 0 && size != 0 {
            if self.satoshis_per_k > 0 {
                fee = 1;
            }
            if self.satoshis_per_k < 0 {
                fee = -1;
            }
        }
        fee
    }
}

/// Running totals for one block under assembly
///
/// `reset_block` pre-charges the coinbase reservation so selection
/// never has to reason about the coinbase explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockResources {
    pub block_size: u64,
    pub block_weight: u64,
    pub block_sigops: i64,
    pub block_tx: u64,
    pub fees: Amount,
}

impl BlockResources {
    pub fn reset_block(&mut self) {
        self.block_size = COINBASE_RESERVED_SIZE;
        self.block_weight = COINBASE_RESERVED_WEIGHT;
        self.block_sigops = COINBASE_RESERVED_SIGOPS;
        self.block_tx = 0;
        self.fees = 0;
    }

    /// Whether a package of `size` bytes and `sigops` cost still fits
    /// under the weight and sigop budgets
    pub fn test_package(
        &self,
        package_size: u64,
        package_sigops: i64,
        block_max_weight: u64,
        max_block_sigops: i64,
    ) -> bool {
        if self.block_weight + WITNESS_SCALE_FACTOR * package_size >= block_max_weight {
            return false;
        }
        if self.block_sigops + package_sigops >= max_block_sigops {
            return false;
        }
        true
    }

    /// Charge one accepted transaction to the totals
    pub fn add_tx(&mut self, size: u64, weight: u64, sigops: i64, fee: Amount) {
        self.block_size += size;
        self.block_weight += weight;
        self.block_sigops += sigops;
        self.block_tx += 1;
        self.fees += fee;
    }
}
