//! Block template assembly
//!
//! Transactions in the pool often depend on other pool transactions;
//! selection therefore ranks each transaction together with all of its
//! unconfirmed ancestors. Since nothing is removed from the pool while
//! a block is built, descendants of selected transactions get a
//! temporary shadow entry with their ancestor state recomputed as
//! "remaining ancestors only", and each round compares the best shadow
//! entry against the next pool entry.
//!
//! Contract-carrying transactions are dry-run against a snapshot of
//! the contract store and committed only when every check passes; the
//! store is restored to its pre-assembly root before the template is
//! returned, whatever happens in between.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chain::{BlockIndex, BlockValidator, ChainView, CoinView, StakingWallet};
use crate::constants::{
    BYTECODE_TIME_BUFFER, COINBASE_FLAGS, DEFAULT_BLOCK_GAS_LIMIT, DEFAULT_BLOCK_MAX_WEIGHT,
    DEFAULT_BLOCK_MIN_TX_FEE, MAX_BLOCK_SER_SIZE, WITNESS_SCALE_FACTOR,
};
use crate::contract::{ContractStateService, ContractVm, RollbackGuard, RootStateHash};
use crate::error::{AssemblyError, Result};
use crate::fork;
use crate::mempool::{Mempool, MempoolEntry, Score, ScoreKey};
use crate::params::{ConsensusParams, MiningType};
use crate::resources::{BlockResources, FeeRate};
use crate::script::{self, get_legacy_sigop_count, push_data, push_int, OP_ROOT_STATE_HASH};
use crate::serialization::block_merkle_root;
use crate::stake::{self, PosState};
use crate::types::{Amount, Block, OutPoint, Transaction, TxIn, TxOut, Txid};

/// Assembly options, the programmatic face of the `-blockmaxweight`,
/// `-blockmintxfee`, `-blockversion` and `-printpriority` settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblerOptions {
    #[serde(default = "default_block_max_weight")]
    pub block_max_weight: u64,

    #[serde(default = "default_block_min_fee_rate")]
    pub block_min_fee_rate: FeeRate,

    /// Only honoured when the network mines blocks on demand
    #[serde(default)]
    pub block_version: Option<i32>,

    /// Log fee and txid of every accepted transaction
    #[serde(default)]
    pub print_priority: bool,

    /// Balance kept out of staking
    #[serde(default)]
    pub reserve_balance: Amount,
}

fn default_block_max_weight() -> u64 {
    DEFAULT_BLOCK_MAX_WEIGHT
}

fn default_block_min_fee_rate() -> FeeRate {
    FeeRate::new(DEFAULT_BLOCK_MIN_TX_FEE)
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        AssemblerOptions {
            block_max_weight: default_block_max_weight(),
            block_min_fee_rate: default_block_min_fee_rate(),
            block_version: None,
            print_priority: false,
            reserve_balance: 0,
        }
    }
}

/// Diagnostics of one assembly call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    pub block_tx: u64,
    pub block_size: u64,
    pub block_weight: u64,
    pub fees: Amount,
    pub packages_selected: u32,
    pub descendants_updated: u32,
    pub pos: PosState,
}

/// A candidate block plus the per-transaction bookkeeping mining
/// software consumes
#[derive(Debug, Clone, Default)]
pub struct BlockTemplate {
    pub block: Block,
    pub tx_fees: Vec<Amount>,
    pub tx_sigop_costs: Vec<i64>,
    pub coinbase_commitment: Vec<u8>,
    /// Full scriptPubKey bytes of the root-state-hash output
    pub coinbase_root_state_hash: Vec<u8>,
    pub stats: AssemblyStats,
}

/// Contract layer handles for one assembly
pub struct ContractBackend<'a> {
    pub service: &'a mut dyn ContractStateService,
    pub vm: &'a mut dyn ContractVm,
}

/// Shadow of a mempool entry whose ancestor state excludes ancestors
/// already selected into the block
#[derive(Debug, Clone)]
struct ModifiedEntry {
    txid: Txid,
    size_with_ancestors: u64,
    mod_fees_with_ancestors: Amount,
    sigop_cost_with_ancestors: i64,
    count_with_ancestors: u64,
    is_contract: bool,
    min_gas_price: u64,
}

impl ModifiedEntry {
    fn from_entry(entry: &MempoolEntry) -> Self {
        ModifiedEntry {
            txid: entry.txid,
            size_with_ancestors: entry.size_with_ancestors,
            mod_fees_with_ancestors: entry.mod_fees_with_ancestors,
            sigop_cost_with_ancestors: entry.sigop_cost_with_ancestors,
            count_with_ancestors: entry.count_with_ancestors,
            is_contract: entry.is_contract(),
            min_gas_price: entry.min_gas_price,
        }
    }

    fn score(&self) -> Score {
        if self.is_contract {
            Score::GasPrice {
                gas_price: self.min_gas_price,
                ancestor_count: self.count_with_ancestors,
            }
        } else {
            Score::AncestorFeerate {
                mod_fees: self.mod_fees_with_ancestors,
                size: self.size_with_ancestors,
            }
        }
    }

    fn key(&self) -> ScoreKey {
        ScoreKey {
            score: self.score(),
            txid: self.txid,
        }
    }
}

/// Indexed set of shadow entries, keyed by txid with a score index
#[derive(Debug, Default)]
struct ModifiedTxSet {
    map: HashMap<Txid, ModifiedEntry>,
    index: BTreeSet<ScoreKey>,
}

impl ModifiedTxSet {
    fn new() -> Self {
        Self::default()
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn contains(&self, txid: &Txid) -> bool {
        self.map.contains_key(txid)
    }

    fn best(&self) -> Option<&ModifiedEntry> {
        let key = self.index.iter().next_back()?;
        self.map.get(&key.txid)
    }

    fn remove(&mut self, txid: &Txid) {
        if let Some(entry) = self.map.remove(txid) {
            self.index.remove(&entry.key());
        }
    }

    /// Record that `parent` entered the block: the shadow entry for
    /// `descendant` loses the parent's own size, fees and sigops
    fn update_for_parent_inclusion(&mut self, descendant: &MempoolEntry, parent: &MempoolEntry) {
        let shadow = self
            .map
            .entry(descendant.txid)
            .or_insert_with(|| ModifiedEntry::from_entry(descendant));
        self.index.remove(&shadow.key());
        shadow.size_with_ancestors -= parent.tx_size;
        shadow.mod_fees_with_ancestors -= parent.fee;
        shadow.sigop_cost_with_ancestors -= parent.sigop_cost;
        let key = shadow.key();
        self.index.insert(key);
    }
}

/// Builds block templates over snapshot-consistent chain, pool and
/// contract views
pub struct BlockAssembler<'a> {
    params: &'a ConsensusParams,
    options: AssemblerOptions,
    chain: &'a dyn ChainView,
    coins: &'a dyn CoinView,
    mempool: &'a Mempool,
    validator: &'a dyn BlockValidator,
    contracts: Option<ContractBackend<'a>>,

    // Per-assembly state
    block: Block,
    tx_fees: Vec<Amount>,
    tx_sigop_costs: Vec<i64>,
    coinbase_root_state_hash: Vec<u8>,
    resources: BlockResources,
    in_block: HashSet<Txid>,
    height: u32,
    block_max_weight: u64,
    include_witness: bool,
    lock_time_cutoff: i64,
    deadline: i64,
    used_gas: u64,
    hard_block_gas_limit: u64,
    soft_block_gas_limit: u64,
    stats: AssemblyStats,
}

impl<'a> BlockAssembler<'a> {
    pub fn new(
        params: &'a ConsensusParams,
        chain: &'a dyn ChainView,
        coins: &'a dyn CoinView,
        mempool: &'a Mempool,
        validator: &'a dyn BlockValidator,
        options: AssemblerOptions,
    ) -> Self {
        // Sanity-clamp the weight option between the coinbase reserve
        // and the absolute size cap for the next block
        let next_height = chain.tip().map(|tip| tip.height + 1).unwrap_or(0);
        let abs_max_size = params.max_block_size(next_height);
        let block_max_weight = options
            .block_max_weight
            .clamp(4000, abs_max_size.saturating_sub(4000));

        BlockAssembler {
            params,
            options,
            chain,
            coins,
            mempool,
            validator,
            contracts: None,
            block: Block::default(),
            tx_fees: Vec::new(),
            tx_sigop_costs: Vec::new(),
            coinbase_root_state_hash: Vec::new(),
            resources: BlockResources::default(),
            in_block: HashSet::new(),
            height: 0,
            block_max_weight,
            include_witness: false,
            lock_time_cutoff: 0,
            deadline: 0,
            used_gas: 0,
            hard_block_gas_limit: DEFAULT_BLOCK_GAS_LIMIT,
            soft_block_gas_limit: DEFAULT_BLOCK_GAS_LIMIT,
            stats: AssemblyStats::default(),
        }
    }

    /// Attach the contract layer; required once the contract
    /// activation height is reached
    pub fn with_contracts(
        mut self,
        service: &'a mut dyn ContractStateService,
        vm: &'a mut dyn ContractVm,
    ) -> Self {
        self.contracts = Some(ContractBackend { service, vm });
        self
    }

    fn reset_block(&mut self) {
        self.block = Block::default();
        self.tx_fees.clear();
        self.tx_sigop_costs.clear();
        self.coinbase_root_state_hash.clear();
        self.resources.reset_block();
        self.in_block.clear();
        self.include_witness = false;
        self.used_gas = 0;
        self.stats = AssemblyStats::default();
    }

    fn deadline_passed(&self, buffer: i64) -> bool {
        self.deadline != 0 && self.chain.adjusted_time() >= self.deadline - buffer
    }

    /// Reset the coinbase reward after fees changed: null prevout,
    /// first output pays subsidy plus all collected fees
    fn rebuild_reward_transaction(block: &mut Block, reward: Amount) {
        if let Some(coinbase) = block.transactions.first_mut() {
            if let Some(input) = coinbase.inputs.first_mut() {
                input.prevout = OutPoint::null();
            }
            if let Some(output) = coinbase.outputs.first_mut() {
                output.value = reward;
            }
        }
    }

    /// Assemble a proof-of-work block paying `script_pub_key`
    ///
    /// `tx_proof_time` overrides the block timestamp (wall clock when
    /// absent); `deadline` is an absolute wall-clock limit in seconds,
    /// zero for none. Returns `Ok(None)` when no template can be built
    /// and an error only for conditions that indicate a bug or broken
    /// environment.
    pub fn create_new_block(
        &mut self,
        script_pub_key: &[u8],
        mine_witness_txs: bool,
        tx_proof_time: Option<u32>,
        deadline: i64,
    ) -> Result<Option<BlockTemplate>> {
        self.reset_block();
        self.deadline = deadline;

        let Some(prev) = self.chain.tip() else {
            return Err(AssemblyError::ChainAccess("no chain tip".into()));
        };
        self.height = prev.height + 1;
        self.block_max_weight = self
            .block_max_weight
            .min(self.params.max_block_size(self.height));

        // Dummy coinbase occupies index 0 until selection finishes
        self.block.transactions.push(Transaction::default());
        self.tx_fees.push(-1);
        self.tx_sigop_costs.push(-1);

        let mut version = self.params.compute_block_version(MiningType::Pow);
        if self.params.mine_blocks_on_demand {
            if let Some(override_version) = self.options.block_version {
                version = override_version;
            }
        }
        self.block.header.version = version;
        self.block.header.time = tx_proof_time.unwrap_or(self.chain.adjusted_time() as u32);
        self.lock_time_cutoff = prev.median_time_past;
        self.include_witness = self.params.is_witness_enabled(Some(&prev)) && mine_witness_txs;

        // Coinbase paying the caller's script; the reward value is
        // rewritten once fees are known
        let mut script_sig = Vec::new();
        push_int(&mut script_sig, self.height as i64);
        script_sig.push(script::OP_0);
        self.block.transactions[0] = Transaction {
            inputs: vec![TxIn {
                prevout: OutPoint::null(),
                script_sig,
                sequence: crate::constants::SEQUENCE_FINAL,
            }]
            .into(),
            outputs: vec![TxOut::new(
                self.resources.fees + self.params.get_block_subsidy(self.height),
                script_pub_key.to_vec(),
            )]
            .into(),
            ..Default::default()
        };

        let allow_contract = self.height >= self.params.contract_height;
        self.hard_block_gas_limit = DEFAULT_BLOCK_GAS_LIMIT;
        self.soft_block_gas_limit = self.hard_block_gas_limit;

        let pre_root = self.open_pre_root(allow_contract)?;

        // The store must come back to `pre_root` on every exit path:
        // run the fallible middle section, roll back, then surface the
        // first failure
        let body = self.assemble_body(allow_contract, None);
        let restored = self.restore_contract_state(allow_contract, &pre_root);
        body?;
        restored?;

        Self::rebuild_reward_transaction(
            &mut self.block,
            self.resources.fees + self.params.get_block_subsidy(self.height),
        );

        let commitment = self
            .validator
            .generate_coinbase_commitment(&mut self.block, &prev);
        self.tx_fees[0] = -self.resources.fees;

        self.block.header.prev_block_hash = prev.hash;
        self.update_time(&prev);
        self.block.header.bits = self
            .validator
            .get_next_work_required(&prev, &self.block.header);
        self.block.header.nonce = 0;
        self.tx_sigop_costs[0] = WITNESS_SCALE_FACTOR as i64
            * get_legacy_sigop_count(&self.block.transactions[0]) as i64;

        self.validator
            .test_block_validity(&self.block, &prev)
            .map_err(|e| {
                AssemblyError::BlockValidity(format!("TestBlockValidity failed: {e}").into())
            })?;

        let template = self.finish_template(commitment);
        info!(
            weight = template.stats.block_weight,
            txs = template.stats.block_tx,
            fees = template.stats.fees,
            sigops = self.resources.block_sigops,
            "block template assembled"
        );
        Ok(Some(template))
    }

    /// Assemble a proof-of-stake block staking one of `wallet`'s coins
    ///
    /// Returns `Ok(None)` when staking is not possible: no wallet, the
    /// chain is below the activation height, the height is a
    /// reconstruction fork point, the balance is under the reserve, or
    /// no kernel satisfies the target.
    pub fn create_new_block_pos(
        &mut self,
        wallet: Option<&dyn StakingWallet>,
        deadline: i64,
        mine_witness_txs: bool,
    ) -> Result<Option<BlockTemplate>> {
        self.reset_block();
        self.deadline = deadline;

        let Some(wallet) = wallet else {
            return Ok(None);
        };

        let Some(prev) = self.chain.tip() else {
            return Err(AssemblyError::ChainAccess("no chain tip".into()));
        };
        if prev.height + 1 < self.params.contract_height {
            return Ok(None);
        }
        self.height = prev.height + 1;
        if self.height == self.params.fork_v4_height || self.height == self.params.fork_v5_height {
            return Ok(None);
        }

        // Dummy coinbase at index 0; the sigop list reserves a slot
        // for the coinstake as well
        self.block.transactions.push(Transaction::default());
        self.tx_fees.push(-1);
        self.tx_sigop_costs.push(-1);
        self.tx_sigop_costs.push(-1);

        let mut version = self.params.compute_block_version(MiningType::Pos);
        if self.params.mine_blocks_on_demand {
            if let Some(override_version) = self.options.block_version {
                version = override_version;
            }
        }
        self.block.header.version = version;
        self.block.header.time = self.chain.adjusted_time() as u32;
        self.lock_time_cutoff = prev.median_time_past;
        self.include_witness = self.params.is_witness_enabled(Some(&prev)) && mine_witness_txs;

        // The kernel predicate reads nTime, nBits and the previous
        // block hash, so the header is filled before the search
        self.block.header.prev_block_hash = prev.hash;
        self.update_time(&prev);
        self.block.header.bits = self
            .validator
            .get_next_work_required(&prev, &self.block.header);
        self.block.header.nonce = 0;

        let mut pos_state = PosState::default();
        let Some(found) = stake::search_kernel(
            self.chain,
            self.coins,
            wallet,
            self.params,
            &self.block.header,
            self.height,
            self.options.reserve_balance,
            &mut pos_state,
        ) else {
            self.stats.pos = pos_state;
            return Ok(None);
        };

        // Coinbase pays to the kernel script; reward rewritten after
        // selection like the proof-of-work path
        let mut script_sig = Vec::new();
        push_int(&mut script_sig, self.height as i64);
        push_int(&mut script_sig, 1); // extra nonce
        push_data(&mut script_sig, COINBASE_FLAGS);
        assert!(script_sig.len() <= 100);
        self.block.transactions[0] = Transaction {
            inputs: vec![TxIn {
                prevout: OutPoint::null(),
                script_sig,
                sequence: crate::constants::SEQUENCE_FINAL,
            }]
            .into(),
            outputs: vec![TxOut::new(
                self.resources.fees + self.params.get_block_subsidy(self.height),
                found.kernel_script.clone(),
            )]
            .into(),
            ..Default::default()
        };

        let allow_contract = self.height >= self.params.contract_height;
        self.hard_block_gas_limit = DEFAULT_BLOCK_GAS_LIMIT;
        self.soft_block_gas_limit = self.hard_block_gas_limit;

        let pre_root = self.open_pre_root(allow_contract)?;

        let body = self.assemble_body(allow_contract, Some(found.kernel));
        let restored = self.restore_contract_state(allow_contract, &pre_root);
        body?;
        restored?;

        Self::rebuild_reward_transaction(
            &mut self.block,
            self.resources.fees + self.params.get_block_subsidy(self.height),
        );

        // The coinstake takes index 1; its fee slot keeps the lists
        // parallel to the transaction list
        self.block.transactions.insert(1, found.coinstake.clone());
        self.tx_fees.insert(1, 0);

        self.tx_sigop_costs[0] = WITNESS_SCALE_FACTOR as i64
            * get_legacy_sigop_count(&self.block.transactions[0]) as i64;
        self.tx_sigop_costs[1] = WITNESS_SCALE_FACTOR as i64
            * get_legacy_sigop_count(&self.block.transactions[1]) as i64;

        let commitment = self
            .validator
            .generate_coinbase_commitment(&mut self.block, &prev);
        self.tx_fees[0] = -self.resources.fees;

        self.block.header.merkle_root = block_merkle_root(&self.block);

        self.validator
            .test_block_validity(&self.block, &prev)
            .map_err(|e| {
                AssemblyError::BlockValidity(format!("TestBlockValidity failed: {e}").into())
            })?;

        let mut template = self.finish_template(commitment);
        template.stats.pos = pos_state;
        Ok(Some(template))
    }

    /// Snapshot the contract-store root before any selection happens
    fn open_pre_root(&mut self, allow_contract: bool) -> Result<Option<RootStateHash>> {
        if !allow_contract {
            return Ok(None);
        }
        let backend = self.contracts.as_mut().ok_or(AssemblyError::ContractState(
            "contract layer required above activation height".into(),
        ))?;
        backend.service.open()?;
        let root = backend.service.current_root_state_hash();
        backend.service.close();
        Ok(Some(root))
    }

    /// Roll the contract store back to the pre-assembly root
    fn restore_contract_state(
        &mut self,
        allow_contract: bool,
        pre_root: &Option<RootStateHash>,
    ) -> Result<()> {
        let (Some(backend), Some(root)) = (self.contracts.as_mut(), pre_root) else {
            debug_assert!(!allow_contract);
            return Ok(());
        };
        backend.service.open()?;
        let result = backend.service.rollback_contract_state(root);
        backend.service.close();
        result
    }

    /// Selection plus the root-state coinbase carrier and the
    /// fork-height reconstructions
    fn assemble_body(
        &mut self,
        allow_contract: bool,
        pos_outpoint: Option<OutPoint>,
    ) -> Result<()> {
        if self.height != self.params.fork_v4_height && self.height != self.params.fork_v5_height {
            self.add_package_txs(allow_contract, pos_outpoint)?;
        }

        if allow_contract {
            let backend = self.contracts.as_mut().ok_or(AssemblyError::ContractState(
                "contract layer required above activation height".into(),
            ))?;
            backend.service.open()?;
            let root_after = backend.service.current_root_state_hash();

            let mut carrier = Vec::new();
            push_data(&mut carrier, root_after.as_bytes());
            carrier.push(OP_ROOT_STATE_HASH);
            self.block.transactions[0]
                .outputs
                .push(TxOut::new(0, carrier.clone()));
            self.coinbase_root_state_hash = carrier;
        }

        if self.height == self.params.fork_v4_height {
            let mut outputs = fork::collect_bad_outputs(self.chain, self.params)?;
            info!(count = outputs.len(), "bad outputs for holy burn");
            for tx in fork::create_holy_transactions(&mut outputs) {
                self.block.transactions.push(tx);
            }
        }

        if self.height == self.params.fork_v5_height {
            self.block
                .transactions
                .push(fork::create_refund_transaction()?);
        }

        Ok(())
    }

    /// Bump the header time to at least one past the parent's median
    /// time past
    fn update_time(&mut self, prev: &BlockIndex) {
        let new_time = (prev.median_time_past + 1).max(self.chain.adjusted_time());
        if (self.block.header.time as i64) < new_time {
            self.block.header.time = new_time as u32;
        }
        if self.params.pow_allow_min_difficulty_blocks {
            self.block.header.bits = self
                .validator
                .get_next_work_required(prev, &self.block.header);
        }
    }

    fn finish_template(&mut self, commitment: Vec<u8>) -> BlockTemplate {
        self.stats.block_tx = self.resources.block_tx;
        self.stats.block_size = self.resources.block_size;
        self.stats.block_weight = self.resources.block_weight;
        self.stats.fees = self.resources.fees;

        BlockTemplate {
            block: std::mem::take(&mut self.block),
            tx_fees: std::mem::take(&mut self.tx_fees),
            tx_sigop_costs: std::mem::take(&mut self.tx_sigop_costs),
            coinbase_commitment: commitment,
            coinbase_root_state_hash: std::mem::take(&mut self.coinbase_root_state_hash),
            stats: self.stats.clone(),
        }
    }

    /// Transaction-level checks before a package is admitted: finality
    /// at this height and witness permission
    fn test_package_transactions(&self, package: &HashSet<Txid>) -> bool {
        for txid in package {
            let Some(entry) = self.mempool.get(txid) else {
                return false;
            };
            if !self.validator.contextual_check_transaction(
                &entry.tx,
                self.height,
                self.lock_time_cutoff,
            ) {
                return false;
            }
            if !self.include_witness && entry.tx.has_witness() {
                return false;
            }
        }
        true
    }

    fn add_to_block(&mut self, entry: &MempoolEntry) {
        self.block.transactions.push(entry.tx.clone());
        self.tx_fees.push(entry.fee);
        self.tx_sigop_costs.push(entry.sigop_cost);
        self.resources
            .add_tx(entry.tx_size, entry.tx_weight, entry.sigop_cost, entry.fee);
        self.in_block.insert(entry.txid);

        if self.options.print_priority {
            info!(
                fee = entry.fee,
                size = entry.tx_size,
                txid = %hex_txid(&entry.txid),
                "transaction selected"
            );
        }
    }

    /// Insert shadow entries for all unselected descendants of the
    /// newly added transactions
    fn update_packages_for_added(
        &self,
        added: &HashSet<Txid>,
        modified: &mut ModifiedTxSet,
    ) -> u32 {
        let mut descendants_updated = 0;
        for txid in added {
            let Some(parent) = self.mempool.get(txid) else {
                continue;
            };
            for descendant in self.mempool.calculate_descendants(txid) {
                if added.contains(&descendant) {
                    continue;
                }
                let Some(descendant_entry) = self.mempool.get(&descendant) else {
                    continue;
                };
                descendants_updated += 1;
                modified.update_for_parent_inclusion(descendant_entry, parent);
            }
        }
        descendants_updated
    }

    /// Fill the block from the pool in ancestor-score order
    ///
    /// Each round evaluates the better of the next pool entry and the
    /// best shadow entry, then admits the candidate's remaining
    /// ancestors in ancestor-count order. The loop never looks past
    /// the next pool entry, which keeps one assembly linear in the
    /// number of evaluated packages.
    fn add_package_txs(
        &mut self,
        allow_contract: bool,
        pos_outpoint: Option<OutPoint>,
    ) -> Result<()> {
        let mut modified = ModifiedTxSet::new();
        let mut failed: HashSet<Txid> = HashSet::new();
        let mut packages_selected = 0u32;
        let mut descendants_updated = 0u32;

        // Descendants of anything already in the block start shadowed
        let preloaded = self.in_block.clone();
        descendants_updated += self.update_packages_for_added(&preloaded, &mut modified);

        let order = self.mempool.score_order();
        let mut mi = 0usize;

        while mi < order.len() || !modified.is_empty() {
            if self.deadline_passed(0) {
                break;
            }

            // Skip pool entries that are stale: already in the block,
            // shadowed (their cached ancestor state is outdated), or
            // known failures
            if mi < order.len() {
                let txid = order[mi];
                if modified.contains(&txid)
                    || self.in_block.contains(&txid)
                    || failed.contains(&txid)
                {
                    mi += 1;
                    continue;
                }
            }

            // Pick the pool entry or the best shadow entry, whichever
            // scores higher
            let mut using_modified = false;
            let candidate: Txid;
            if mi >= order.len() {
                match modified.best() {
                    Some(best) => {
                        candidate = best.txid;
                        using_modified = true;
                    }
                    None => break,
                }
            } else {
                let pool_txid = order[mi];
                let Some(pool_entry) = self.mempool.get(&pool_txid) else {
                    mi += 1;
                    continue;
                };
                let pool_key = ScoreKey {
                    score: pool_entry.score(),
                    txid: pool_txid,
                };
                match modified.best() {
                    Some(best) if best.key() > pool_key => {
                        candidate = best.txid;
                        using_modified = true;
                    }
                    _ => {
                        candidate = pool_txid;
                        mi += 1;
                    }
                }
            }

            debug_assert!(!self.in_block.contains(&candidate));

            let Some(entry) = self.mempool.get(&candidate).cloned() else {
                modified.remove(&candidate);
                continue;
            };

            let (package_size, package_fees, package_sigops) = if using_modified {
                let Some(shadow) = modified.map.get(&candidate) else {
                    continue;
                };
                (
                    shadow.size_with_ancestors,
                    shadow.mod_fees_with_ancestors,
                    shadow.sigop_cost_with_ancestors,
                )
            } else {
                (
                    entry.size_with_ancestors,
                    entry.mod_fees_with_ancestors,
                    entry.sigop_cost_with_ancestors,
                )
            };

            if package_fees < self.options.block_min_fee_rate.get_fee(package_size) {
                // Everything further scores below the floor
                break;
            }

            if !self.resources.test_package(
                package_size,
                package_sigops,
                self.block_max_weight,
                self.params.max_block_sigops(self.height),
            ) {
                if using_modified {
                    // The best shadow entry must make way so the next
                    // best can be considered on the following round
                    modified.remove(&candidate);
                    failed.insert(candidate);
                }
                continue;
            }

            let mut ancestors = self.mempool.calculate_ancestors(&candidate);
            ancestors.retain(|ancestor| !self.in_block.contains(ancestor));
            ancestors.insert(candidate);

            if !self.test_package_transactions(&ancestors) {
                if using_modified {
                    modified.remove(&candidate);
                    failed.insert(candidate);
                }
                continue;
            }

            // Admit in dependency order: a transaction has strictly
            // more ancestors than any of its ancestors
            let mut sorted: Vec<Txid> = ancestors.iter().copied().collect();
            sorted.sort_by_key(|txid| {
                (
                    self.mempool
                        .get(txid)
                        .map(|e| e.count_with_ancestors)
                        .unwrap_or(0),
                    *txid,
                )
            });

            let mut was_added = true;
            for txid in &sorted {
                if !was_added || self.deadline_passed(0) {
                    modified.remove(txid);
                    was_added = false;
                    continue;
                }
                let Some(member) = self.mempool.get(txid).cloned() else {
                    modified.remove(txid);
                    was_added = false;
                    continue;
                };

                // Never spend the outpoint staked by the coinstake;
                // dropping the member invalidates its descendants, so
                // the rest of the package is abandoned with it
                if let Some(pos_outpoint) = pos_outpoint {
                    if member
                        .tx
                        .inputs
                        .iter()
                        .any(|input| input.prevout == pos_outpoint)
                    {
                        modified.remove(txid);
                        was_added = false;
                        continue;
                    }
                }

                if !allow_contract && (member.tx.has_contract_op() || member.tx.has_op_spend()) {
                    modified.remove(txid);
                    was_added = false;
                    continue;
                }

                if member.tx.has_contract_op() {
                    was_added = self.attempt_to_add_contract(&member)?;
                    if !was_added && using_modified {
                        modified.remove(&candidate);
                        failed.insert(candidate);
                    }
                } else {
                    self.add_to_block(&member);
                }

                modified.remove(txid);
            }

            if !was_added {
                // A member failed; descendant state is untouched, like
                // a package that never fit
                continue;
            }

            packages_selected += 1;
            descendants_updated += self.update_packages_for_added(&ancestors, &mut modified);
        }

        self.stats.packages_selected = packages_selected;
        self.stats.descendants_updated = descendants_updated;
        Ok(())
    }

    /// Dry-run a contract package against the store snapshot and keep
    /// it only if every check passes
    ///
    /// Rejection is local: the transaction stays out of the block, the
    /// store is rolled back to the attempt's pre-root, and selection
    /// continues. Only a broken service surface is an error.
    fn attempt_to_add_contract(&mut self, entry: &MempoolEntry) -> Result<bool> {
        if self.deadline_passed(BYTECODE_TIME_BUFFER) {
            return Ok(false);
        }

        // Work on local copies of the totals; nothing is applied until
        // the execution has committed and still fits
        let mut block_size = self.resources.block_size;
        let mut block_sigops = self.resources.block_sigops;

        let tx_value_in = self.coins.get_value_in(&entry.tx);
        let max_sigops = self.params.max_block_sigops(self.height);

        let Some(backend) = self.contracts.as_mut() else {
            return Ok(false);
        };

        let Ok(extracted) = backend.vm.extract_contract_transactions(&entry.tx) else {
            // Mempool acceptance already rejects malformed contract
            // scripts; only raw submissions reach this branch
            return Ok(false);
        };

        backend.service.open()?;

        let block_gas_limit = u64::MAX;
        let mut sum_gas_coins: Amount = 0;
        let mut gas_count_all_txs: Amount = 0;
        let mut all_deposit: u64 = 0;
        let all_withdrawn: u64 = extracted
            .contract_withdraw_infos
            .iter()
            .map(|withdraw| withdraw.amount)
            .sum();

        for contract_tx in &extracted.txs {
            if !backend.vm.check_params(
                &*backend.service,
                contract_tx,
                sum_gas_coins,
                gas_count_all_txs,
                block_gas_limit,
            ) {
                return Ok(false);
            }
            sum_gas_coins +=
                (contract_tx.params.gas_limit.saturating_mul(contract_tx.params.gas_price)) as Amount;
            gas_count_all_txs += contract_tx.params.gas_limit as Amount;
            all_deposit += contract_tx.params.deposit_amount;
        }

        // The fee must cover the whole declared gas budget after
        // deposits are set aside
        let mut tx_fee = tx_value_in + all_withdrawn as Amount - entry.tx.get_value_out();
        if tx_fee <= all_deposit as Amount {
            return Ok(false);
        }
        tx_fee -= all_deposit as Amount;
        if tx_fee < sum_gas_coins {
            return Ok(false);
        }

        let pre_root = backend.service.current_root_state_hash();
        let mut guard = RollbackGuard::new(&mut *backend.service, pre_root, false);

        if backend
            .vm
            .perform_bytecode(
                guard.service(),
                &self.block,
                &extracted.txs,
                self.hard_block_gas_limit,
                tx_fee,
            )
            .is_err()
        {
            return Ok(false);
        }

        let Ok(exec_result) = backend.vm.process_results() else {
            return Ok(false);
        };

        if self.used_gas + exec_result.used_gas > self.soft_block_gas_limit {
            // This transaction would push the block over its gas
            // budget
            return Ok(false);
        }

        if !exec_result.match_contract_withdraw_infos(&extracted.contract_withdraw_infos) {
            return Ok(false);
        }

        if backend.vm.commit_changes(guard.service()).is_err() {
            return Ok(false);
        }

        // Apply the costs locally and re-check the block-level caps;
        // a failure here still rolls the commit back
        block_size += entry.tx.serialized_size();
        block_sigops += entry.sigop_cost;

        if block_sigops * WITNESS_SCALE_FACTOR as i64 > max_sigops || block_size > MAX_BLOCK_SER_SIZE
        {
            return Ok(false);
        }

        // Accepted: keep the new root and charge the real totals
        guard.disarm();
        drop(guard);

        self.used_gas += exec_result.used_gas;

        self.block.transactions.push(entry.tx.clone());
        self.tx_fees.push(entry.fee);
        self.tx_sigop_costs.push(entry.sigop_cost);
        self.resources.block_size += entry.tx.serialized_size();
        self.resources.block_weight += entry.tx_weight;
        self.resources.block_tx += 1;
        self.resources.block_sigops += entry.sigop_cost;
        self.resources.fees += entry.fee;
        self.in_block.insert(entry.txid);

        // Rebuilding the reward output leaves the coinbase scripts
        // unchanged, but the recount keeps the totals exact
        let sigops_before = get_legacy_sigop_count(&self.block.transactions[0]) as i64;
        Self::rebuild_reward_transaction(
            &mut self.block,
            self.resources.fees + self.params.get_block_subsidy(self.height),
        );
        let sigops_after = get_legacy_sigop_count(&self.block.transactions[0]) as i64;
        self.resources.block_sigops += sigops_after - sigops_before;

        debug!(
            txid = %hex_txid(&entry.txid),
            used_gas = exec_result.used_gas,
            "contract transaction selected"
        );

        Ok(true)
    }
}

/// Rebuild the coinbase scriptSig with a fresh extra nonce and refresh
/// the merkle root
pub fn increment_extra_nonce(block: &mut Block, prev_height: u32, extra_nonce: &mut u32) {
    *extra_nonce += 1;
    let height = prev_height + 1;
    let mut script_sig = Vec::new();
    push_int(&mut script_sig, height as i64);
    push_int(&mut script_sig, *extra_nonce as i64);
    push_data(&mut script_sig, COINBASE_FLAGS);
    assert!(script_sig.len() <= 100);

    if let Some(coinbase) = block.transactions.first_mut() {
        if let Some(input) = coinbase.inputs.first_mut() {
            input.script_sig = script_sig;
        }
    }
    block.header.merkle_root = block_merkle_root(block);
}

fn hex_txid(txid: &Txid) -> String {
    // Display order is the reverse of the internal byte order
    let mut bytes = txid.0;
    bytes.reverse();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Destination;
    use crate::chain::{DefaultValidator, MemoryChain, MemoryCoinView, StakingWallet};
    use crate::contract::{
        ContractExecResult, ContractTransaction, ExtractedContractTx, RootStateHash,
    };
    use crate::serialization::tx_weight;
    use crate::types::Coin;

    const EASY_BITS: u32 = 0x2100ffff;

    fn pow_params() -> ConsensusParams {
        ConsensusParams {
            contract_height: u32::MAX,
            fork_v3_height: u32::MAX,
            fork_v4_height: u32::MAX,
            fork_v5_height: u32::MAX,
            scan_bad_tx_height: u32::MAX,
            holy_seed_start_height: u32::MAX,
            segwit_height: 0,
            stake_min_confirmations: 50,
            pow_allow_min_difficulty_blocks: false,
            mine_blocks_on_demand: false,
        }
    }

    fn build_chain(blocks: u32) -> MemoryChain {
        let mut chain = MemoryChain::new();
        for i in 0..blocks {
            let mut block = Block::default();
            block.header.time = 1_600_000_000 + i;
            block.header.bits = EASY_BITS;
            chain.push_block(block);
        }
        chain.set_adjusted_time(1_600_100_000);
        chain
    }

    fn pay_script(tag: u8) -> Vec<u8> {
        Destination::PubKeyHash([tag; 20]).script_pubkey()
    }

    fn spend(prev: Txid, n: u32, value: Amount, tag: u8) -> Transaction {
        Transaction {
            inputs: vec![TxIn::from_outpoint(OutPoint::new(prev, n))].into(),
            outputs: vec![TxOut::new(value, pay_script(tag))].into(),
            ..Default::default()
        }
    }

    fn assemble(
        params: &ConsensusParams,
        chain: &MemoryChain,
        coins: &MemoryCoinView,
        mempool: &Mempool,
        options: AssemblerOptions,
    ) -> BlockTemplate {
        let validator = DefaultValidator;
        let mut assembler =
            BlockAssembler::new(params, chain, coins, mempool, &validator, options);
        assembler
            .create_new_block(&pay_script(0xfe), true, Some(1_600_100_000), 0)
            .unwrap()
            .expect("template")
    }

    #[test]
    fn test_empty_mempool_template() {
        let params = pow_params();
        let chain = build_chain(10);
        let template = assemble(
            &params,
            &chain,
            &MemoryCoinView::new(),
            &Mempool::new(),
            AssemblerOptions::default(),
        );

        assert_eq!(template.block.transactions.len(), 1);
        let coinbase = &template.block.transactions[0];
        assert!(coinbase.is_coinbase());
        assert_eq!(coinbase.outputs[0].value, params.get_block_subsidy(10));
        assert_eq!(template.tx_fees, vec![0]);
        assert_eq!(template.stats.fees, 0);
        assert_eq!(template.stats.block_tx, 0);

        // Height push then OP_0
        let mut expected_sig = Vec::new();
        push_int(&mut expected_sig, 10);
        expected_sig.push(script::OP_0);
        assert_eq!(coinbase.inputs[0].script_sig, expected_sig);
    }

    #[test]
    fn test_two_tx_ancestor_chain() {
        let params = pow_params();
        let chain = build_chain(10);
        let coins = MemoryCoinView::new();

        let mut mempool = Mempool::new();
        let parent_tx = spend(Txid([0xaa; 32]), 0, 50_000, 1);
        let parent = mempool.add(parent_tx, 1000, 4, 0);
        let child_tx = spend(parent, 0, 40_000, 2);
        let child = mempool.add(child_tx, 3000, 4, 0);

        let template = assemble(&params, &chain, &coins, &mempool, AssemblerOptions::default());

        let txids: Vec<Txid> = template
            .block
            .transactions
            .iter()
            .map(|tx| tx.txid())
            .collect();
        assert_eq!(template.block.transactions.len(), 3);
        let parent_pos = txids.iter().position(|t| *t == parent).unwrap();
        let child_pos = txids.iter().position(|t| *t == child).unwrap();
        assert!(parent_pos < child_pos);
        assert_eq!(template.stats.fees, 4000);
        assert_eq!(
            template.block.transactions[0].outputs[0].value,
            params.get_block_subsidy(10) + 4000
        );
        assert_eq!(template.tx_fees[0], -4000);

        // No duplicates
        let mut deduped = txids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), txids.len());
    }

    #[test]
    fn test_fee_floor_boundary() {
        let params = pow_params();
        let chain = build_chain(10);
        let coins = MemoryCoinView::new();

        let tx = spend(Txid([0xaa; 32]), 0, 50_000, 1);
        let vsize = tx_weight(&tx).div_ceil(WITNESS_SCALE_FACTOR);
        let floor = FeeRate::new(1000).get_fee(vsize);

        let options = AssemblerOptions {
            block_min_fee_rate: FeeRate::new(1000),
            ..Default::default()
        };

        // Fee exactly at the floor is accepted
        let mut mempool = Mempool::new();
        mempool.add(tx.clone(), floor, 4, 0);
        let template = assemble(&params, &chain, &coins, &mempool, options.clone());
        assert_eq!(template.block.transactions.len(), 2);

        // One satoshi below is not
        let mut mempool = Mempool::new();
        mempool.add(tx, floor - 1, 4, 0);
        let template = assemble(&params, &chain, &coins, &mempool, options);
        assert_eq!(template.block.transactions.len(), 1);
    }

    #[test]
    fn test_weight_budget_rejects_everything() {
        let params = pow_params();
        let chain = build_chain(10);
        let coins = MemoryCoinView::new();

        let mut mempool = Mempool::new();
        mempool.add(spend(Txid([0xaa; 32]), 0, 50_000, 1), 10_000, 4, 0);

        // Clamped to exactly the coinbase reservation: nothing fits
        let options = AssemblerOptions {
            block_max_weight: 4000,
            ..Default::default()
        };
        let template = assemble(&params, &chain, &coins, &mempool, options);
        assert_eq!(template.block.transactions.len(), 1);
        assert_eq!(template.stats.fees, 0);
    }

    #[test]
    fn test_deadline_expired_on_entry() {
        let params = pow_params();
        let chain = build_chain(10);
        let coins = MemoryCoinView::new();

        let mut mempool = Mempool::new();
        mempool.add(spend(Txid([0xaa; 32]), 0, 50_000, 1), 10_000, 4, 0);

        let validator = DefaultValidator;
        let mut assembler = BlockAssembler::new(
            &params,
            &chain,
            &coins,
            &mempool,
            &validator,
            AssemblerOptions::default(),
        );
        // adjusted_time is far past this deadline
        let template = assembler
            .create_new_block(&pay_script(0xfe), true, Some(1_600_100_000), 10)
            .unwrap()
            .expect("template");
        assert_eq!(template.block.transactions.len(), 1);
    }

    #[test]
    fn test_witness_tx_needs_witness_enabled() {
        let params = pow_params();
        let chain = build_chain(10);
        let coins = MemoryCoinView::new();

        let mut tx = spend(Txid([0xaa; 32]), 0, 50_000, 1);
        tx.witness = vec![vec![vec![0x01; 20]]];
        let mut mempool = Mempool::new();
        mempool.add(tx, 10_000, 4, 0);

        let validator = DefaultValidator;
        let mut assembler = BlockAssembler::new(
            &params,
            &chain,
            &coins,
            &mempool,
            &validator,
            AssemblerOptions::default(),
        );
        let template = assembler
            .create_new_block(&pay_script(0xfe), false, Some(1_600_100_000), 0)
            .unwrap()
            .expect("template");
        assert_eq!(template.block.transactions.len(), 1);
    }

    #[test]
    fn test_descendant_selected_through_modified_view() {
        let params = pow_params();
        let chain = build_chain(10);
        let coins = MemoryCoinView::new();

        // Parent alone outranks the package; the child must be picked
        // up afterwards with its ancestor state reduced
        let mut mempool = Mempool::new();
        let parent_tx = spend(Txid([0xaa; 32]), 0, 50_000, 1);
        let parent = mempool.add(parent_tx, 50_000, 4, 0);
        let child_tx = spend(parent, 0, 40_000, 2);
        let child = mempool.add(child_tx, 2_000, 4, 0);

        let template = assemble(&params, &chain, &coins, &mempool, AssemblerOptions::default());
        let txids: Vec<Txid> = template
            .block
            .transactions
            .iter()
            .map(|tx| tx.txid())
            .collect();
        assert!(txids.contains(&parent));
        assert!(txids.contains(&child));
        assert_eq!(template.stats.fees, 52_000);
        assert!(template.stats.descendants_updated >= 1);
    }

    #[test]
    fn test_deterministic_assembly() {
        let params = pow_params();
        let chain = build_chain(10);
        let coins = MemoryCoinView::new();

        let mut mempool = Mempool::new();
        for tag in 0..8u8 {
            mempool.add(
                spend(Txid([tag + 1; 32]), 0, 10_000, tag),
                1_000 + tag as i64 * 137,
                4,
                0,
            );
        }

        let a = assemble(&params, &chain, &coins, &mempool, AssemblerOptions::default());
        let b = assemble(&params, &chain, &coins, &mempool, AssemblerOptions::default());
        assert_eq!(a.block, b.block);
        assert_eq!(a.tx_fees, b.tx_fees);
        assert_eq!(a.stats.fees, b.stats.fees);
    }

    // Contract layer mocks: a root-tracking store and a VM that is
    // never reached because no pool transaction carries contract ops

    #[derive(Default)]
    struct MockContractService {
        root: RootStateHash,
        rollbacks: u32,
    }

    impl ContractStateService for MockContractService {
        fn open(&mut self) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) {}

        fn current_root_state_hash(&self) -> RootStateHash {
            self.root.clone()
        }

        fn rollback_contract_state(&mut self, root: &RootStateHash) -> Result<()> {
            self.root = root.clone();
            self.rollbacks += 1;
            Ok(())
        }
    }

    struct NoopVm;

    impl ContractVm for NoopVm {
        fn extract_contract_transactions(&self, _tx: &Transaction) -> Result<ExtractedContractTx> {
            Err(AssemblyError::ContractExecution("not a contract".into()))
        }

        fn check_params(
            &self,
            _service: &dyn ContractStateService,
            _contract_tx: &ContractTransaction,
            _sum_gas_coins: Amount,
            _gas_count_all_txs: Amount,
            _block_gas_limit: u64,
        ) -> bool {
            false
        }

        fn perform_bytecode(
            &mut self,
            _service: &mut dyn ContractStateService,
            _block: &Block,
            _txs: &[ContractTransaction],
            _hard_block_gas_limit: u64,
            _tx_fee: Amount,
        ) -> Result<()> {
            Ok(())
        }

        fn process_results(&mut self) -> Result<ContractExecResult> {
            Ok(ContractExecResult::default())
        }

        fn commit_changes(&mut self, _service: &mut dyn ContractStateService) -> Result<()> {
            Ok(())
        }
    }

    fn pos_params() -> ConsensusParams {
        ConsensusParams {
            contract_height: 10,
            fork_v3_height: 1,
            fork_v4_height: u32::MAX,
            fork_v5_height: u32::MAX,
            scan_bad_tx_height: u32::MAX,
            holy_seed_start_height: u32::MAX,
            segwit_height: 0,
            stake_min_confirmations: 50,
            pow_allow_min_difficulty_blocks: false,
            mine_blocks_on_demand: false,
        }
    }

    struct OneCoinWallet {
        balance: Amount,
        coin: OutPoint,
        value: Amount,
    }

    impl StakingWallet for OneCoinWallet {
        fn get_balance(&self) -> Amount {
            self.balance
        }

        fn select_coins_for_staking(&self, _target: Amount) -> Option<(Vec<OutPoint>, Amount)> {
            Some((vec![self.coin], self.value))
        }
    }

    #[test]
    fn test_pos_template_layout() {
        let params = pos_params();
        let chain = build_chain(300);
        let height = 300u32;

        let kernel = OutPoint::new(Txid([0x11; 32]), 0);
        let kernel_script = pay_script(0x55);
        let mut coins = MemoryCoinView::new();
        coins.add_coin(
            kernel,
            Coin {
                out: TxOut::new(70_000, kernel_script.clone()),
                height: height - 200,
                is_coinbase: false,
            },
        );

        // A pool transaction that would double-spend the kernel must
        // stay out of the template
        let mut mempool = Mempool::new();
        let conflict = mempool.add(spend(kernel.hash, kernel.n, 60_000, 9), 50_000, 4, 0);

        let wallet = OneCoinWallet {
            balance: 100_000,
            coin: kernel,
            value: 70_000,
        };

        let mut service = MockContractService {
            root: "genesis-root".into(),
            ..Default::default()
        };
        let mut vm = NoopVm;
        let validator = DefaultValidator;
        let mut assembler = BlockAssembler::new(
            &params,
            &chain,
            &coins,
            &mempool,
            &validator,
            AssemblerOptions::default(),
        )
        .with_contracts(&mut service, &mut vm);

        let template = assembler
            .create_new_block_pos(Some(&wallet), 0, true)
            .unwrap()
            .expect("stake template");

        let block = &template.block;
        assert!(block.is_proof_of_stake());

        // Coinbase pays to the kernel script and carries the root
        // state hash as a second, zero-value output
        let coinbase = &block.transactions[0];
        assert_eq!(coinbase.outputs[0].script_pubkey, kernel_script);
        assert_eq!(coinbase.outputs[1].value, 0);
        assert_eq!(
            coinbase.outputs[1].script_pubkey,
            template.coinbase_root_state_hash
        );
        assert_eq!(
            *coinbase.outputs[1].script_pubkey.last().unwrap(),
            OP_ROOT_STATE_HASH
        );

        // Coinstake shape: kernel input, empty marker, value returned
        let coinstake = &block.transactions[1];
        assert_eq!(coinstake.inputs[0].prevout, kernel);
        assert!(coinstake.outputs[0].is_empty());
        assert_eq!(coinstake.outputs[1].value, 70_000);
        assert_eq!(coinstake.outputs[1].script_pubkey, kernel_script);

        // The conflicting spender was skipped
        assert!(!block.transactions.iter().any(|tx| tx.txid() == conflict));
        for (i, tx) in block.transactions.iter().enumerate() {
            if i == 1 {
                continue;
            }
            assert!(!tx.inputs.iter().any(|input| input.prevout == kernel));
        }

        // Parallel bookkeeping and the restored store root
        assert_eq!(template.tx_fees.len(), block.transactions.len());
        assert_eq!(template.tx_sigop_costs.len(), block.transactions.len());
        assert_eq!(service.root, "genesis-root");
        assert!(service.rollbacks >= 1);
        assert_ne!(block.header.merkle_root, [0u8; 32]);
        assert_eq!(template.stats.pos.num_of_utxo, 1);
    }

    #[test]
    fn test_pos_refused_without_wallet() {
        let params = pos_params();
        let chain = build_chain(300);
        let coins = MemoryCoinView::new();
        let mempool = Mempool::new();
        let validator = DefaultValidator;
        let mut assembler = BlockAssembler::new(
            &params,
            &chain,
            &coins,
            &mempool,
            &validator,
            AssemblerOptions::default(),
        );
        assert!(assembler.create_new_block_pos(None, 0, true).unwrap().is_none());
    }

    #[test]
    fn test_pos_refused_below_activation() {
        let mut params = pos_params();
        params.contract_height = 1_000;
        let chain = build_chain(300);
        let coins = MemoryCoinView::new();
        let mempool = Mempool::new();
        let wallet = OneCoinWallet {
            balance: 100_000,
            coin: OutPoint::new(Txid([0x11; 32]), 0),
            value: 70_000,
        };
        let validator = DefaultValidator;
        let mut assembler = BlockAssembler::new(
            &params,
            &chain,
            &coins,
            &mempool,
            &validator,
            AssemblerOptions::default(),
        );
        assert!(assembler
            .create_new_block_pos(Some(&wallet), 0, true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_pos_refused_at_fork_heights() {
        let mut params = pos_params();
        params.fork_v4_height = 300;
        let chain = build_chain(300);
        let coins = MemoryCoinView::new();
        let mempool = Mempool::new();
        let wallet = OneCoinWallet {
            balance: 100_000,
            coin: OutPoint::new(Txid([0x11; 32]), 0),
            value: 70_000,
        };
        let validator = DefaultValidator;
        let mut assembler = BlockAssembler::new(
            &params,
            &chain,
            &coins,
            &mempool,
            &validator,
            AssemblerOptions::default(),
        );
        assert!(assembler
            .create_new_block_pos(Some(&wallet), 0, true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_increment_extra_nonce() {
        let mut block = Block::default();
        block.transactions.push(Transaction {
            inputs: vec![TxIn {
                prevout: OutPoint::null(),
                script_sig: vec![0x51],
                sequence: crate::constants::SEQUENCE_FINAL,
            }]
            .into(),
            outputs: vec![TxOut::new(50, pay_script(1))].into(),
            ..Default::default()
        });

        let mut extra_nonce = 0u32;
        increment_extra_nonce(&mut block, 99, &mut extra_nonce);
        assert_eq!(extra_nonce, 1);
        let sig1 = block.transactions[0].inputs[0].script_sig.clone();
        let root1 = block.header.merkle_root;

        increment_extra_nonce(&mut block, 99, &mut extra_nonce);
        assert_eq!(extra_nonce, 2);
        assert_ne!(block.transactions[0].inputs[0].script_sig, sig1);
        assert_ne!(block.header.merkle_root, root1);
    }
}
