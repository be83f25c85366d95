//! Contract-inclusion boundary
//!
//! The contract layer is consumed through two interfaces: a persistent
//! state service addressed by root hash, and a VM that extracts,
//! validates, dry-runs and commits contract transactions. Assembly
//! explores contract execution against a snapshot and must leave the
//! store at its pre-assembly root on every exit path; `RollbackGuard`
//! enforces that.

use tracing::warn;

use crate::error::Result;
use crate::types::{Amount, Block, Transaction};

/// Opaque content hash of the contract key-value store
pub type RootStateHash = String;

/// Gas and deposit parameters of one contract call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContractParams {
    pub gas_limit: u64,
    pub gas_price: u64,
    pub deposit_amount: u64,
}

/// One VM input converted from a contract-carrying transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractTransaction {
    pub params: ContractParams,
    pub sender: Vec<u8>,
    pub callee: Vec<u8>,
    pub bytecode: Vec<u8>,
    pub value: Amount,
}

/// A withdrawal from the contract system claimed by a transaction
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContractWithdrawInfo {
    pub account: Vec<u8>,
    pub amount: u64,
}

/// Result of converting one transaction for the VM
#[derive(Debug, Clone, Default)]
pub struct ExtractedContractTx {
    pub txs: Vec<ContractTransaction>,
    pub contract_withdraw_infos: Vec<ContractWithdrawInfo>,
}

/// Result of one dry-run over the extracted transactions
#[derive(Debug, Clone, Default)]
pub struct ContractExecResult {
    pub used_gas: u64,
    pub withdraw_infos: Vec<ContractWithdrawInfo>,
}

impl ContractExecResult {
    /// Whether the VM-observed withdrawals match the declared ones as
    /// multisets
    pub fn match_contract_withdraw_infos(&self, declared: &[ContractWithdrawInfo]) -> bool {
        match_withdraw_infos(&self.withdraw_infos, declared)
    }
}

/// Multiset equality over withdraw infos
pub fn match_withdraw_infos(a: &[ContractWithdrawInfo], b: &[ContractWithdrawInfo]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut lhs = a.to_vec();
    let mut rhs = b.to_vec();
    lhs.sort();
    rhs.sort();
    lhs == rhs
}

/// Persistent contract-state store addressed by root hash
pub trait ContractStateService {
    /// Begin a session; opening an already-open store is a no-op
    fn open(&mut self) -> Result<()>;

    fn close(&mut self);

    fn current_root_state_hash(&self) -> RootStateHash;

    fn rollback_contract_state(&mut self, root: &RootStateHash) -> Result<()>;
}

/// Contract VM surface used during assembly
///
/// `perform_bytecode` buffers execution effects; `process_results`
/// reports them; `commit_changes` applies them to the store, producing
/// a new root. Any error is treated as rejection of the transaction
/// under evaluation.
pub trait ContractVm {
    /// Convert a contract-carrying transaction into VM inputs; an
    /// error means the OP sequence is malformed or unresolvable
    fn extract_contract_transactions(
        &self,
        tx: &Transaction,
    ) -> Result<ExtractedContractTx>;

    /// Per-call parameter validation against the service and the
    /// running per-block totals
    fn check_params(
        &self,
        service: &dyn ContractStateService,
        contract_tx: &ContractTransaction,
        sum_gas_coins: Amount,
        gas_count_all_txs: Amount,
        block_gas_limit: u64,
    ) -> bool;

    fn perform_bytecode(
        &mut self,
        service: &mut dyn ContractStateService,
        block: &Block,
        txs: &[ContractTransaction],
        hard_block_gas_limit: u64,
        tx_fee: Amount,
    ) -> Result<()>;

    fn process_results(&mut self) -> Result<ContractExecResult>;

    fn commit_changes(&mut self, service: &mut dyn ContractStateService) -> Result<()>;
}

/// Scoped rollback of the contract store
///
/// Restores `pre_root` on drop unless `disarm` or `rollback_now` ran.
/// With `sessioned` set, drop brackets the rollback with open/close;
/// the per-attempt guard runs inside an already-open session and leaves
/// session management to its caller.
pub struct RollbackGuard<'a> {
    service: &'a mut dyn ContractStateService,
    pre_root: RootStateHash,
    armed: bool,
    sessioned: bool,
}

impl<'a> RollbackGuard<'a> {
    pub fn new(
        service: &'a mut dyn ContractStateService,
        pre_root: RootStateHash,
        sessioned: bool,
    ) -> Self {
        RollbackGuard {
            service,
            pre_root,
            armed: true,
            sessioned,
        }
    }

    pub fn service(&mut self) -> &mut dyn ContractStateService {
        &mut *self.service
    }

    pub fn pre_root(&self) -> &RootStateHash {
        &self.pre_root
    }

    /// The protected section committed; the store keeps its new root
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Roll back immediately, propagating errors; consumes the guard
    pub fn rollback_now(mut self) -> Result<()> {
        self.armed = false;
        if self.sessioned {
            self.service.open()?;
        }
        let result = self.service.rollback_contract_state(&self.pre_root);
        if self.sessioned {
            self.service.close();
        }
        result
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.sessioned {
            if let Err(error) = self.service.open() {
                warn!(%error, "contract store open failed during rollback");
                return;
            }
        }
        if let Err(error) = self.service.rollback_contract_state(&self.pre_root) {
            warn!(%error, "contract state rollback failed");
        }
        if self.sessioned {
            self.service.close();
        }
    }
}
