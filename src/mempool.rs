//! Mempool consumer view
//!
//! Block assembly consumes the mempool as an indexed multiset ordered
//! by ancestor score or gas price. Entries cache the metrics selection
//! needs; the ancestor aggregates are computed over in-pool parents at
//! insertion time. The selector never holds references into the pool
//! across mutations - everything is keyed by txid.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::serialization::tx_weight;
use crate::types::{Amount, Transaction, Txid};

/// Selection score for one package
///
/// Plain transactions are ranked by the fee rate of the transaction
/// combined with all its unconfirmed ancestors. Contract transactions
/// are ranked by gas price, below all plain transactions, preferring
/// fewer ancestors and then higher gas price.
#[derive(Debug, Clone, Copy)]
pub enum Score {
    AncestorFeerate { mod_fees: Amount, size: u64 },
    GasPrice { gas_price: u64, ancestor_count: u64 },
}

impl Score {
    /// Package fee rate comparison by cross-multiplication; avoids
    /// floating point entirely
    fn feerate_cmp(fees_a: Amount, size_a: u64, fees_b: Amount, size_b: u64) -> Ordering {
        let lhs = (fees_a as i128) * (size_b as i128);
        let rhs = (fees_b as i128) * (size_a as i128);
        lhs.cmp(&rhs)
    }
}

impl Ord for Score {
    /// `Greater` means better for selection
    fn cmp(&self, other: &Self) -> Ordering {
        use Score::*;
        match (self, other) {
            (AncestorFeerate { .. }, GasPrice { .. }) => Ordering::Greater,
            (GasPrice { .. }, AncestorFeerate { .. }) => Ordering::Less,
            (
                AncestorFeerate {
                    mod_fees: fees_a,
                    size: size_a,
                },
                AncestorFeerate {
                    mod_fees: fees_b,
                    size: size_b,
                },
            ) => Self::feerate_cmp(*fees_a, *size_a, *fees_b, *size_b),
            (
                GasPrice {
                    gas_price: gas_a,
                    ancestor_count: count_a,
                },
                GasPrice {
                    gas_price: gas_b,
                    ancestor_count: count_b,
                },
            ) => {
                // Fewer ancestors first, then higher gas price
                match count_b.cmp(count_a) {
                    Ordering::Equal => gas_a.cmp(gas_b),
                    order => order,
                }
            }
        }
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

/// Index key: score first, txid as the stable tie-break
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreKey {
    pub score: Score,
    pub txid: Txid,
}

impl Ord for ScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| self.txid.cmp(&other.txid))
    }
}

impl PartialOrd for ScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One mempool entry with the cached metrics selection reads
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub txid: Txid,
    pub tx: Transaction,
    /// Virtual size in bytes
    pub tx_size: u64,
    pub tx_weight: u64,
    /// Fee including any prioritisation delta
    pub fee: Amount,
    pub sigop_cost: i64,
    pub count_with_ancestors: u64,
    pub size_with_ancestors: u64,
    pub mod_fees_with_ancestors: Amount,
    pub sigop_cost_with_ancestors: i64,
    /// Minimum gas price over the entry's contract outputs; zero for
    /// plain transactions
    pub min_gas_price: u64,
}

impl MempoolEntry {
    pub fn is_contract(&self) -> bool {
        self.min_gas_price > 0 || self.tx.has_contract_op()
    }

    pub fn score(&self) -> Score {
        if self.is_contract() {
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

    fn score_key(&self) -> ScoreKey {
        ScoreKey {
            score: self.score(),
            txid: self.txid,
        }
    }
}

/// Indexed set of pending transactions
#[derive(Debug, Default)]
pub struct Mempool {
    entries: HashMap<Txid, MempoolEntry>,
    parents: HashMap<Txid, BTreeSet<Txid>>,
    children: HashMap<Txid, BTreeSet<Txid>>,
    index: BTreeSet<ScoreKey>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction; parents already in the pool are linked and
    /// ancestor aggregates computed transitively. Parents must be
    /// inserted before their children.
    pub fn add(&mut self, tx: Transaction, fee: Amount, sigop_cost: i64, min_gas_price: u64) -> Txid {
        let txid = tx.txid();
        let weight = tx_weight(&tx);
        let vsize = weight.div_ceil(crate::constants::WITNESS_SCALE_FACTOR);

        let parents: BTreeSet<Txid> = tx
            .inputs
            .iter()
            .map(|input| input.prevout.hash)
            .filter(|parent| self.entries.contains_key(parent))
            .collect();

        for parent in &parents {
            self.children.entry(*parent).or_default().insert(txid);
        }
        self.parents.insert(txid, parents);

        let mut entry = MempoolEntry {
            txid,
            tx,
            tx_size: vsize,
            tx_weight: weight,
            fee,
            sigop_cost,
            count_with_ancestors: 1,
            size_with_ancestors: vsize,
            mod_fees_with_ancestors: fee,
            sigop_cost_with_ancestors: sigop_cost,
            min_gas_price,
        };

        for ancestor in self.calculate_ancestors(&txid) {
            let anc = &self.entries[&ancestor];
            entry.count_with_ancestors += 1;
            entry.size_with_ancestors += anc.tx_size;
            entry.mod_fees_with_ancestors += anc.fee;
            entry.sigop_cost_with_ancestors += anc.sigop_cost;
        }

        self.index.insert(entry.score_key());
        self.entries.insert(txid, entry);
        txid
    }

    pub fn get(&self, txid: &Txid) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    pub fn contains(&self, txid: &Txid) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All in-pool ancestors of `txid`, transitively, excluding the
    /// entry itself
    pub fn calculate_ancestors(&self, txid: &Txid) -> HashSet<Txid> {
        let mut ancestors = HashSet::new();
        let mut stack: Vec<Txid> = self
            .parents
            .get(txid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        while let Some(current) = stack.pop() {
            if ancestors.insert(current) {
                if let Some(parents) = self.parents.get(&current) {
                    stack.extend(parents.iter().copied());
                }
            }
        }
        ancestors
    }

    /// All in-pool descendants of `txid`, transitively, including the
    /// entry itself
    pub fn calculate_descendants(&self, txid: &Txid) -> HashSet<Txid> {
        let mut descendants = HashSet::new();
        let mut stack = vec![*txid];

        while let Some(current) = stack.pop() {
            if descendants.insert(current) {
                if let Some(children) = self.children.get(&current) {
                    stack.extend(children.iter().copied());
                }
            }
        }
        descendants
    }

    /// Txids in selection order, best package first
    pub fn score_order(&self) -> Vec<Txid> {
        self.index.iter().rev().map(|key| key.txid).collect()
    }
}
