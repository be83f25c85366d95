//! Fork-height block reconstruction
//!
//! At two hard-coded heights the chain does not mine from the mempool.
//! The fork-V4 block burns a deterministically computed set of bad
//! outputs; the fork-V5 block carries one literal refund transaction.
//! Every value produced here is consensus-critical: all nodes must
//! derive byte-identical transactions from the same chain history.

use std::borrow::Cow;
use std::collections::HashMap;

use tracing::{info, warn};

use crate::address::{burning_destination, decode_destination, Destination};
use crate::chain::ChainView;
use crate::constants::{FORK_V4_WHITELIST, HOLY_BATCH_SIZE, HOLY_TX_FEE, REFUND_INPUT_TXID, REFUND_OUTPUTS};
use crate::error::{AssemblyError, Result};
use crate::params::ConsensusParams;
use crate::script::extract_destinations;
use crate::types::{Amount, OutPoint, Transaction, TxIn, TxOut, Txid};

/// Position of `outpoint` in the ordered output list
fn find_output(outputs: &[(OutPoint, TxOut)], outpoint: &OutPoint) -> Option<usize> {
    outputs.iter().position(|(candidate, _)| candidate == outpoint)
}

/// Parse a display-order (big-endian) txid hex string
fn txid_from_display_hex(hex_str: &str) -> Result<Txid> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| AssemblyError::Serialization(Cow::Owned(format!("bad txid hex: {e}"))))?;
    let array: [u8; 32] = bytes.try_into().map_err(|_| {
        AssemblyError::Serialization("txid hex must be 32 bytes".into())
    })?;
    let mut hash = array;
    hash.reverse();
    Ok(Txid(hash))
}

/// Seed the rolling outpoint value map for the bad-output scan
///
/// Walks `[holy_seed_start_height, fork_v4_height)`. Coinbase
/// transactions contribute output 0, coinstakes output 1, and every
/// other transaction all of its outputs.
pub fn collect_seed_coins(
    chain: &dyn ChainView,
    params: &ConsensusParams,
) -> Result<HashMap<OutPoint, Amount>> {
    let mut coins = HashMap::new();

    for height in params.holy_seed_start_height..params.fork_v4_height {
        let index = chain.at_height(height).ok_or(AssemblyError::ChainAccess(
            Cow::Owned(format!("no active block at height {height}")),
        ))?;
        let block = chain.read_block(&index)?;

        for tx in &block.transactions {
            let txid = tx.txid();
            if tx.is_coinbase() {
                if let Some(out) = tx.outputs.first() {
                    coins.insert(OutPoint::new(txid, 0), out.value);
                }
            } else if tx.is_coinstake() {
                if let Some(out) = tx.outputs.get(1) {
                    coins.insert(OutPoint::new(txid, 1), out.value);
                }
            } else {
                for (n, out) in tx.outputs.iter().enumerate() {
                    coins.insert(OutPoint::new(txid, n as u32), out.value);
                }
            }
        }
    }

    Ok(coins)
}

/// Compute the bad output set consumed by the holy-burn transactions
///
/// Two rules, applied over `[scan_bad_tx_height, fork_v4_height)`:
/// a coinstake whose input value (from the seed map) differs from its
/// output value marks its own output 1 and the sibling coinbase's
/// output 0 bad; and any transaction spending a bad output removes the
/// spent entries and taints all of its own outputs except those paying
/// a whitelisted address (plus the sibling coinbase again when the
/// spender is itself a coinstake).
pub fn collect_bad_outputs(
    chain: &dyn ChainView,
    params: &ConsensusParams,
) -> Result<Vec<(OutPoint, TxOut)>> {
    let coins = collect_seed_coins(chain, params)?;

    let whitelist: Vec<Destination> = FORK_V4_WHITELIST
        .iter()
        .map(|address| decode_destination(address))
        .collect::<Result<_>>()?;

    let mut outputs: Vec<(OutPoint, TxOut)> = Vec::new();

    for height in params.scan_bad_tx_height..params.fork_v4_height {
        let index = chain.at_height(height).ok_or(AssemblyError::ChainAccess(
            Cow::Owned(format!("no active block at height {height}")),
        ))?;
        let block = chain.read_block(&index)?;
        let block_is_pos = block.is_proof_of_stake();
        let coinbase_txid = block.transactions.first().map(|tx| tx.txid());

        for tx in &block.transactions {
            if block_is_pos && tx.is_coinstake() {
                let prevout = tx.inputs[0].prevout;
                let Some(&value_in) = coins.get(&prevout) else {
                    continue;
                };
                let value_out = tx.get_value_out();
                if value_in != value_out {
                    let txid = tx.txid();
                    let stake_outpoint = OutPoint::new(txid, 1);
                    if find_output(&outputs, &stake_outpoint).is_none() {
                        outputs.push((stake_outpoint, tx.outputs[1].clone()));
                    }

                    if let (Some(coinbase), Some(coinbase_txid)) =
                        (block.transactions.first(), coinbase_txid)
                    {
                        let coinbase_outpoint = OutPoint::new(coinbase_txid, 0);
                        if find_output(&outputs, &coinbase_outpoint).is_none() {
                            outputs.push((coinbase_outpoint, coinbase.outputs[0].clone()));
                        }
                    }
                }
            }

            if !tx.is_coinbase() {
                let mut related = false;
                for input in &tx.inputs {
                    if let Some(position) = find_output(&outputs, &input.prevout) {
                        related = true;
                        outputs.remove(position);
                    }
                }

                if related {
                    let txid = tx.txid();
                    let mut first_index = 0;
                    if block_is_pos && tx.is_coinstake() {
                        if let (Some(coinbase), Some(coinbase_txid)) =
                            (block.transactions.first(), coinbase_txid)
                        {
                            let coinbase_outpoint = OutPoint::new(coinbase_txid, 0);
                            if find_output(&outputs, &coinbase_outpoint).is_none() {
                                outputs.push((coinbase_outpoint, coinbase.outputs[0].clone()));
                            }
                        }
                        first_index = 1;
                    }

                    for (n, out) in tx.outputs.iter().enumerate().skip(first_index) {
                        let whitelisted = match extract_destinations(&out.script_pubkey) {
                            Some((_, destinations, _)) => destinations
                                .first()
                                .map(|dest| whitelist.contains(dest))
                                .unwrap_or(false),
                            None => {
                                warn!(height, vout = n, "destination extraction failed");
                                false
                            }
                        };
                        if whitelisted {
                            continue;
                        }

                        let outpoint = OutPoint::new(txid, n as u32);
                        if find_output(&outputs, &outpoint).is_none() {
                            outputs.push((outpoint, out.clone()));
                        }
                    }
                }
            }
        }
    }

    info!(count = outputs.len(), "bad output scan complete");
    Ok(outputs)
}

/// Turn the bad output set into burning transactions
///
/// Batches of up to 128 outpoints are taken from the tail of the list;
/// each batch becomes one transaction paying its total value minus the
/// fixed fee to the well-known burning address.
pub fn create_holy_transactions(outputs: &mut Vec<(OutPoint, TxOut)>) -> Vec<Transaction> {
    let burn_script = burning_destination().script_pubkey();
    let mut transactions = Vec::new();

    while !outputs.is_empty() {
        let pop = outputs.len().min(HOLY_BATCH_SIZE);
        let batch = outputs.split_off(outputs.len() - pop);

        let amount: Amount = batch.iter().map(|(_, out)| out.value).sum();

        let tx = Transaction {
            inputs: batch
                .iter()
                .map(|(outpoint, _)| TxIn::from_outpoint(*outpoint))
                .collect(),
            outputs: vec![TxOut::new(amount - HOLY_TX_FEE, burn_script.clone())].into(),
            ..Default::default()
        };
        transactions.push(tx);
    }

    transactions
}

/// The literal fork-V5 refund transaction
///
/// One input, three outputs; recipient addresses and amounts are fixed
/// and must round-trip bit-exactly.
pub fn create_refund_transaction() -> Result<Transaction> {
    let prevout = OutPoint::new(txid_from_display_hex(REFUND_INPUT_TXID)?, 0);

    let mut outputs = Vec::with_capacity(REFUND_OUTPUTS.len());
    for (address, amount) in REFUND_OUTPUTS {
        let destination = decode_destination(address)?;
        outputs.push(TxOut::new(amount, destination.script_pubkey()));
    }

    Ok(Transaction {
        inputs: vec![TxIn::from_outpoint(prevout)].into(),
        outputs: outputs.into(),
        ..Default::default()
    })
}
