//! Script constants, construction, and classification
//!
//! Only the script surface block assembly needs: building coinbase
//! scriptSigs and carrier outputs, classifying output scripts into
//! standard types, and counting legacy sigops. Script *execution* is
//! not implemented here; signature checking belongs to the node's
//! validation layer.
//!
//! Reference: the chain's `script/script.h` and `script/standard.cpp`.

use crate::address::Destination;

// Push data opcodes
pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;

// Control / crypto opcodes used by classification
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

// Contract opcodes
pub const OP_CREATE: u8 = 0xc1;
pub const OP_CALL: u8 = 0xc2;
pub const OP_SPEND: u8 = 0xc3;
/// Commits the contract-state root hash in a coinbase output
pub const OP_ROOT_STATE_HASH: u8 = 0xc4;

/// Maximum public keys counted for an inaccurate CHECKMULTISIG
const MAX_PUBKEYS_PER_MULTISIG: u32 = 20;

/// Standard script templates recognised by [`solver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    NonStandard,
    PubKey,
    PubKeyHash,
    ScriptHash,
    Multisig,
    NullData,
    WitnessV0KeyHash,
    WitnessV0ScriptHash,
}

/// Read one operation at `pos`: returns the opcode, the push payload
/// range (if any), and the position of the next operation. `None` on a
/// truncated push, matching GetOp failure.
fn get_op(script: &[u8], pos: usize) -> Option<(u8, Option<(usize, usize)>, usize)> {
    let opcode = *script.get(pos)?;

    if opcode > 0 && opcode < OP_PUSHDATA1 {
        let len = opcode as usize;
        let start = pos + 1;
        let end = start.checked_add(len)?;
        if end > script.len() {
            return None;
        }
        Some((opcode, Some((start, end)), end))
    } else if opcode == OP_PUSHDATA1 {
        let len = *script.get(pos + 1)? as usize;
        let start = pos + 2;
        let end = start.checked_add(len)?;
        if end > script.len() {
            return None;
        }
        Some((opcode, Some((start, end)), end))
    } else if opcode == OP_PUSHDATA2 {
        let len_bytes = script.get(pos + 1..pos + 3)?;
        let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let start = pos + 3;
        let end = start.checked_add(len)?;
        if end > script.len() {
            return None;
        }
        Some((opcode, Some((start, end)), end))
    } else if opcode == OP_PUSHDATA4 {
        let len_bytes = script.get(pos + 1..pos + 5)?;
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
            as usize;
        let start = pos + 5;
        let end = start.checked_add(len)?;
        if end > script.len() {
            return None;
        }
        Some((opcode, Some((start, end)), end))
    } else {
        Some((opcode, None, pos + 1))
    }
}

/// Whether the script contains `op` as an executed opcode (push data
/// payloads are skipped, so a matching byte inside a push does not
/// count)
pub fn script_contains_op(script: &[u8], op: u8) -> bool {
    let mut pos = 0;
    while pos < script.len() {
        match get_op(script, pos) {
            Some((opcode, _, next)) => {
                if opcode == op {
                    return true;
                }
                pos = next;
            }
            None => return false,
        }
    }
    false
}

/// Serialize an integer the way CScriptNum does: little-endian,
/// minimal length, with an extra byte when the sign bit would be set
pub fn script_num_serialize(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }

    let mut result = Vec::new();
    let negative = value < 0;
    let mut abs = value.unsigned_abs();

    while abs > 0 {
        result.push((abs & 0xff) as u8);
        abs >>= 8;
    }

    // The most significant byte carries the sign bit; if the value
    // already uses it, add a padding byte.
    let last = *result.last().unwrap_or(&0);
    if last & 0x80 != 0 {
        result.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        let idx = result.len() - 1;
        result[idx] |= 0x80;
    }

    result
}

/// Append a data push using the shortest encoding
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    if data.len() < OP_PUSHDATA1 as usize {
        script.push(data.len() as u8);
    } else if data.len() <= 0xff {
        script.push(OP_PUSHDATA1);
        script.push(data.len() as u8);
    } else if data.len() <= 0xffff {
        script.push(OP_PUSHDATA2);
        script.extend_from_slice(&(data.len() as u16).to_le_bytes());
    } else {
        script.push(OP_PUSHDATA4);
        script.extend_from_slice(&(data.len() as u32).to_le_bytes());
    }
    script.extend_from_slice(data);
}

/// Append an integer push the way `CScript << n` does: OP_0, OP_1..16,
/// OP_1NEGATE, or a CScriptNum data push
pub fn push_int(script: &mut Vec<u8>, value: i64) {
    if value == 0 {
        script.push(OP_0);
    } else if value == -1 {
        script.push(OP_1NEGATE);
    } else if (1..=16).contains(&value) {
        script.push(OP_1 + (value as u8) - 1);
    } else {
        let bytes = script_num_serialize(value);
        push_data(script, &bytes);
    }
}

fn is_pubkey_len(len: usize) -> bool {
    len == 33 || len == 65
}

/// Classify a scriptPubKey into a standard template
///
/// Returns the type and the template solutions: the pushed hash for
/// hash-based types, the raw pubkey for P2PK, and `[m] pubkeys.. [n]`
/// for bare multisig, matching the layout the chain's `Solver` uses.
pub fn solver(script: &[u8]) -> (ScriptType, Vec<Vec<u8>>) {
    // Pay-to-script-hash: OP_HASH160 <20> OP_EQUAL
    if script.len() == 23
        && script[0] == OP_HASH160
        && script[1] == 0x14
        && script[22] == OP_EQUAL
    {
        return (ScriptType::ScriptHash, vec![script[2..22].to_vec()]);
    }

    // Pay-to-pubkey-hash: OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        return (ScriptType::PubKeyHash, vec![script[3..23].to_vec()]);
    }

    // Witness program v0: OP_0 <20|32>
    if script.len() == 22 && script[0] == OP_0 && script[1] == 0x14 {
        return (ScriptType::WitnessV0KeyHash, vec![script[2..22].to_vec()]);
    }
    if script.len() == 34 && script[0] == OP_0 && script[1] == 0x20 {
        return (ScriptType::WitnessV0ScriptHash, vec![script[2..34].to_vec()]);
    }

    // Pay-to-pubkey: <33|65> OP_CHECKSIG
    if (script.len() == 35 || script.len() == 67)
        && script[0] as usize == script.len() - 2
        && is_pubkey_len(script[0] as usize)
        && script[script.len() - 1] == OP_CHECKSIG
    {
        return (ScriptType::PubKey, vec![script[1..script.len() - 1].to_vec()]);
    }

    // Null data: OP_RETURN ...
    if !script.is_empty() && script[0] == OP_RETURN {
        return (ScriptType::NullData, Vec::new());
    }

    // Bare multisig: OP_m <pubkey>.. OP_n OP_CHECKMULTISIG
    if let Some(solutions) = match_multisig(script) {
        return (ScriptType::Multisig, solutions);
    }

    (ScriptType::NonStandard, Vec::new())
}

fn match_multisig(script: &[u8]) -> Option<Vec<Vec<u8>>> {
    if script.len() < 3 || *script.last()? != OP_CHECKMULTISIG {
        return None;
    }
    let m_op = script[0];
    let n_op = script[script.len() - 2];
    if !(OP_1..=OP_16).contains(&m_op) || !(OP_1..=OP_16).contains(&n_op) {
        return None;
    }
    let m = m_op - OP_1 + 1;
    let n = n_op - OP_1 + 1;
    if m > n {
        return None;
    }

    let mut solutions = vec![vec![m]];
    let mut pos = 1;
    let mut keys = 0u32;
    while pos < script.len() - 2 {
        let (opcode, push, next) = get_op(script, pos)?;
        let (start, end) = push?;
        if !is_pubkey_len(opcode as usize) {
            return None;
        }
        solutions.push(script[start..end].to_vec());
        keys += 1;
        pos = next;
    }
    if keys != n as u32 {
        return None;
    }
    solutions.push(vec![n]);
    Some(solutions)
}

/// Extract the destinations a scriptPubKey pays to, plus the number of
/// required signatures
pub fn extract_destinations(script: &[u8]) -> Option<(ScriptType, Vec<Destination>, usize)> {
    let (which_type, solutions) = solver(script);
    match which_type {
        ScriptType::PubKeyHash => Some((
            which_type,
            vec![Destination::PubKeyHash(to_hash20(&solutions[0])?)],
            1,
        )),
        ScriptType::ScriptHash => Some((
            which_type,
            vec![Destination::ScriptHash(to_hash20(&solutions[0])?)],
            1,
        )),
        ScriptType::PubKey => Some((
            which_type,
            vec![Destination::PubKeyHash(crate::address::hash160(
                &solutions[0],
            ))],
            1,
        )),
        ScriptType::Multisig => {
            let required = solutions.first()?.first().copied()? as usize;
            let mut destinations = Vec::new();
            for pubkey in &solutions[1..solutions.len() - 1] {
                destinations.push(Destination::PubKeyHash(crate::address::hash160(pubkey)));
            }
            if destinations.is_empty() {
                return None;
            }
            Some((which_type, destinations, required))
        }
        ScriptType::WitnessV0KeyHash => Some((
            which_type,
            vec![Destination::WitnessProgram {
                version: 0,
                program: solutions[0].clone(),
            }],
            1,
        )),
        ScriptType::WitnessV0ScriptHash => Some((
            which_type,
            vec![Destination::WitnessProgram {
                version: 0,
                program: solutions[0].clone(),
            }],
            1,
        )),
        ScriptType::NullData | ScriptType::NonStandard => None,
    }
}

fn to_hash20(bytes: &[u8]) -> Option<[u8; 20]> {
    bytes.try_into().ok()
}

/// Count legacy sigops in one script (inaccurate CHECKMULTISIG
/// counting, matching `CScript::GetSigOpCount(false)`)
pub fn count_sigops(script: &[u8], accurate: bool) -> u32 {
    let mut count = 0u32;
    let mut last_opcode: Option<u8> = None;
    let mut pos = 0;

    while pos < script.len() {
        let Some((opcode, _, next)) = get_op(script, pos) else {
            break;
        };

        if opcode == OP_CHECKSIG || opcode == OP_CHECKSIGVERIFY {
            count = count.saturating_add(1);
        } else if opcode == OP_CHECKMULTISIG || opcode == OP_CHECKMULTISIGVERIFY {
            match last_opcode {
                Some(prev) if accurate && (OP_1..=OP_16).contains(&prev) => {
                    count = count.saturating_add((prev - OP_1 + 1) as u32);
                }
                _ => count = count.saturating_add(MAX_PUBKEYS_PER_MULTISIG),
            }
        }

        last_opcode = Some(opcode);
        pos = next;
    }

    count
}

/// Legacy sigop count over all of a transaction's scripts
pub fn get_legacy_sigop_count(tx: &crate::types::Transaction) -> u32 {
    let mut count = 0u32;
    for input in &tx.inputs {
        count = count.saturating_add(count_sigops(&input.script_sig, false));
    }
    for output in &tx.outputs {
        count = count.saturating_add(count_sigops(&output.script_pubkey, false));
    }
    count
}
