//! Base58check addresses and payment destinations
//!
//! Assembly needs addresses in three places: the fork-V4 whitelist
//! check, the burning address for holy transactions, and the fork-V5
//! refund recipients. All of them are legacy base58 addresses, so only
//! the legacy encoding is implemented; witness destinations are carried
//! structurally and never round-trip through strings here.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::borrow::Cow;

use crate::error::{AssemblyError, Result};
use crate::script;

/// Mainnet version byte for pay-to-pubkey-hash addresses
pub const PUBKEY_ADDRESS_VERSION: u8 = 0x00;

/// Mainnet version byte for pay-to-script-hash addresses
pub const SCRIPT_ADDRESS_VERSION: u8 = 0x05;

const BASE58_ALPHABET: &[u8; 58] =
    b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Where an output pays to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    PubKeyHash([u8; 20]),
    ScriptHash([u8; 20]),
    WitnessProgram { version: u8, program: Vec<u8> },
}

impl Destination {
    /// The scriptPubKey paying to this destination
    ///
    /// Witness programs are reconstructed as version-0 programs; other
    /// versions do not occur in this subsystem.
    pub fn script_pubkey(&self) -> Vec<u8> {
        match self {
            Destination::PubKeyHash(hash) => {
                let mut s = vec![script::OP_DUP, script::OP_HASH160];
                script::push_data(&mut s, hash);
                s.push(script::OP_EQUALVERIFY);
                s.push(script::OP_CHECKSIG);
                s
            }
            Destination::ScriptHash(hash) => {
                let mut s = vec![script::OP_HASH160];
                script::push_data(&mut s, hash);
                s.push(script::OP_EQUAL);
                s
            }
            Destination::WitnessProgram { program, .. } => {
                let mut s = vec![script::OP_0];
                script::push_data(&mut s, program);
                s
            }
        }
    }
}

/// RIPEMD160(SHA256(data)), the standard key/script digest
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

fn base58_encode(data: &[u8]) -> String {
    // Count leading zeroes; each maps to a leading '1'
    let zeroes = data.iter().take_while(|&&b| b == 0).count();

    let mut digits: Vec<u8> = Vec::with_capacity(data.len() * 138 / 100 + 1);
    for &byte in &data[zeroes..] {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut result = String::with_capacity(zeroes + digits.len());
    for _ in 0..zeroes {
        result.push('1');
    }
    for &digit in digits.iter().rev() {
        result.push(BASE58_ALPHABET[digit as usize] as char);
    }
    result
}

fn base58_decode(s: &str) -> Result<Vec<u8>> {
    let zeroes = s.bytes().take_while(|&b| b == b'1').count();

    let mut bytes: Vec<u8> = Vec::with_capacity(s.len() * 733 / 1000 + 1);
    for ch in s.bytes().skip(zeroes) {
        let value = BASE58_ALPHABET
            .iter()
            .position(|&c| c == ch)
            .ok_or_else(|| {
                AssemblyError::Address(Cow::Owned(format!(
                    "invalid base58 character 0x{ch:02x}"
                )))
            })? as u32;

        let mut carry = value;
        for byte in bytes.iter_mut() {
            carry += (*byte as u32) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let mut result = vec![0u8; zeroes];
    result.extend(bytes.iter().rev());
    Ok(result)
}

/// Encode a legacy destination as a base58check address
pub fn encode_destination(dest: &Destination) -> Result<String> {
    let (version, hash) = match dest {
        Destination::PubKeyHash(hash) => (PUBKEY_ADDRESS_VERSION, hash),
        Destination::ScriptHash(hash) => (SCRIPT_ADDRESS_VERSION, hash),
        Destination::WitnessProgram { .. } => {
            return Err(AssemblyError::Address(
                "witness destinations have no legacy encoding".into(),
            ))
        }
    };

    let mut payload = Vec::with_capacity(25);
    payload.push(version);
    payload.extend_from_slice(hash);
    let checksum = crate::arith::double_sha256(&payload);
    payload.extend_from_slice(&checksum[..4]);
    Ok(base58_encode(&payload))
}

/// Decode a base58check address into a legacy destination
pub fn decode_destination(address: &str) -> Result<Destination> {
    let payload = base58_decode(address)?;
    if payload.len() != 25 {
        return Err(AssemblyError::Address(Cow::Owned(format!(
            "address payload length {} invalid",
            payload.len()
        ))));
    }

    let checksum = crate::arith::double_sha256(&payload[..21]);
    if checksum[..4] != payload[21..] {
        return Err(AssemblyError::Address("checksum mismatch".into()));
    }

    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..21]);
    match payload[0] {
        PUBKEY_ADDRESS_VERSION => Ok(Destination::PubKeyHash(hash)),
        SCRIPT_ADDRESS_VERSION => Ok(Destination::ScriptHash(hash)),
        version => Err(AssemblyError::Address(Cow::Owned(format!(
            "unknown address version {version}"
        )))),
    }
}

/// The well-known burning destination: the legacy address of the
/// compressed public key `0x02` followed by 32 zero bytes
pub fn burning_destination() -> Destination {
    let mut pubkey = [0u8; 33];
    pubkey[0] = 0x02;
    Destination::PubKeyHash(hash160(&pubkey))
}
