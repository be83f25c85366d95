//! Chain and assembly constants
//!
//! Values here are consensus-critical unless noted otherwise; they must
//! match the live chain byte for byte.

/// Satoshis per coin
pub const COIN: i64 = 100_000_000;

/// Maximum money supply: 21,000,000 coins in satoshis
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// Halving interval: 210,000 blocks
pub const HALVING_INTERVAL: u32 = 210_000;

/// Initial block subsidy: 50 coins
pub const INITIAL_SUBSIDY: i64 = 50 * COIN;

/// Weight = (stripped_size * WITNESS_SCALE_FACTOR) + witness_size (BIP141)
pub const WITNESS_SCALE_FACTOR: u64 = 4;

/// Maximum serialized block size in bytes, witness included
pub const MAX_BLOCK_SER_SIZE: u64 = 8_000_000;

/// Default for the `-blockmaxweight` option
pub const DEFAULT_BLOCK_MAX_WEIGHT: u64 = 3_996_000;

/// Default for the `-blockmintxfee` option, in satoshis per kilobyte
pub const DEFAULT_BLOCK_MIN_TX_FEE: i64 = 1000;

/// Serialized-size budget reserved for the coinbase transaction
pub const COINBASE_RESERVED_SIZE: u64 = 1000;

/// Weight budget reserved for the coinbase transaction
pub const COINBASE_RESERVED_WEIGHT: u64 = 4000;

/// Sigop-cost budget reserved for the coinbase transaction
pub const COINBASE_RESERVED_SIGOPS: i64 = 400;

/// Lock time values below this threshold are block heights, above are
/// unix timestamps
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number marking an input as final
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Default minimum gas price accepted for contract transactions
pub const DEFAULT_MIN_GAS_PRICE: u64 = 40;

/// Default per-block gas budget for contract execution
pub const DEFAULT_BLOCK_GAS_LIMIT: u64 = 40_000_000;

/// Seconds reserved before the assembly deadline during which no new
/// contract bytecode execution is started
pub const BYTECODE_TIME_BUFFER: i64 = 6;

/// Extra data appended to the proof-of-stake coinbase scriptSig
pub const COINBASE_FLAGS: &[u8] = b"/P2SH/";

/// Maximum outpoints consumed by a single burning transaction
pub const HOLY_BATCH_SIZE: usize = 0x80;

/// Fee, in satoshis, deducted from each burning transaction
pub const HOLY_TX_FEE: i64 = 1_000_000;

/// Addresses whose outputs are never marked bad by the fork-V4 scan
pub const FORK_V4_WHITELIST: [&str; 2] = [
    "3BbKnVAatHjjzXb8uSa3SyEFCYdUA6VMy9",
    "1BycBHJvoSbfmsprK6QctGU7ei8MB4kAme",
];

/// Input spent by the fork-V5 refund transaction (display order txid)
pub const REFUND_INPUT_TXID: &str =
    "59ff1001a53d25636a0ab2fa6c6fad1af042971b8ef9e2ffc0dc5d6024ca82e5";

/// Recipients of the fork-V5 refund transaction, in output order
pub const REFUND_OUTPUTS: [(&str, i64); 3] = [
    // Exchange refund address
    ("1FXDtibGqZvbxAPwEa6o2ff9zH197Z5BKt", 792_809_985_302),
    // Withdrawing user
    ("14A94kvXiny71yQoCj8dftLDhQLzsdmEA5", 208_950_000),
    // Change; outputs of this address are only spendable by fork
    ("15wJjXvfQzo3SXqoWGbWZmNYND1Si4siqV", 1_528_394_232_994),
];
