//! Network constants and fee policy values

/// Maximum money supply: 21,000,000 BTC in satoshis
pub const MAX_MONEY: i64 = 21_000_000 * 100_000_000;

/// Satoshis per BTC
pub const SATOSHIS_PER_BTC: i64 = 100_000_000;

/// Version byte of a mainnet pay-to-pubkey-hash address
pub const ADDRESS_VERSION_P2PKH: u8 = 0;

/// Version byte of a testnet pay-to-pubkey-hash address
pub const ADDRESS_VERSION_P2PKH_TESTNET: u8 = 111;

/// Version byte of a mainnet pay-to-script-hash address
pub const ADDRESS_VERSION_P2SH: u8 = 5;

/// Version byte of a testnet pay-to-script-hash address
pub const ADDRESS_VERSION_P2SH_TESTNET: u8 = 196;

/// Version byte of a mainnet WIF private key
pub const WIF_VERSION: u8 = 0x80;

/// Version byte of a testnet WIF private key
pub const WIF_VERSION_TESTNET: u8 = 0xef;

/// Human-readable bech32 prefix, mainnet
pub const BECH32_HRP: &str = "bc";

/// Human-readable bech32 prefix, testnet
pub const BECH32_HRP_TESTNET: &str = "tc";

/// SIGHASH_ALL signature hash type
pub const SIGHASH_ALL: u32 = 1;

/// Default relay fee floor, satoshis per 1000 bytes
pub const MIN_FEE_PER_KB: i64 = 10_000;

/// Outputs at or below this value are surrendered to fee instead of
/// producing change
pub const DUST_THRESHOLD: i64 = 546;

/// Sequence number for final transaction
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Maximum script length accepted by the verifier
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum stack size during script execution
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of operations in a script
pub const MAX_SCRIPT_OPS: usize = 201;

// Size-estimation constants for fee computation. Witness bytes are not
// counted: fee estimation follows base transaction size, where a witness
// input contributes only its outpoint, empty script and sequence.

/// Estimated size of a signed P2PKH input, compressed public key
pub const INPUT_SIZE_P2PKH: usize = 148;

/// Estimated size of a signed P2PKH input, uncompressed public key
pub const INPUT_SIZE_P2PKH_UNCOMPRESSED: usize = 180;

/// Estimated base size of a signed P2WPKH input
pub const INPUT_SIZE_P2WPKH: usize = 41;

/// Estimated base size of a signed P2SH-wrapped P2WPKH input
pub const INPUT_SIZE_P2SH_P2WPKH: usize = 64;

/// Estimated size of one output
pub const OUTPUT_SIZE: usize = 34;

/// Version, input/output counts and lock time of a small transaction
pub const TX_OVERHEAD_SIZE: usize = 10;
