//! Address model: derivation from public keys, parsing and script
//! construction for all four supported kinds

use std::fmt;

use crate::base58;
use crate::bech32;
use crate::constants::*;
use crate::error::{Result, WalletError};
use crate::hashes::sha256_ripemd160;
use crate::script::Script;
use crate::types::{ByteString, Network};

/// The two address representations: a version-prefixed hash160 (legacy
/// Base58Check) or a segwit witness program (bech32).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressKind {
    Legacy { version: u8, hash160: [u8; 20] },
    Witness { version: u8, program: ByteString },
}

/// A parsed or derived address. Exactly one representation is populated by
/// construction, and `to_string` is the exact inverse of `decode` for every
/// supported variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub kind: AddressKind,
    pub testnet: bool,
}

impl Address {
    /// Parse an address string of any supported kind.
    ///
    /// A case-insensitive `bc`/`tc` prefix routes to bech32; everything else
    /// is Base58Check with a version byte in {0, 111, 5, 196}. Unknown
    /// version bytes are unsupported rather than malformed.
    pub fn decode(input: &str) -> Result<Address> {
        let input = input.trim();
        if let Some(prefix) = input.get(..2).filter(|_| input.len() > 3) {
            let prefix = prefix.to_ascii_lowercase();
            if prefix == BECH32_HRP || prefix == BECH32_HRP_TESTNET {
                let testnet = prefix == BECH32_HRP_TESTNET;
                let (version, program) = bech32::decode_segwit_address(&prefix, input)?;
                return Ok(Address {
                    kind: AddressKind::Witness { version, program },
                    testnet,
                });
            }
        }

        let payload = base58::check_decode(input)?;
        if payload.len() != 21 {
            return Err(WalletError::BadFormat(format!(
                "address payload must be 21 bytes, got {}",
                payload.len()
            )));
        }
        let version = payload[0];
        match version {
            ADDRESS_VERSION_P2PKH
            | ADDRESS_VERSION_P2PKH_TESTNET
            | ADDRESS_VERSION_P2SH
            | ADDRESS_VERSION_P2SH_TESTNET => {
                let mut hash160 = [0u8; 20];
                hash160.copy_from_slice(&payload[1..21]);
                Ok(Address {
                    kind: AddressKind::Legacy { version, hash160 },
                    testnet: version == ADDRESS_VERSION_P2PKH_TESTNET
                        || version == ADDRESS_VERSION_P2SH_TESTNET,
                })
            }
            other => Err(WalletError::UnsupportedType(format!(
                "unsupported address version {}",
                other
            ))),
        }
    }

    /// Encode back to the string form. Fails only on a hand-built witness
    /// program violating the BIP-173 constraints.
    pub fn encode(&self) -> Result<String> {
        match &self.kind {
            AddressKind::Legacy { version, hash160 } => {
                Ok(hash160_to_base58(*version, hash160))
            }
            AddressKind::Witness { version, program } => {
                let hrp = if self.testnet { BECH32_HRP_TESTNET } else { BECH32_HRP };
                bech32::encode_segwit_address(hrp, *version, program)
            }
        }
    }

    /// The output script paying to this address.
    pub fn script_pubkey(&self) -> Script {
        match &self.kind {
            AddressKind::Legacy { version, hash160 } => {
                if *version == ADDRESS_VERSION_P2SH || *version == ADDRESS_VERSION_P2SH_TESTNET {
                    Script::p2sh(hash160)
                } else {
                    Script::p2pkh(hash160)
                }
            }
            AddressKind::Witness { version, program } => Script::witness_program(*version, program),
        }
    }

    pub fn network(&self) -> Network {
        if self.testnet {
            Network::Testnet
        } else {
            Network::Mainnet
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode().map_err(|_| fmt::Error)?)
    }
}

fn hash160_to_base58(version: u8, hash160: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(hash160);
    base58::check_encode(&payload)
}

/// Legacy pay-to-pubkey-hash address of a public key.
pub fn public_key_to_address(testnet: bool, public_key: &[u8]) -> String {
    let version = if testnet { ADDRESS_VERSION_P2PKH_TESTNET } else { ADDRESS_VERSION_P2PKH };
    hash160_to_base58(version, &sha256_ripemd160(public_key))
}

/// Native segwit pay-to-witness-key-hash address of a public key.
///
/// Segwit commits to compressed keys only; longer keys are rejected.
pub fn public_key_to_p2wpkh_address(testnet: bool, public_key: &[u8]) -> Result<String> {
    if public_key.len() > 33 {
        return Err(WalletError::UnsupportedType(
            "segwit addresses require a compressed public key".to_string(),
        ));
    }
    let hrp = if testnet { BECH32_HRP_TESTNET } else { BECH32_HRP };
    bech32::encode_segwit_address(hrp, 0, &sha256_ripemd160(public_key))
}

/// P2SH-wrapped segwit address: Base58Check of the hash of the serialized
/// version-0 witness program.
pub fn public_key_to_p2sh_p2wpkh_address(testnet: bool, public_key: &[u8]) -> Result<String> {
    if public_key.len() > 33 {
        return Err(WalletError::UnsupportedType(
            "segwit addresses require a compressed public key".to_string(),
        ));
    }
    let redeem = Script::v0_keyhash(&sha256_ripemd160(public_key));
    let version = if testnet { ADDRESS_VERSION_P2SH_TESTNET } else { ADDRESS_VERSION_P2SH };
    Ok(hash160_to_base58(version, &sha256_ripemd160(redeem.bytes())))
}
