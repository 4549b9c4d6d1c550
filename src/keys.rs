//! Private-key material: mini keys, WIF and BIP38 detection, generation

use secp256k1::rand::{thread_rng, Rng};
use secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::base58;
use crate::bip38::EncryptedPrivateKey;
use crate::constants::{WIF_VERSION, WIF_VERSION_TESTNET};
use crate::error::{Result, WalletError};
use crate::hashes::{sha256, sha256_ripemd160};
use crate::types::{ByteString, Network};

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Lengths a mini private key may have, including the leading 'S'.
const MINI_KEY_LENGTHS: [usize; 3] = [22, 26, 30];

/// A validated private key: 32-byte secret plus the compression flag of the
/// public key it stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivateKey {
    key: SecretKey,
    compressed: bool,
    network: Network,
}

impl PrivateKey {
    pub fn new(secret: &[u8; 32], compressed: bool, network: Network) -> Result<Self> {
        let key = SecretKey::from_slice(secret)
            .map_err(|_| WalletError::BadFormat("secret is not a valid curve scalar".to_string()))?;
        Ok(PrivateKey { key, compressed, network })
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.key.secret_bytes()
    }

    pub fn compressed(&self) -> bool {
        self.compressed
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Serialized public key: 33 bytes compressed or 65 uncompressed.
    pub fn public_key(&self) -> ByteString {
        let secp = Secp256k1::new();
        let pubkey = PublicKey::from_secret_key(&secp, &self.key);
        if self.compressed {
            pubkey.serialize().to_vec()
        } else {
            pubkey.serialize_uncompressed().to_vec()
        }
    }

    /// hash160 of the serialized public key.
    pub fn public_key_hash(&self) -> [u8; 20] {
        sha256_ripemd160(&self.public_key())
    }

    /// Encode as Wallet Import Format.
    pub fn to_wif(&self) -> String {
        let version = match self.network {
            Network::Mainnet => WIF_VERSION,
            Network::Testnet => WIF_VERSION_TESTNET,
        };
        let mut payload = Vec::with_capacity(34);
        payload.push(version);
        payload.extend_from_slice(&self.secret_bytes());
        if self.compressed {
            payload.push(0x01);
        }
        base58::check_encode(&payload)
    }
}

/// Outcome of interpreting a private-key string: either a usable key, or a
/// BIP38 payload still awaiting its passphrase.
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    Plain(PrivateKey),
    Encrypted(EncryptedPrivateKey),
}

/// Display format for generated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Mini,
    WifCompressed,
    WifUncompressed,
}

fn is_mini_key_candidate(input: &str) -> bool {
    input.starts_with('S')
        && MINI_KEY_LENGTHS.contains(&input.len())
        && input.bytes().all(|b| BASE58_ALPHABET.contains(&b))
}

/// The standard mini-key typo check: SHA-256 of the key with '?' appended
/// must start with a zero byte.
fn mini_key_is_well_formed(input: &str) -> bool {
    let mut probe = input.as_bytes().to_vec();
    probe.push(b'?');
    sha256(&probe)[0] == 0x00
}

/// Interpret a user-supplied string as one of the three key grammars:
/// mini key, WIF, or BIP38-encrypted key, tried in that order.
///
/// The parser is stateless; an incomplete key is simply a format error and
/// the caller re-validates as the user types.
pub fn parse_private_key(input: &str, network: Network) -> Result<KeyMaterial> {
    let input = input.trim();
    if input.is_empty() {
        return Err(WalletError::BadFormat("empty private key".to_string()));
    }

    if is_mini_key_candidate(input) {
        if !mini_key_is_well_formed(input) {
            return Err(WalletError::BadFormat("mini key failed its typo check".to_string()));
        }
        let secret = sha256(input.as_bytes());
        return Ok(KeyMaterial::Plain(PrivateKey::new(&secret, false, network)?));
    }

    let payload = base58::check_decode(input)?;
    match payload.len() {
        // WIF: version + secret, optionally a compression marker.
        33 | 34 => {
            let expected_version = match network {
                Network::Mainnet => WIF_VERSION,
                Network::Testnet => WIF_VERSION_TESTNET,
            };
            if payload[0] != expected_version {
                if payload[0] == WIF_VERSION || payload[0] == WIF_VERSION_TESTNET {
                    return Err(WalletError::WrongNetwork(format!(
                        "private key version 0x{:02x} belongs to the other network",
                        payload[0]
                    )));
                }
                return Err(WalletError::BadFormat(format!(
                    "unknown private key version 0x{:02x}",
                    payload[0]
                )));
            }
            let compressed = if payload.len() == 34 {
                if payload[33] != 0x01 {
                    return Err(WalletError::BadFormat(
                        "invalid compression marker in private key".to_string(),
                    ));
                }
                true
            } else {
                false
            };
            let mut secret = [0u8; 32];
            secret.copy_from_slice(&payload[1..33]);
            Ok(KeyMaterial::Plain(PrivateKey::new(&secret, compressed, network)?))
        }

        // BIP38: 0x0142 (passphrase only) or 0x0143 (EC multiply).
        39 if payload[0] == 0x01 && (payload[1] == 0x42 || payload[1] == 0x43) => {
            Ok(KeyMaterial::Encrypted(EncryptedPrivateKey::from_payload(&payload, network)?))
        }

        n => Err(WalletError::BadFormat(format!(
            "unrecognized private key payload of {} bytes",
            n
        ))),
    }
}

/// Generate a fresh random key in the requested display format.
///
/// Returns the encoded string together with the parsed key.
pub fn generate(format: KeyFormat, network: Network) -> Result<(String, PrivateKey)> {
    match format {
        KeyFormat::Mini => {
            let mut rng = thread_rng();
            loop {
                let mut candidate = String::with_capacity(30);
                candidate.push('S');
                for _ in 0..29 {
                    let idx = rng.gen_range(0..BASE58_ALPHABET.len());
                    candidate.push(BASE58_ALPHABET[idx] as char);
                }
                if !mini_key_is_well_formed(&candidate) {
                    continue;
                }
                let secret = sha256(candidate.as_bytes());
                if let Ok(key) = PrivateKey::new(&secret, false, network) {
                    return Ok((candidate, key));
                }
            }
        }
        KeyFormat::WifCompressed | KeyFormat::WifUncompressed => {
            let secret = SecretKey::new(&mut thread_rng());
            let key = PrivateKey::new(
                &secret.secret_bytes(),
                format == KeyFormat::WifCompressed,
                network,
            )?;
            Ok((key.to_wif(), key))
        }
    }
}
