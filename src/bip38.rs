//! BIP38 passphrase-encrypted private keys
//!
//! Decryption is deliberately slow (scrypt with N=16384) and is the only
//! long-running operation in the crate; callers run it off latency-sensitive
//! contexts and may cancel it through the token. The scrypt/AES primitive is
//! injected so tests can substitute fast doubles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, KeyInit};
use aes::Aes256;
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};

use crate::address::public_key_to_address;
use crate::error::{Result, WalletError};
use crate::hashes::double_sha256;
use crate::keys::PrivateKey;
use crate::types::Network;

/// Compression bit of the BIP38 flag byte
const FLAG_COMPRESSED: u8 = 0x20;

/// Lot/sequence bit of the EC-multiply flag byte
const FLAG_LOT_SEQUENCE: u8 = 0x04;

/// Cooperative cancellation flag shared between the caller and a running
/// decryption.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// The externally-supplied slow-hash and block-cipher primitive BIP38
/// decryption is built on.
pub trait Bip38Crypto {
    fn scrypt(
        &self,
        passphrase: &[u8],
        salt: &[u8],
        log_n: u8,
        r: u32,
        p: u32,
        out: &mut [u8],
    ) -> Result<()>;

    fn aes256_decrypt(&self, key: &[u8; 32], block: &mut [u8; 16]);
}

/// Production implementation backed by the scrypt and aes crates.
#[derive(Debug, Default)]
pub struct StandardCrypto;

impl Bip38Crypto for StandardCrypto {
    fn scrypt(
        &self,
        passphrase: &[u8],
        salt: &[u8],
        log_n: u8,
        r: u32,
        p: u32,
        out: &mut [u8],
    ) -> Result<()> {
        let params = scrypt::Params::new(log_n, r, p, out.len())
            .map_err(|e| WalletError::DecryptionFailed(format!("scrypt parameters: {}", e)))?;
        scrypt::scrypt(passphrase, salt, &params, out)
            .map_err(|e| WalletError::DecryptionFailed(format!("scrypt: {}", e)))
    }

    fn aes256_decrypt(&self, key: &[u8; 32], block: &mut [u8; 16]) {
        let cipher = Aes256::new(GenericArray::from_slice(key));
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
}

/// A parsed BIP38 payload awaiting its passphrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPrivateKey {
    payload: [u8; 39],
    network: Network,
}

impl EncryptedPrivateKey {
    /// Accept a checksum-stripped Base58Check payload of 39 bytes beginning
    /// with the 0x0142 or 0x0143 prefix.
    pub fn from_payload(payload: &[u8], network: Network) -> Result<Self> {
        if payload.len() != 39 {
            return Err(WalletError::BadFormat(format!(
                "encrypted key payload must be 39 bytes, got {}",
                payload.len()
            )));
        }
        if payload[0] != 0x01 || (payload[1] != 0x42 && payload[1] != 0x43) {
            return Err(WalletError::BadFormat("not a BIP38 payload".to_string()));
        }
        let flags = payload[2];
        if payload[1] == 0x42 && flags & 0xc0 != 0xc0 {
            return Err(WalletError::BadFormat("invalid BIP38 flag byte".to_string()));
        }
        let mut bytes = [0u8; 39];
        bytes.copy_from_slice(payload);
        Ok(EncryptedPrivateKey { payload: bytes, network })
    }

    /// True for the EC-multiply (0x0143) variant.
    pub fn is_ec_multiply(&self) -> bool {
        self.payload[1] == 0x43
    }

    pub fn compressed(&self) -> bool {
        self.payload[2] & FLAG_COMPRESSED != 0
    }

    /// Decrypt with the standard scrypt/AES implementation.
    pub fn decrypt(&self, passphrase: &str, token: &CancellationToken) -> Result<PrivateKey> {
        self.decrypt_with(&StandardCrypto, passphrase, token)
    }

    /// Decrypt with an injected primitive. The token is checked between the
    /// expensive phases; a tripped token yields `Cancelled`.
    pub fn decrypt_with(
        &self,
        crypto: &impl Bip38Crypto,
        passphrase: &str,
        token: &CancellationToken,
    ) -> Result<PrivateKey> {
        if token.is_cancelled() {
            return Err(WalletError::Cancelled);
        }
        let key = if self.is_ec_multiply() {
            self.decrypt_ec_multiply(crypto, passphrase, token)?
        } else {
            self.decrypt_non_ec(crypto, passphrase, token)?
        };

        // The payload commits to the first four bytes of the double hash of
        // the resulting address; a mismatch means a wrong passphrase.
        let address = public_key_to_address(self.network.is_testnet(), &key.public_key());
        if double_sha256(address.as_bytes())[0..4] != self.payload[3..7] {
            return Err(WalletError::DecryptionFailed(
                "wrong passphrase or corrupted key".to_string(),
            ));
        }
        Ok(key)
    }

    fn decrypt_non_ec(
        &self,
        crypto: &impl Bip38Crypto,
        passphrase: &str,
        token: &CancellationToken,
    ) -> Result<PrivateKey> {
        let address_hash = &self.payload[3..7];

        let mut derived = [0u8; 64];
        crypto.scrypt(passphrase.as_bytes(), address_hash, 14, 8, 8, &mut derived)?;
        if token.is_cancelled() {
            return Err(WalletError::Cancelled);
        }

        let mut derived_key = [0u8; 32];
        derived_key.copy_from_slice(&derived[32..64]);

        let mut secret = [0u8; 32];
        for half in 0..2 {
            let mut block = [0u8; 16];
            block.copy_from_slice(&self.payload[7 + half * 16..23 + half * 16]);
            crypto.aes256_decrypt(&derived_key, &mut block);
            for (i, b) in block.iter().enumerate() {
                secret[half * 16 + i] = b ^ derived[half * 16 + i];
            }
        }

        PrivateKey::new(&secret, self.compressed(), self.network)
            .map_err(|_| WalletError::DecryptionFailed("decrypted secret is invalid".to_string()))
    }

    fn decrypt_ec_multiply(
        &self,
        crypto: &impl Bip38Crypto,
        passphrase: &str,
        token: &CancellationToken,
    ) -> Result<PrivateKey> {
        let flags = self.payload[2];
        let address_hash = &self.payload[3..7];
        let owner_entropy = &self.payload[7..15];
        let has_lot_sequence = flags & FLAG_LOT_SEQUENCE != 0;
        let owner_salt = if has_lot_sequence { &owner_entropy[0..4] } else { owner_entropy };

        let mut prefactor = [0u8; 32];
        crypto.scrypt(passphrase.as_bytes(), owner_salt, 14, 8, 8, &mut prefactor)?;
        if token.is_cancelled() {
            return Err(WalletError::Cancelled);
        }

        let passfactor = if has_lot_sequence {
            let mut joined = prefactor.to_vec();
            joined.extend_from_slice(owner_entropy);
            double_sha256(&joined)
        } else {
            prefactor
        };
        let passfactor_key = SecretKey::from_slice(&passfactor)
            .map_err(|_| WalletError::DecryptionFailed("invalid passfactor".to_string()))?;

        let secp = Secp256k1::new();
        let passpoint = PublicKey::from_secret_key(&secp, &passfactor_key).serialize();

        let mut salt = [0u8; 12];
        salt[0..4].copy_from_slice(address_hash);
        salt[4..12].copy_from_slice(owner_entropy);
        let mut derived = [0u8; 64];
        crypto.scrypt(&passpoint, &salt, 10, 1, 1, &mut derived)?;
        if token.is_cancelled() {
            return Err(WalletError::Cancelled);
        }

        let mut derived_key = [0u8; 32];
        derived_key.copy_from_slice(&derived[32..64]);

        // Part 2 decrypts to the tail of encrypted part 1 plus the tail of
        // seedb; part 1 then decrypts to the head of seedb.
        let mut part2 = [0u8; 16];
        part2.copy_from_slice(&self.payload[23..39]);
        crypto.aes256_decrypt(&derived_key, &mut part2);
        for (i, b) in part2.iter_mut().enumerate() {
            *b ^= derived[16 + i];
        }

        let mut part1 = [0u8; 16];
        part1[0..8].copy_from_slice(&self.payload[15..23]);
        part1[8..16].copy_from_slice(&part2[0..8]);
        crypto.aes256_decrypt(&derived_key, &mut part1);
        for (i, b) in part1.iter_mut().enumerate() {
            *b ^= derived[i];
        }

        let mut seedb = [0u8; 24];
        seedb[0..16].copy_from_slice(&part1);
        seedb[16..24].copy_from_slice(&part2[8..16]);
        let factorb = double_sha256(&seedb);

        let tweak = Scalar::from_be_bytes(factorb)
            .map_err(|_| WalletError::DecryptionFailed("invalid multiplication factor".to_string()))?;
        let secret = passfactor_key
            .mul_tweak(&tweak)
            .map_err(|_| WalletError::DecryptionFailed("key multiplication failed".to_string()))?;

        PrivateKey::new(&secret.secret_bytes(), self.compressed(), self.network)
            .map_err(|_| WalletError::DecryptionFailed("decrypted secret is invalid".to_string()))
    }
}
