//! # txtools
//!
//! Bitcoin wallet primitives: private-key decoding (WIF, mini key, BIP38),
//! address encoding across legacy Base58Check and segwit bech32 forms, the
//! binary transaction model with byte-exact wire serialization, and a
//! transaction builder that re-verifies every input's script before handing
//! the result back.
//!
//! ## Design principles
//!
//! 1. **Pure functions**: the engine performs no I/O and keeps no state;
//!    every entity is immutable once constructed.
//! 2. **Byte-exact formats**: parsed transactions re-serialize to the exact
//!    original bytes, and address round trips are identity.
//! 3. **Typed failures**: all parsing and verification returns
//!    [`WalletError`] values instead of panicking.
//! 4. **Exact version pinning**: consensus-critical cryptography is pinned
//!    to exact dependency versions.
//!
//! The only long-running operation is BIP38 decryption (scrypt is slow by
//! design); it takes a [`CancellationToken`] and belongs off any
//! latency-sensitive thread.
//!
//! ## Usage
//!
//! ```rust
//! use txtools::{Network, WalletEngine};
//!
//! let engine = WalletEngine::new(Network::Mainnet);
//! let address = engine.decode_address("1NKkKeTDWWi5LQQdrSS7hghnbhfYtWiWHs").unwrap();
//! assert_eq!(address.to_string(), "1NKkKeTDWWi5LQQdrSS7hghnbhfYtWiWHs");
//! ```

pub mod address;
pub mod base58;
pub mod bech32;
pub mod bip38;
pub mod builder;
pub mod constants;
pub mod error;
pub mod hashes;
pub mod keys;
pub mod script;
pub mod transaction;
pub mod types;
pub mod unspent;
pub mod util;

// Re-export commonly used types
pub use address::{Address, AddressKind};
pub use bip38::{Bip38Crypto, CancellationToken, EncryptedPrivateKey, StandardCrypto};
pub use builder::FeePolicy;
pub use constants::*;
pub use error::{Result, WalletError};
pub use keys::{KeyFormat, KeyMaterial, PrivateKey};
pub use script::{Script, ScriptKind};
pub use types::*;

/// Address form to derive for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressForm {
    /// Legacy pay-to-pubkey-hash, Base58Check
    Legacy,
    /// Native segwit pay-to-witness-key-hash, bech32
    Segwit,
    /// P2SH-wrapped pay-to-witness-key-hash, Base58Check
    WrappedSegwit,
}

/// Engine facade bound to one network.
///
/// # Examples
///
/// ```
/// use txtools::{KeyMaterial, Network, WalletEngine};
///
/// let engine = WalletEngine::new(Network::Mainnet);
/// let material = engine
///     .parse_private_key("5Kb8kLf9zgWQnogidDA76MzPL6TsZZY36hWXMssSzNydYXYB9KF")
///     .unwrap();
/// let key = match material {
///     KeyMaterial::Plain(key) => key,
///     KeyMaterial::Encrypted(_) => unreachable!(),
/// };
/// assert_eq!(
///     engine.address_for_key(&key, txtools::AddressForm::Legacy).unwrap(),
///     "1CC3X2gu58d6wXUWMffpuzN9JAfTUWu4Kj"
/// );
/// ```
#[derive(Debug, Clone, Copy)]
pub struct WalletEngine {
    network: Network,
}

impl WalletEngine {
    pub fn new(network: Network) -> Self {
        WalletEngine { network }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Generate a fresh key in the requested display format.
    pub fn generate_key(&self, format: KeyFormat) -> Result<(String, PrivateKey)> {
        keys::generate(format, self.network)
    }

    /// Interpret a private-key string as mini key, WIF or BIP38 payload.
    pub fn parse_private_key(&self, input: &str) -> Result<KeyMaterial> {
        keys::parse_private_key(input, self.network)
    }

    /// Run BIP38 decryption. Slow by design; honor the token.
    pub fn decrypt_private_key(
        &self,
        encrypted: &EncryptedPrivateKey,
        passphrase: &str,
        token: &CancellationToken,
    ) -> Result<PrivateKey> {
        encrypted.decrypt(passphrase, token)
    }

    /// Parse an address string and require it to belong to this network.
    pub fn decode_address(&self, input: &str) -> Result<Address> {
        let address = Address::decode(input)?;
        if address.testnet != self.network.is_testnet() {
            return Err(WalletError::WrongNetwork(format!(
                "address {} belongs to the other network",
                input
            )));
        }
        Ok(address)
    }

    /// Derive the address of a key in the requested form.
    pub fn address_for_key(&self, key: &PrivateKey, form: AddressForm) -> Result<String> {
        let testnet = self.network.is_testnet();
        let public_key = key.public_key();
        match form {
            AddressForm::Legacy => Ok(address::public_key_to_address(testnet, &public_key)),
            AddressForm::Segwit => address::public_key_to_p2wpkh_address(testnet, &public_key),
            AddressForm::WrappedSegwit => {
                address::public_key_to_p2sh_p2wpkh_address(testnet, &public_key)
            }
        }
    }

    /// Parse an unspent-output description (raw transaction hex or JSON).
    pub fn parse_unspent_outputs(&self, text: &str) -> Result<Vec<UnspentOutputInfo>> {
        unspent::parse_unspent_outputs(text)
    }

    /// Build, sign and verify a spending transaction, returning raw hex.
    ///
    /// Candidate outputs the key cannot spend are dropped first, so the raw
    /// hex of a whole funding transaction works directly. Change returns to
    /// the key's own legacy address. `amount` of `None` sends everything
    /// minus fee.
    pub fn create_transaction_hex(
        &self,
        unspent: &[UnspentOutputInfo],
        destination: &str,
        amount: Option<i64>,
        fee: &FeePolicy,
        key: &PrivateKey,
    ) -> Result<String> {
        let spendable = builder::filter_spendable(unspent, key);
        if spendable.is_empty() {
            return Err(WalletError::InsufficientFunds(
                "none of the supplied outputs are spendable by this key".to_string(),
            ));
        }
        let destination = self.decode_address(destination)?;
        let change = self.decode_address(&address::public_key_to_address(
            self.network.is_testnet(),
            &key.public_key(),
        ))?;
        let tx = builder::create_transaction(&spendable, &destination, &change, amount, fee, key)?;
        Ok(util::to_hex(&transaction::serialize(&tx)))
    }

    /// Deserialize a raw transaction hex and verify every input against the
    /// supplied unspent outputs.
    pub fn verify_transaction_hex(
        &self,
        tx_hex: &str,
        unspent: &[UnspentOutputInfo],
    ) -> Result<Transaction> {
        let raw = util::from_hex(tx_hex)?;
        let tx = transaction::deserialize(&raw)?;
        script::verify_all_inputs(&tx, unspent)?;
        Ok(tx)
    }
}

impl Default for WalletEngine {
    fn default() -> Self {
        WalletEngine::new(Network::Mainnet)
    }
}
