//! Core wallet value types

use serde::{Deserialize, Serialize};

use crate::script::Script;

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Which chain a key or address belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn is_testnet(self) -> bool {
        self == Network::Testnet
    }
}

/// Reference to a specific output of a previous transaction.
///
/// The hash is kept in internal byte order (the raw double-SHA-256 of the
/// funding transaction); it is reversed only for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

/// Transaction input: outpoint + signature script + witness stack + sequence.
///
/// An empty witness stack means the input carries no witness data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub outpoint: OutPoint,
    pub script_sig: ByteString,
    pub witness: Vec<ByteString>,
    pub sequence: u32,
}

impl TransactionInput {
    pub fn has_witness(&self) -> bool {
        !self.witness.is_empty()
    }
}

/// Transaction output: satoshi value + spending condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: i64,
    pub script_pubkey: Script,
}

/// A complete transaction in the binary wire model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// True if any input carries witness data, selecting the extended
    /// segwit wire layout on serialization.
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(TransactionInput::has_witness)
    }
}

/// Caller-supplied description of a spendable output.
///
/// `confirmations` is -1 when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutputInfo {
    pub outpoint: OutPoint,
    pub script: Script,
    pub value: i64,
    pub confirmations: i64,
}
