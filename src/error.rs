//! Error types for key, address and transaction handling

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Bad format: {0}")]
    BadFormat(String),

    #[error("Wrong network: {0}")]
    WrongNetwork(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Script verification failed: {0}")]
    ScriptInvalid(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, WalletError>;
