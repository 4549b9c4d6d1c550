//! Small byte-level helpers shared across modules

use crate::error::{Result, WalletError};
use crate::types::ByteString;

/// Decode a hex string, case-insensitively.
///
/// Odd length or a non-hex character is a format error.
pub fn from_hex(s: &str) -> Result<ByteString> {
    hex::decode(s.trim()).map_err(|e| WalletError::BadFormat(format!("invalid hex: {}", e)))
}

/// Encode bytes as lowercase hex.
pub fn to_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Reverse byte order, converting between internal and display order of
/// transaction hashes.
pub fn reverse(data: &[u8]) -> ByteString {
    data.iter().rev().copied().collect()
}
