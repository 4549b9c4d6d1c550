//! Base58 and Base58Check encoding

use crate::error::{Result, WalletError};
use crate::hashes::double_sha256;
use crate::types::ByteString;

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

// Reverse lookup from ASCII byte to alphabet index, -1 for characters
// outside the alphabet.
const DIGIT_MAP: [i8; 128] = [
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1,  0,  1,  2,  3,  4,  5,  6,  7,  8, -1, -1, -1, -1, -1, -1,
    -1,  9, 10, 11, 12, 13, 14, 15, 16, -1, 17, 18, 19, 20, 21, -1,
    22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, -1, -1, -1, -1, -1,
    -1, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, -1, 44, 45, 46,
    47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, -1, -1, -1, -1, -1,
];

/// Encode bytes in plain base58. Leading zero bytes become leading '1's.
pub fn encode(data: &[u8]) -> String {
    let zeroes = data.iter().take_while(|&&b| b == 0).count();

    // Repeated divide-by-58 over a big-endian base-256 number.
    let mut digits: Vec<u8> = Vec::with_capacity(data.len() * 138 / 100 + 1);
    for &byte in &data[zeroes..] {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            let acc = (*digit as u32) * 256 + carry;
            *digit = (acc % 58) as u8;
            carry = acc / 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut out = String::with_capacity(zeroes + digits.len());
    for _ in 0..zeroes {
        out.push('1');
    }
    for &digit in digits.iter().rev() {
        out.push(ALPHABET[digit as usize] as char);
    }
    out
}

/// Decode a plain base58 string. Fails on any character outside the
/// Bitcoin alphabet.
pub fn decode(encoded: &str) -> Result<ByteString> {
    let bytes = encoded.as_bytes();
    let zeroes = bytes.iter().take_while(|&&b| b == b'1').count();

    let mut acc_bytes: Vec<u8> = Vec::with_capacity(encoded.len() * 733 / 1000 + 1);
    for &ch in &bytes[zeroes..] {
        let digit = if ch < 128 { DIGIT_MAP[ch as usize] } else { -1 };
        if digit < 0 {
            return Err(WalletError::BadFormat(format!(
                "invalid base58 character '{}'",
                ch as char
            )));
        }

        let mut carry = digit as u32;
        for b in acc_bytes.iter_mut() {
            let acc = (*b as u32) * 58 + carry;
            *b = (acc % 256) as u8;
            carry = acc / 256;
        }
        while carry > 0 {
            acc_bytes.push((carry % 256) as u8);
            carry /= 256;
        }
    }

    let mut out = vec![0u8; zeroes];
    out.extend(acc_bytes.iter().rev());
    Ok(out)
}

/// Encode a payload with its 4-byte double-SHA-256 checksum appended.
pub fn check_encode(payload: &[u8]) -> String {
    let mut data = payload.to_vec();
    data.extend_from_slice(&double_sha256(payload)[0..4]);
    encode(&data)
}

/// Decode a Base58Check string and verify its checksum. Returns the payload
/// with the checksum stripped.
///
/// Anything shorter than version + data + checksum (6 bytes) is rejected.
pub fn check_decode(encoded: &str) -> Result<ByteString> {
    let data = decode(encoded)?;
    if data.len() < 6 {
        return Err(WalletError::BadFormat(format!(
            "base58check payload too short: {} bytes",
            data.len()
        )));
    }
    let (payload, checksum) = data.split_at(data.len() - 4);
    if double_sha256(payload)[0..4] != *checksum {
        return Err(WalletError::BadFormat("base58check checksum mismatch".to_string()));
    }
    Ok(payload.to_vec())
}
