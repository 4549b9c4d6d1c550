//! Bech32 encoding of segregated-witness addresses (BIP-173)

use crate::error::{Result, WalletError};
use crate::types::ByteString;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

const GENERATOR: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];

/// Checksum constant of the original bech32 variant (witness version 0)
const BECH32_CONST: u32 = 1;

/// Checksum constant of the bech32m variant (witness versions 1-16)
const BECH32M_CONST: u32 = 0x2bc830a3;

fn polymod(values: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for &value in values {
        let top = (chk >> 25) as u8;
        chk = ((chk & 0x01ff_ffff) << 5) ^ (value as u32);
        for (i, gen) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 != 0 {
                chk ^= gen;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(hrp.len() * 2 + 1);
    for b in hrp.bytes() {
        out.push(b >> 5);
    }
    out.push(0);
    for b in hrp.bytes() {
        out.push(b & 0x1f);
    }
    out
}

fn checksum_constant(witness_version: u8) -> u32 {
    if witness_version == 0 {
        BECH32_CONST
    } else {
        BECH32M_CONST
    }
}

fn create_checksum(hrp: &str, data: &[u8], constant: u32) -> [u8; 6] {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0; 6]);
    let pm = polymod(&values) ^ constant;
    let mut out = [0u8; 6];
    for (i, item) in out.iter_mut().enumerate() {
        *item = ((pm >> (5 * (5 - i))) & 0x1f) as u8;
    }
    out
}

// Regroup bits between 8-bit bytes and 5-bit symbols. Encoding pads the
// final group; decoding requires the padding to be zero.
fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<ByteString> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max = (1u32 << to) - 1;
    let mut out = Vec::new();
    for &value in data {
        if (value as u32) >> from != 0 {
            return Err(WalletError::BadFormat("bech32 data value out of range".to_string()));
        }
        acc = (acc << from) | value as u32;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max) as u8);
        }
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max) != 0 {
        return Err(WalletError::BadFormat("invalid bech32 padding".to_string()));
    }
    Ok(out)
}

/// Encode a witness program as a segwit address for the given
/// human-readable part.
pub fn encode_segwit_address(hrp: &str, witness_version: u8, program: &[u8]) -> Result<String> {
    if witness_version > 16 {
        return Err(WalletError::BadFormat(format!(
            "witness version {} out of range",
            witness_version
        )));
    }
    if witness_version == 0 && program.len() != 20 && program.len() != 32 {
        return Err(WalletError::BadFormat(format!(
            "version-0 witness program must be 20 or 32 bytes, got {}",
            program.len()
        )));
    }
    if program.len() < 2 || program.len() > 40 {
        return Err(WalletError::BadFormat(format!(
            "witness program must be 2-40 bytes, got {}",
            program.len()
        )));
    }

    let mut data = vec![witness_version];
    data.extend(convert_bits(program, 8, 5, true)?);
    let checksum = create_checksum(hrp, &data, checksum_constant(witness_version));

    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + 6);
    out.push_str(hrp);
    out.push('1');
    for &value in data.iter().chain(checksum.iter()) {
        out.push(CHARSET[value as usize] as char);
    }
    Ok(out)
}

/// Decode a segwit address, verifying checksum, case consistency and the
/// witness-program constraints. Returns (witness version, program).
pub fn decode_segwit_address(expected_hrp: &str, address: &str) -> Result<(u8, ByteString)> {
    let has_lower = address.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = address.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(WalletError::BadFormat("bech32 string mixes upper and lower case".to_string()));
    }
    let address = address.to_ascii_lowercase();

    let sep = address
        .rfind('1')
        .ok_or_else(|| WalletError::BadFormat("bech32 separator missing".to_string()))?;
    if sep == 0 || sep + 7 > address.len() {
        return Err(WalletError::BadFormat("bech32 string too short".to_string()));
    }
    let hrp = &address[..sep];
    if hrp != expected_hrp {
        return Err(WalletError::BadFormat(format!(
            "unknown address prefix '{}'",
            hrp
        )));
    }

    let mut data = Vec::with_capacity(address.len() - sep - 1);
    for ch in address[sep + 1..].bytes() {
        let idx = CHARSET
            .iter()
            .position(|&c| c == ch)
            .ok_or_else(|| WalletError::BadFormat(format!("invalid bech32 character '{}'", ch as char)))?;
        data.push(idx as u8);
    }

    let mut values = hrp_expand(hrp);
    values.extend_from_slice(&data);
    let constant = polymod(&values);

    let payload = &data[..data.len() - 6];
    if payload.is_empty() {
        return Err(WalletError::BadFormat("empty witness payload".to_string()));
    }
    let witness_version = payload[0];
    if witness_version > 16 {
        return Err(WalletError::BadFormat(format!(
            "witness version {} out of range",
            witness_version
        )));
    }
    if constant != checksum_constant(witness_version) {
        return Err(WalletError::BadFormat("bech32 checksum mismatch".to_string()));
    }

    let program = convert_bits(&payload[1..], 5, 8, false)?;
    if program.len() < 2 || program.len() > 40 {
        return Err(WalletError::BadFormat(format!(
            "witness program must be 2-40 bytes, got {}",
            program.len()
        )));
    }
    if witness_version == 0 && program.len() != 20 && program.len() != 32 {
        return Err(WalletError::BadFormat(format!(
            "version-0 witness program must be 20 or 32 bytes, got {}",
            program.len()
        )));
    }

    Ok((witness_version, program))
}
