//! Script model, standard-template classification and spend verification

use std::fmt;

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::*;
use crate::error::{Result, WalletError};
use crate::hashes::sha256_ripemd160;
use crate::transaction::{bip143_sighash, legacy_sighash};
use crate::types::{ByteString, Transaction, UnspentOutputInfo};
use crate::util;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

/// Spending-condition template of a script, derived from its byte layout.
///
/// A P2SH output wrapping a witness program is indistinguishable from any
/// other P2SH output by bytes alone; resolving the wrapped form requires the
/// redeem script and happens at signing/verification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    PayToPubkeyHash,
    PayToScriptHash,
    WitnessKeyHash,
    Nonstandard,
}

/// An output script: opaque bytes plus the classification computed once at
/// construction. The classification is a pure function of the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    bytes: ByteString,
    kind: ScriptKind,
}

impl Script {
    pub fn new(bytes: ByteString) -> Self {
        let kind = classify(&bytes);
        Script { bytes, kind }
    }

    /// OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG
    pub fn p2pkh(hash160: &[u8; 20]) -> Self {
        let mut bytes = Vec::with_capacity(25);
        bytes.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
        bytes.extend_from_slice(hash160);
        bytes.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Script::new(bytes)
    }

    /// OP_HASH160 <hash> OP_EQUAL
    pub fn p2sh(hash160: &[u8; 20]) -> Self {
        let mut bytes = Vec::with_capacity(23);
        bytes.extend_from_slice(&[OP_HASH160, 20]);
        bytes.extend_from_slice(hash160);
        bytes.push(OP_EQUAL);
        Script::new(bytes)
    }

    /// OP_0 <20-byte key hash>: the version-0 witness program script,
    /// also used verbatim as the P2SH redeem script when wrapped.
    pub fn v0_keyhash(hash160: &[u8; 20]) -> Self {
        let mut bytes = Vec::with_capacity(22);
        bytes.extend_from_slice(&[OP_0, 20]);
        bytes.extend_from_slice(hash160);
        Script::new(bytes)
    }

    /// Witness program script for an arbitrary version and program.
    pub fn witness_program(version: u8, program: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(2 + program.len());
        bytes.push(if version == 0 { OP_0 } else { 0x50 + version });
        bytes.push(program.len() as u8);
        bytes.extend_from_slice(program);
        Script::new(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> ByteString {
        self.bytes
    }

    pub fn kind(&self) -> ScriptKind {
        self.kind
    }

    /// The 20-byte hash embedded in a standard template, if any.
    pub fn hash160_payload(&self) -> Option<[u8; 20]> {
        let range = match self.kind {
            ScriptKind::PayToPubkeyHash => 3..23,
            ScriptKind::PayToScriptHash => 2..22,
            ScriptKind::WitnessKeyHash => 2..22,
            ScriptKind::Nonstandard => return None,
        };
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&self.bytes[range]);
        Some(hash)
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&util::to_hex(&self.bytes))
    }
}

// Scripts travel through the JSON interface as hex strings.
impl Serialize for Script {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&util::to_hex(&self.bytes))
    }
}

impl<'de> Deserialize<'de> for Script {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = util::from_hex(&s).map_err(D::Error::custom)?;
        Ok(Script::new(bytes))
    }
}

/// Classify a script by its byte pattern.
pub fn classify(bytes: &[u8]) -> ScriptKind {
    if bytes.len() == 25
        && bytes[0] == OP_DUP
        && bytes[1] == OP_HASH160
        && bytes[2] == 20
        && bytes[23] == OP_EQUALVERIFY
        && bytes[24] == OP_CHECKSIG
    {
        return ScriptKind::PayToPubkeyHash;
    }
    if bytes.len() == 23 && bytes[0] == OP_HASH160 && bytes[1] == 20 && bytes[22] == OP_EQUAL {
        return ScriptKind::PayToScriptHash;
    }
    if bytes.len() == 22 && bytes[0] == OP_0 && bytes[1] == 20 {
        return ScriptKind::WitnessKeyHash;
    }
    ScriptKind::Nonstandard
}

/// Append a minimally-encoded data push to a script under construction.
pub fn push_data(buf: &mut ByteString, data: &[u8]) {
    match data.len() {
        0 => buf.push(OP_0),
        1..=0x4b => {
            buf.push(data.len() as u8);
            buf.extend_from_slice(data);
        }
        0x4c..=0xff => {
            buf.push(OP_PUSHDATA1);
            buf.push(data.len() as u8);
            buf.extend_from_slice(data);
        }
        _ => {
            buf.push(OP_PUSHDATA2);
            buf.extend_from_slice(&(data.len() as u16).to_le_bytes());
            buf.extend_from_slice(data);
        }
    }
}

/// Signing context for OP_CHECKSIG in legacy script execution.
pub struct SigContext<'a> {
    pub tx: &'a Transaction,
    pub input_index: usize,
    pub script_code: &'a [u8],
}

fn stack_item_true(item: &[u8]) -> bool {
    item.iter().any(|&b| b != 0)
}

/// Execute a script over the given stack.
///
/// Returns Ok(true) when every operation succeeded, Ok(false) on a
/// deterministic failure (underflow, failed verify, bad signature) and an
/// error on structural violations (limits, truncated pushes).
pub fn eval_script(
    script: &[u8],
    stack: &mut Vec<ByteString>,
    ctx: Option<&SigContext>,
) -> Result<bool> {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(WalletError::ScriptInvalid(format!(
            "script exceeds {} bytes",
            MAX_SCRIPT_SIZE
        )));
    }

    let mut pc = 0usize;
    let mut op_count = 0usize;
    while pc < script.len() {
        let opcode = script[pc];
        pc += 1;

        if opcode <= OP_PUSHDATA4 {
            // Data push: the opcode itself, or a PUSHDATA length prefix.
            let len = match opcode {
                OP_0 => 0,
                1..=0x4b => opcode as usize,
                OP_PUSHDATA1 => {
                    let n = *script
                        .get(pc)
                        .ok_or_else(|| WalletError::ScriptInvalid("truncated push".to_string()))?
                        as usize;
                    pc += 1;
                    n
                }
                OP_PUSHDATA2 => {
                    let bytes = script
                        .get(pc..pc + 2)
                        .ok_or_else(|| WalletError::ScriptInvalid("truncated push".to_string()))?;
                    pc += 2;
                    u16::from_le_bytes([bytes[0], bytes[1]]) as usize
                }
                _ => {
                    let bytes = script
                        .get(pc..pc + 4)
                        .ok_or_else(|| WalletError::ScriptInvalid("truncated push".to_string()))?;
                    pc += 4;
                    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
                }
            };
            let data = script
                .get(pc..pc + len)
                .ok_or_else(|| WalletError::ScriptInvalid("push past end of script".to_string()))?;
            pc += len;
            stack.push(data.to_vec());
        } else {
            op_count += 1;
            if op_count > MAX_SCRIPT_OPS {
                return Err(WalletError::ScriptInvalid("operation limit exceeded".to_string()));
            }
            if !execute_opcode(opcode, stack, ctx)? {
                return Ok(false);
            }
        }

        if stack.len() > MAX_STACK_SIZE {
            return Err(WalletError::ScriptInvalid("stack overflow".to_string()));
        }
    }

    Ok(true)
}

/// Execute a single non-push opcode.
fn execute_opcode(opcode: u8, stack: &mut Vec<ByteString>, ctx: Option<&SigContext>) -> Result<bool> {
    match opcode {
        // OP_1 to OP_16
        0x51..=0x60 => {
            stack.push(vec![opcode - 0x50]);
            Ok(true)
        }

        OP_DUP => match stack.last().cloned() {
            Some(item) => {
                stack.push(item);
                Ok(true)
            }
            None => Ok(false),
        },

        OP_HASH160 => match stack.pop() {
            Some(item) => {
                stack.push(sha256_ripemd160(&item).to_vec());
                Ok(true)
            }
            None => Ok(false),
        },

        OP_EQUAL => {
            if stack.len() < 2 {
                return Ok(false);
            }
            let a = stack.pop().expect("checked length");
            let b = stack.pop().expect("checked length");
            stack.push(if a == b { vec![1] } else { vec![] });
            Ok(true)
        }

        OP_EQUALVERIFY => {
            if stack.len() < 2 {
                return Ok(false);
            }
            let a = stack.pop().expect("checked length");
            let b = stack.pop().expect("checked length");
            Ok(a == b)
        }

        OP_CHECKSIG => {
            if stack.len() < 2 {
                return Ok(false);
            }
            let pubkey = stack.pop().expect("checked length");
            let sig = stack.pop().expect("checked length");
            let valid = match ctx {
                Some(ctx) => {
                    let sighash = |hashtype: u32| {
                        legacy_sighash(ctx.tx, ctx.input_index, ctx.script_code, hashtype)
                    };
                    check_signature_with(&sig, &pubkey, sighash)?
                }
                None => false,
            };
            stack.push(if valid { vec![1] } else { vec![] });
            Ok(true)
        }

        // Anything else is outside the standard templates this engine
        // verifies.
        _ => Ok(false),
    }
}

/// Verify a signature-with-hashtype against a public key, where `sighash`
/// produces the digest for the trailing hashtype byte.
///
/// Only SIGHASH_ALL is accepted and the DER encoding must be canonical
/// low-S; anything else fails verification rather than erroring.
fn check_signature_with<F>(sig_with_type: &[u8], pubkey: &[u8], sighash: F) -> Result<bool>
where
    F: FnOnce(u32) -> [u8; 32],
{
    let (der, hashtype) = match sig_with_type.split_last() {
        Some((last, der)) => (der, *last as u32),
        None => return Ok(false),
    };
    if hashtype != SIGHASH_ALL {
        return Ok(false);
    }

    let signature = match Signature::from_der(der) {
        Ok(sig) => sig,
        Err(_) => return Ok(false),
    };
    let mut normalized = signature;
    normalized.normalize_s();
    if normalized.serialize_compact() != signature.serialize_compact() {
        // High-S signature: valid curve math, non-canonical encoding.
        return Ok(false);
    }

    let pubkey = match PublicKey::from_slice(pubkey) {
        Ok(pk) => pk,
        Err(_) => return Ok(false),
    };

    let digest = sighash(hashtype);
    let message = Message::from_digest_slice(&digest)
        .map_err(|_| WalletError::ScriptInvalid("sighash is not 32 bytes".to_string()))?;

    let secp = Secp256k1::verification_only();
    Ok(secp.verify_ecdsa(&message, &signature, &pubkey).is_ok())
}

/// Verify that input `index` of `tx` satisfies the spending condition of
/// `prev_script`, the script of the output it consumes.
pub fn verify_input_spend(
    tx: &Transaction,
    index: usize,
    prev_script: &Script,
    value: i64,
) -> Result<bool> {
    let input = tx
        .inputs
        .get(index)
        .ok_or_else(|| WalletError::ScriptInvalid(format!("no input at index {}", index)))?;

    match prev_script.kind() {
        ScriptKind::PayToPubkeyHash => {
            if input.has_witness() {
                return Ok(false);
            }
            let ctx = SigContext {
                tx,
                input_index: index,
                script_code: prev_script.bytes(),
            };
            let mut stack = Vec::new();
            if !eval_script(&input.script_sig, &mut stack, Some(&ctx))? {
                return Ok(false);
            }
            if !eval_script(prev_script.bytes(), &mut stack, Some(&ctx))? {
                return Ok(false);
            }
            Ok(stack.len() == 1 && stack_item_true(&stack[0]))
        }

        ScriptKind::WitnessKeyHash => {
            if !input.script_sig.is_empty() {
                return Ok(false);
            }
            let program = prev_script
                .hash160_payload()
                .ok_or_else(|| WalletError::ScriptInvalid("missing witness program".to_string()))?;
            verify_witness_keyhash(tx, index, &program, value)
        }

        ScriptKind::PayToScriptHash => {
            // The signature script must reduce to a single push of the
            // redeem script whose hash matches the output.
            let mut stack = Vec::new();
            if !eval_script(&input.script_sig, &mut stack, None)? {
                return Ok(false);
            }
            let redeem_bytes = match stack.len() {
                1 => stack.pop().expect("checked length"),
                _ => return Ok(false),
            };
            let expected = prev_script
                .hash160_payload()
                .ok_or_else(|| WalletError::ScriptInvalid("missing script hash".to_string()))?;
            if sha256_ripemd160(&redeem_bytes) != expected {
                return Ok(false);
            }
            let redeem = Script::new(redeem_bytes);
            match redeem.kind() {
                ScriptKind::WitnessKeyHash => {
                    let program = redeem.hash160_payload().ok_or_else(|| {
                        WalletError::ScriptInvalid("missing witness program".to_string())
                    })?;
                    verify_witness_keyhash(tx, index, &program, value)
                }
                _ => Err(WalletError::UnsupportedType(
                    "only P2SH-wrapped witness key hashes can be verified".to_string(),
                )),
            }
        }

        ScriptKind::Nonstandard => Err(WalletError::UnsupportedType(
            "nonstandard output script".to_string(),
        )),
    }
}

// The version-0 keyhash witness check: a two-element [signature, pubkey]
// stack, pubkey hashing to the program, signature over the BIP-143 digest
// with the P2PKH script code.
fn verify_witness_keyhash(
    tx: &Transaction,
    index: usize,
    program: &[u8; 20],
    value: i64,
) -> Result<bool> {
    let input = &tx.inputs[index];
    if input.witness.len() != 2 {
        return Ok(false);
    }
    let sig = &input.witness[0];
    let pubkey = &input.witness[1];
    if sha256_ripemd160(pubkey) != *program {
        return Ok(false);
    }
    let script_code = Script::p2pkh(program);
    check_signature_with(sig, pubkey, |hashtype| {
        bip143_sighash(tx, index, script_code.bytes(), value, hashtype)
    })
}

/// Re-verify every input of a built transaction against the unspent outputs
/// it consumes. Failure means the transaction must not be handed out.
pub fn verify_all_inputs(tx: &Transaction, unspent: &[UnspentOutputInfo]) -> Result<()> {
    for (i, input) in tx.inputs.iter().enumerate() {
        let prev = unspent
            .iter()
            .find(|u| u.outpoint == input.outpoint)
            .ok_or_else(|| {
                WalletError::BadFormat(format!("no unspent output found for input {}", i))
            })?;
        if !verify_input_spend(tx, i, &prev.script, prev.value)? {
            return Err(WalletError::ScriptInvalid(format!(
                "input {} does not satisfy its spending condition",
                i
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash20(n: u8) -> [u8; 20] {
        [n; 20]
    }

    #[test]
    fn test_classify_p2pkh() {
        let script = Script::p2pkh(&hash20(7));
        assert_eq!(script.kind(), ScriptKind::PayToPubkeyHash);
        assert_eq!(script.bytes().len(), 25);
        assert_eq!(script.hash160_payload(), Some(hash20(7)));
    }

    #[test]
    fn test_classify_p2sh() {
        let script = Script::p2sh(&hash20(9));
        assert_eq!(script.kind(), ScriptKind::PayToScriptHash);
        assert_eq!(script.bytes().len(), 23);
        assert_eq!(script.hash160_payload(), Some(hash20(9)));
    }

    #[test]
    fn test_classify_v0_keyhash() {
        let script = Script::v0_keyhash(&hash20(3));
        assert_eq!(script.kind(), ScriptKind::WitnessKeyHash);
        assert_eq!(script.bytes().len(), 22);
        assert_eq!(script.hash160_payload(), Some(hash20(3)));
    }

    #[test]
    fn test_classify_nonstandard() {
        for bytes in [vec![], vec![0x6a], vec![0x51, 0x87]] {
            assert_eq!(Script::new(bytes).kind(), ScriptKind::Nonstandard);
        }
        // Almost-P2PKH with a wrong trailing opcode.
        let mut bytes = Script::p2pkh(&hash20(1)).into_bytes();
        bytes[24] = OP_EQUAL;
        assert_eq!(Script::new(bytes).kind(), ScriptKind::Nonstandard);
    }

    #[test]
    fn test_classification_survives_serde() {
        let script = Script::p2pkh(&hash20(5));
        let json = serde_json::to_string(&script).unwrap();
        let back: Script = serde_json::from_str(&json).unwrap();
        assert_eq!(back, script);
        assert_eq!(back.kind(), ScriptKind::PayToPubkeyHash);
    }

    #[test]
    fn test_push_data_encodings() {
        let mut buf = Vec::new();
        push_data(&mut buf, &[]);
        assert_eq!(buf, vec![OP_0]);

        let mut buf = Vec::new();
        push_data(&mut buf, &[0xaa; 0x4b]);
        assert_eq!(buf[0], 0x4b);
        assert_eq!(buf.len(), 1 + 0x4b);

        let mut buf = Vec::new();
        push_data(&mut buf, &[0xaa; 0x4c]);
        assert_eq!(&buf[..2], &[OP_PUSHDATA1, 0x4c]);

        let mut buf = Vec::new();
        push_data(&mut buf, &[0xaa; 0x100]);
        assert_eq!(&buf[..3], &[OP_PUSHDATA2, 0x00, 0x01]);
    }

    #[test]
    fn test_eval_pushes_round_trip_through_stack() {
        let mut script = Vec::new();
        push_data(&mut script, &[1, 2, 3]);
        push_data(&mut script, &[4; 80]);

        let mut stack = Vec::new();
        assert!(eval_script(&script, &mut stack, None).unwrap());
        assert_eq!(stack, vec![vec![1, 2, 3], vec![4; 80]]);
    }

    #[test]
    fn test_eval_truncated_push_is_structural_error() {
        // Claims 5 bytes, provides 2.
        let script = vec![0x05, 0x01, 0x02];
        let mut stack = Vec::new();
        assert!(matches!(
            eval_script(&script, &mut stack, None),
            Err(WalletError::ScriptInvalid(_))
        ));
    }

    #[test]
    fn test_eval_hash160_and_equal() {
        let preimage = b"preimage".to_vec();
        let digest = sha256_ripemd160(&preimage);

        let mut script = Vec::new();
        push_data(&mut script, &preimage);
        script.push(OP_HASH160);
        push_data(&mut script, &digest);
        script.push(OP_EQUAL);

        let mut stack = Vec::new();
        assert!(eval_script(&script, &mut stack, None).unwrap());
        assert_eq!(stack.len(), 1);
        assert!(stack_item_true(&stack[0]));
    }

    #[test]
    fn test_eval_equalverify_failure() {
        let script = vec![0x51, 0x52, OP_EQUALVERIFY];
        let mut stack = Vec::new();
        assert!(!eval_script(&script, &mut stack, None).unwrap());
    }

    #[test]
    fn test_eval_dup_on_empty_stack_fails() {
        let mut stack = Vec::new();
        assert!(!eval_script(&[OP_DUP], &mut stack, None).unwrap());
    }

    #[test]
    fn test_eval_operation_limit() {
        let script = vec![0x51; MAX_SCRIPT_OPS + 1];
        let mut stack = Vec::new();
        assert!(matches!(
            eval_script(&script, &mut stack, None),
            Err(WalletError::ScriptInvalid(_))
        ));
    }

    #[test]
    fn test_checksig_without_context_fails_cleanly() {
        let mut script = Vec::new();
        push_data(&mut script, &[0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01, 0x01]);
        push_data(&mut script, &[0x02; 33]);
        script.push(OP_CHECKSIG);

        let mut stack = Vec::new();
        assert!(eval_script(&script, &mut stack, None).unwrap());
        assert_eq!(stack.len(), 1);
        assert!(!stack_item_true(&stack[0]));
    }
}
