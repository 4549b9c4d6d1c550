//! Transaction construction: input classification, fee computation,
//! signing and the post-build self-verification

use secp256k1::{Message, Secp256k1, SecretKey};

use crate::address::Address;
use crate::constants::*;
use crate::error::{Result, WalletError};
use crate::keys::PrivateKey;
use crate::script::{self, push_data, Script, ScriptKind};
use crate::transaction::{bip143_sighash, legacy_sighash};
use crate::types::{ByteString, Transaction, TransactionInput, TransactionOutput, UnspentOutputInfo};

/// Fee configuration supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    /// Satoshis per 1000 estimated bytes
    pub fee_per_kb: i64,
    /// Flat amount added on top
    pub extra_fee: i64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        FeePolicy { fee_per_kb: MIN_FEE_PER_KB, extra_fee: 0 }
    }
}

// How an unspent output will be spent by the given key. The P2SH wrapped
// form is only recognizable here, where the redeem script is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpendKind {
    Legacy,
    WitnessKeyHash,
    WrappedWitnessKeyHash,
}

fn classify_spend(prev_script: &Script, key: &PrivateKey) -> Result<SpendKind> {
    let key_hash = key.public_key_hash();
    match prev_script.kind() {
        ScriptKind::PayToPubkeyHash => {
            if prev_script.hash160_payload() != Some(key_hash) {
                return Err(WalletError::UnsupportedType(
                    "unspent output pays a different key".to_string(),
                ));
            }
            Ok(SpendKind::Legacy)
        }
        ScriptKind::WitnessKeyHash => {
            if !key.compressed() {
                return Err(WalletError::UnsupportedType(
                    "segwit outputs require a compressed key".to_string(),
                ));
            }
            if prev_script.hash160_payload() != Some(key_hash) {
                return Err(WalletError::UnsupportedType(
                    "unspent output pays a different key".to_string(),
                ));
            }
            Ok(SpendKind::WitnessKeyHash)
        }
        ScriptKind::PayToScriptHash => {
            if !key.compressed() {
                return Err(WalletError::UnsupportedType(
                    "segwit outputs require a compressed key".to_string(),
                ));
            }
            let redeem = Script::v0_keyhash(&key_hash);
            let redeem_hash = crate::hashes::sha256_ripemd160(redeem.bytes());
            if prev_script.hash160_payload() != Some(redeem_hash) {
                return Err(WalletError::UnsupportedType(
                    "script-hash output does not wrap this key".to_string(),
                ));
            }
            Ok(SpendKind::WrappedWitnessKeyHash)
        }
        ScriptKind::Nonstandard => Err(WalletError::UnsupportedType(
            "nonstandard unspent output script".to_string(),
        )),
    }
}

/// Keep only the candidate outputs this key can spend.
///
/// The raw-transaction input form supplies every output of the funding
/// transaction as a candidate; outputs paying other keys are dropped here.
pub fn filter_spendable(unspent: &[UnspentOutputInfo], key: &PrivateKey) -> Vec<UnspentOutputInfo> {
    unspent
        .iter()
        .filter(|output| classify_spend(&output.script, key).is_ok())
        .cloned()
        .collect()
}

fn input_size(kind: SpendKind, key: &PrivateKey) -> usize {
    match kind {
        SpendKind::Legacy => {
            if key.compressed() {
                INPUT_SIZE_P2PKH
            } else {
                INPUT_SIZE_P2PKH_UNCOMPRESSED
            }
        }
        SpendKind::WitnessKeyHash => INPUT_SIZE_P2WPKH,
        SpendKind::WrappedWitnessKeyHash => INPUT_SIZE_P2SH_P2WPKH,
    }
}

fn estimated_size(spends: &[SpendKind], key: &PrivateKey, output_count: usize) -> usize {
    TX_OVERHEAD_SIZE
        + spends.iter().map(|&s| input_size(s, key)).sum::<usize>()
        + output_count * OUTPUT_SIZE
}

fn fee_for_size(policy: &FeePolicy, size: usize) -> i64 {
    policy.fee_per_kb * ((size as i64 + 999) / 1000) + policy.extra_fee
}

fn sign_digest(key: &PrivateKey, digest: &[u8; 32]) -> Result<ByteString> {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(digest)
        .map_err(|_| WalletError::ScriptInvalid("sighash is not 32 bytes".to_string()))?;
    let secret = SecretKey::from_slice(&key.secret_bytes())
        .map_err(|_| WalletError::ScriptInvalid("invalid signing key".to_string()))?;
    // libsecp256k1 produces canonical low-S signatures.
    let signature = secp.sign_ecdsa(&message, &secret);
    let mut bytes = signature.serialize_der().to_vec();
    bytes.push(SIGHASH_ALL as u8);
    Ok(bytes)
}

/// Build, sign and verify a transaction spending all supplied unspent
/// outputs with the given key.
///
/// `amount` of `None` sends everything minus fee to the destination in a
/// single output. Otherwise the destination output comes first, and change
/// above the dust threshold returns to `change`; dust-level change is
/// surrendered to the fee.
///
/// The result has passed `verify_all_inputs` against the supplied outputs;
/// a verification failure aborts the build instead of returning a
/// questionable transaction.
pub fn create_transaction(
    unspent: &[UnspentOutputInfo],
    destination: &Address,
    change: &Address,
    amount: Option<i64>,
    fee: &FeePolicy,
    key: &PrivateKey,
) -> Result<Transaction> {
    if unspent.is_empty() {
        return Err(WalletError::BadFormat("no unspent outputs supplied".to_string()));
    }

    let mut total_input = 0i64;
    let mut spends = Vec::with_capacity(unspent.len());
    for output in unspent {
        if output.value < 0 || output.value > MAX_MONEY {
            return Err(WalletError::BadFormat(format!(
                "unspent output value {} out of range",
                output.value
            )));
        }
        spends.push(classify_spend(&output.script, key)?);
        total_input += output.value;
    }

    // Work out the output list and the exact fee.
    let mut outputs = Vec::with_capacity(2);
    match amount {
        None => {
            let fee_total = fee_for_size(fee, estimated_size(&spends, key, 1));
            let send = total_input - fee_total;
            if send <= DUST_THRESHOLD {
                return Err(WalletError::InsufficientFunds(format!(
                    "{} satoshis cannot cover the {} satoshi fee",
                    total_input, fee_total
                )));
            }
            outputs.push(TransactionOutput {
                value: send,
                script_pubkey: destination.script_pubkey(),
            });
        }
        Some(send) => {
            if send <= 0 {
                return Err(WalletError::BadFormat(format!(
                    "send amount {} must be positive",
                    send
                )));
            }
            let fee_with_change = fee_for_size(fee, estimated_size(&spends, key, 2));
            let change_value = total_input - send - fee_with_change;
            if change_value > DUST_THRESHOLD {
                outputs.push(TransactionOutput {
                    value: send,
                    script_pubkey: destination.script_pubkey(),
                });
                outputs.push(TransactionOutput {
                    value: change_value,
                    script_pubkey: change.script_pubkey(),
                });
            } else {
                // No change output: whatever remains above the plain fee is
                // surrendered to the miners.
                let fee_total = fee_for_size(fee, estimated_size(&spends, key, 1));
                if total_input - send - fee_total < 0 {
                    return Err(WalletError::InsufficientFunds(format!(
                        "{} satoshis cannot cover {} plus the {} satoshi fee",
                        total_input, send, fee_total
                    )));
                }
                outputs.push(TransactionOutput {
                    value: send,
                    script_pubkey: destination.script_pubkey(),
                });
            }
        }
    }

    let inputs = unspent
        .iter()
        .map(|output| TransactionInput {
            outpoint: output.outpoint.clone(),
            script_sig: vec![],
            witness: vec![],
            sequence: SEQUENCE_FINAL,
        })
        .collect();

    let mut tx = Transaction {
        version: 1,
        inputs,
        outputs,
        lock_time: 0,
    };

    let public_key = key.public_key();
    let key_hash = key.public_key_hash();
    for i in 0..tx.inputs.len() {
        match spends[i] {
            SpendKind::Legacy => {
                let digest = legacy_sighash(&tx, i, unspent[i].script.bytes(), SIGHASH_ALL);
                let signature = sign_digest(key, &digest)?;
                let mut script_sig = Vec::with_capacity(signature.len() + public_key.len() + 2);
                push_data(&mut script_sig, &signature);
                push_data(&mut script_sig, &public_key);
                tx.inputs[i].script_sig = script_sig;
            }
            SpendKind::WitnessKeyHash | SpendKind::WrappedWitnessKeyHash => {
                let script_code = Script::p2pkh(&key_hash);
                let digest =
                    bip143_sighash(&tx, i, script_code.bytes(), unspent[i].value, SIGHASH_ALL);
                let signature = sign_digest(key, &digest)?;
                tx.inputs[i].witness = vec![signature, public_key.clone()];
                if spends[i] == SpendKind::WrappedWitnessKeyHash {
                    let redeem = Script::v0_keyhash(&key_hash);
                    let mut script_sig = Vec::with_capacity(redeem.bytes().len() + 1);
                    push_data(&mut script_sig, redeem.bytes());
                    tx.inputs[i].script_sig = script_sig;
                }
            }
        }
    }

    // Self-check: every input must satisfy its spending condition before
    // the transaction leaves the engine.
    script::verify_all_inputs(&tx, unspent)?;

    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::sha256_ripemd160;
    use crate::keys::{parse_private_key, KeyMaterial};
    use crate::types::{Network, OutPoint};

    const WIF: &str = "L49guLBaJw8VSLnKGnMKVH5GjxTrkK4PBGc425yYwLqnU5cGpyxJ";
    const KEY_ADDRESS: &str = "1NKkKeTDWWi5LQQdrSS7hghnbhfYtWiWHs";
    const DESTINATION: &str = "1AyyaMAyo5sbC73kdUjgBK9h3jDMoXzkcP";

    fn test_key() -> PrivateKey {
        match parse_private_key(WIF, Network::Mainnet).unwrap() {
            KeyMaterial::Plain(key) => key,
            KeyMaterial::Encrypted(_) => panic!("expected a plain key"),
        }
    }

    fn unspent_for(script: Script, value: i64, n: u8) -> UnspentOutputInfo {
        UnspentOutputInfo {
            outpoint: OutPoint { hash: [n; 32], index: n as u32 },
            script,
            value,
            confirmations: 1,
        }
    }

    fn p2pkh_unspent(key: &PrivateKey, value: i64, n: u8) -> UnspentOutputInfo {
        unspent_for(Script::p2pkh(&key.public_key_hash()), value, n)
    }

    #[test]
    fn test_send_all_fee_is_exact() {
        let key = test_key();
        let unspent = vec![p2pkh_unspent(&key, 31_500_000, 1)];
        let destination = Address::decode(DESTINATION).unwrap();
        let change = Address::decode(KEY_ADDRESS).unwrap();
        let fee = FeePolicy { fee_per_kb: MIN_FEE_PER_KB, extra_fee: 7 };

        let tx = create_transaction(&unspent, &destination, &change, None, &fee, &key).unwrap();
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, 31_500_000 - (MIN_FEE_PER_KB + 7));
        assert_eq!(
            tx.outputs[0].script_pubkey,
            destination.script_pubkey()
        );
    }

    #[test]
    fn test_send_amount_with_change() {
        let key = test_key();
        let unspent = vec![p2pkh_unspent(&key, 31_500_000, 1)];
        let destination = Address::decode(DESTINATION).unwrap();
        let change = Address::decode(KEY_ADDRESS).unwrap();
        let fee = FeePolicy { fee_per_kb: MIN_FEE_PER_KB, extra_fee: 0 };

        let tx =
            create_transaction(&unspent, &destination, &change, Some(1_000_000), &fee, &key)
                .unwrap();
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].value, 1_000_000);
        assert_eq!(tx.outputs[1].value, 31_500_000 - 1_000_000 - MIN_FEE_PER_KB);
        assert_eq!(tx.outputs[1].script_pubkey, change.script_pubkey());
    }

    #[test]
    fn test_dust_change_goes_to_fee() {
        let key = test_key();
        let unspent = vec![p2pkh_unspent(&key, 31_500_000, 1)];
        let destination = Address::decode(DESTINATION).unwrap();
        let change = Address::decode(KEY_ADDRESS).unwrap();
        let fee = FeePolicy { fee_per_kb: MIN_FEE_PER_KB, extra_fee: 0 };

        // Leaves 300 satoshis above the single-output fee: below dust, so no
        // change output appears and the surplus is spent as fee.
        let send = 31_500_000 - MIN_FEE_PER_KB - 300;
        let tx =
            create_transaction(&unspent, &destination, &change, Some(send), &fee, &key).unwrap();
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, send);
    }

    #[test]
    fn test_insufficient_funds() {
        let key = test_key();
        let unspent = vec![p2pkh_unspent(&key, 5_000, 1)];
        let destination = Address::decode(DESTINATION).unwrap();
        let change = Address::decode(KEY_ADDRESS).unwrap();
        let fee = FeePolicy { fee_per_kb: MIN_FEE_PER_KB, extra_fee: 0 };

        assert!(matches!(
            create_transaction(&unspent, &destination, &change, None, &fee, &key),
            Err(WalletError::InsufficientFunds(_))
        ));
        assert!(matches!(
            create_transaction(&unspent, &destination, &change, Some(5_000), &fee, &key),
            Err(WalletError::InsufficientFunds(_))
        ));
    }

    #[test]
    fn test_multiple_inputs_all_signed() {
        let key = test_key();
        let unspent = vec![
            p2pkh_unspent(&key, 20_000_000, 1),
            p2pkh_unspent(&key, 11_500_000, 2),
        ];
        let destination = Address::decode(DESTINATION).unwrap();
        let change = Address::decode(KEY_ADDRESS).unwrap();
        let fee = FeePolicy::default();

        let tx = create_transaction(&unspent, &destination, &change, None, &fee, &key).unwrap();
        assert_eq!(tx.inputs.len(), 2);
        assert!(tx.inputs.iter().all(|input| !input.script_sig.is_empty()));
        assert_eq!(tx.outputs[0].value, 31_500_000 - MIN_FEE_PER_KB);
    }

    #[test]
    fn test_spend_p2wpkh_output() {
        let key = test_key();
        let unspent = vec![unspent_for(
            Script::v0_keyhash(&key.public_key_hash()),
            1_000_000,
            1,
        )];
        let destination = Address::decode(DESTINATION).unwrap();
        let change = Address::decode(KEY_ADDRESS).unwrap();

        let tx = create_transaction(&unspent, &destination, &change, None, &FeePolicy::default(), &key)
            .unwrap();
        assert!(tx.inputs[0].script_sig.is_empty());
        assert_eq!(tx.inputs[0].witness.len(), 2);
        assert!(tx.has_witness());
    }

    #[test]
    fn test_spend_wrapped_p2wpkh_output() {
        let key = test_key();
        let redeem = Script::v0_keyhash(&key.public_key_hash());
        let unspent = vec![unspent_for(
            Script::p2sh(&sha256_ripemd160(redeem.bytes())),
            1_000_000,
            1,
        )];
        let destination = Address::decode(DESTINATION).unwrap();
        let change = Address::decode(KEY_ADDRESS).unwrap();

        let tx = create_transaction(&unspent, &destination, &change, None, &FeePolicy::default(), &key)
            .unwrap();
        // Signature script holds exactly the redeem-script push.
        assert_eq!(tx.inputs[0].script_sig.len(), redeem.bytes().len() + 1);
        assert_eq!(tx.inputs[0].witness.len(), 2);
    }

    #[test]
    fn test_foreign_output_is_rejected() {
        let key = test_key();
        let unspent = vec![unspent_for(Script::p2pkh(&[9; 20]), 1_000_000, 1)];
        let destination = Address::decode(DESTINATION).unwrap();
        let change = Address::decode(KEY_ADDRESS).unwrap();

        assert!(matches!(
            create_transaction(&unspent, &destination, &change, None, &FeePolicy::default(), &key),
            Err(WalletError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_nonstandard_output_is_rejected() {
        let key = test_key();
        let unspent = vec![unspent_for(Script::new(vec![0x6a, 0x01, 0x00]), 1_000_000, 1)];
        let destination = Address::decode(DESTINATION).unwrap();
        let change = Address::decode(KEY_ADDRESS).unwrap();

        assert!(matches!(
            create_transaction(&unspent, &destination, &change, None, &FeePolicy::default(), &key),
            Err(WalletError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_zero_amount_is_rejected() {
        let key = test_key();
        let unspent = vec![p2pkh_unspent(&key, 1_000_000, 1)];
        let destination = Address::decode(DESTINATION).unwrap();
        let change = Address::decode(KEY_ADDRESS).unwrap();

        assert!(matches!(
            create_transaction(&unspent, &destination, &change, Some(0), &FeePolicy::default(), &key),
            Err(WalletError::BadFormat(_))
        ));
    }
}
