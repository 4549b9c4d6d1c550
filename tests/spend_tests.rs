//! End-to-end spending tests: parse unspent outputs, build, verify

use txtools::keys::KeyMaterial;
use txtools::script::Script;
use txtools::{
    builder, hashes, script, transaction, FeePolicy, Network, PrivateKey, UnspentOutputInfo,
    WalletEngine, WalletError, MIN_FEE_PER_KB,
};

const WIF: &str = "L49guLBaJw8VSLnKGnMKVH5GjxTrkK4PBGc425yYwLqnU5cGpyxJ";
const DESTINATION: &str = "1AyyaMAyo5sbC73kdUjgBK9h3jDMoXzkcP";
const DESTINATION_2: &str = "18D5fLcryBDf8Vgov6JTd9Taj81gNekrex";

// The funding transaction: output 0 pays an unrelated key, output 1 pays
// 31,500,000 satoshis to the WIF key above.
const FUNDING_TX_HEX: &str = "0100000001ef9ea3e6b7a664ff910ed1177bfa81efa018df417fb1ee964b8165a05dc7ef5a000000008b4830450220385373efe509719e38cb63b86ca5d764be0f2bd2ffcfa03194978ca68488f57b0221009686e0b54d7831f9f06d36bfb81c5d2931a8ada079a3ff58c6109030ed0c4cd601410424161de67ec43e5bfd55f52d98d2a99a2131904b25aa08e70924d32ed44bfb4a71c94a7c4fdac886ca5bec7b7fac4209ab1443bc48ab6dec31656cd3e55b5dfcffffffff02707f0088000000001976a9143412c159747b9149e8f0726123e2939b68edb49e88ace0a6e001000000001976a914e9e64aae2d1e066db6c5ecb1a2781f418b18eef488ac00000000";

const UNSPENT_JSON: &str = r#"
    "unspent_outputs":[
        {
            "tx_hash":"088676b3e6cfb2f25e35f903b812ddae897ac922653c6ad6b74a188a08ffd253",
            "tx_output_n": 1,
            "script":"76a914e9e64aae2d1e066db6c5ecb1a2781f418b18eef488ac",
            "value": 31500000,
            "confirmations":0
        }
    ]
"#;

fn engine() -> WalletEngine {
    WalletEngine::new(Network::Mainnet)
}

fn test_key(engine: &WalletEngine) -> PrivateKey {
    match engine.parse_private_key(WIF).unwrap() {
        KeyMaterial::Plain(key) => key,
        KeyMaterial::Encrypted(_) => panic!("expected a plain key"),
    }
}

fn fee_of(tx: &txtools::Transaction, unspent: &[UnspentOutputInfo]) -> i64 {
    let in_value: i64 = tx
        .inputs
        .iter()
        .map(|input| {
            unspent
                .iter()
                .find(|u| u.outpoint == input.outpoint)
                .expect("input must reference a known unspent output")
                .value
        })
        .sum();
    let out_value: i64 = tx.outputs.iter().map(|o| o.value).sum();
    in_value - out_value
}

#[test]
fn test_build_from_raw_transaction_hex() {
    let engine = engine();
    let key = test_key(&engine);
    let extra_fee = 7;
    let fee = FeePolicy { fee_per_kb: MIN_FEE_PER_KB, extra_fee };

    let candidates = engine.parse_unspent_outputs(FUNDING_TX_HEX).unwrap();
    assert_eq!(candidates.len(), 2);

    let tx_hex = engine
        .create_transaction_hex(&candidates, DESTINATION, None, &fee, &key)
        .unwrap();

    // The spending transaction must deserialize back byte-for-byte and pass
    // verification against the candidate list.
    let tx = engine.verify_transaction_hex(&tx_hex, &candidates).unwrap();
    assert_eq!(hex::encode(transaction::serialize(&tx)), tx_hex);

    // Only the key's own output was selected; the fee is exact and the
    // whole balance minus fee lands in the first output.
    assert_eq!(tx.inputs.len(), 1);
    assert_eq!(fee_of(&tx, &candidates), MIN_FEE_PER_KB + extra_fee);
    assert_eq!(tx.outputs[0].value, 31_500_000 - MIN_FEE_PER_KB - extra_fee);
}

#[test]
fn test_build_from_json_document() {
    let engine = engine();
    let key = test_key(&engine);
    let extra_fee = 7;
    let fee = FeePolicy { fee_per_kb: MIN_FEE_PER_KB, extra_fee };

    let candidates = engine.parse_unspent_outputs(UNSPENT_JSON).unwrap();
    assert_eq!(candidates.len(), 1);

    let tx_hex = engine
        .create_transaction_hex(&candidates, DESTINATION_2, None, &fee, &key)
        .unwrap();
    let tx = engine.verify_transaction_hex(&tx_hex, &candidates).unwrap();

    assert_eq!(fee_of(&tx, &candidates), MIN_FEE_PER_KB + extra_fee);
    assert_eq!(tx.outputs[0].value, 31_500_000 - MIN_FEE_PER_KB - extra_fee);
    assert_eq!(
        tx.outputs[0].script_pubkey,
        engine.decode_address(DESTINATION_2).unwrap().script_pubkey()
    );
}

#[test]
fn test_raw_and_json_forms_agree() {
    let engine = engine();
    let from_raw = engine.parse_unspent_outputs(FUNDING_TX_HEX).unwrap();
    let from_json = engine.parse_unspent_outputs(UNSPENT_JSON).unwrap();
    // The JSON document describes output 1 of the same funding transaction.
    let raw_entry = &from_raw[1];
    let json_entry = &from_json[0];
    assert_eq!(raw_entry.outpoint, json_entry.outpoint);
    assert_eq!(raw_entry.script, json_entry.script);
    assert_eq!(raw_entry.value, json_entry.value);
}

#[test]
fn test_spend_segwit_output_end_to_end() {
    let engine = engine();
    // A compressed key is required for segwit spends.
    let key = match engine
        .parse_private_key("KwntMbt59tTsj8xqpqYqRRWufyjGunvhSyeMo3NTYpFYzZbXJ5Hp")
        .unwrap()
    {
        KeyMaterial::Plain(key) => key,
        KeyMaterial::Encrypted(_) => panic!("expected a plain key"),
    };

    let unspent = vec![UnspentOutputInfo {
        outpoint: txtools::OutPoint { hash: [0x11; 32], index: 0 },
        script: Script::v0_keyhash(&key.public_key_hash()),
        value: 2_000_000,
        confirmations: 3,
    }];
    let fee = FeePolicy::default();

    let tx_hex = engine
        .create_transaction_hex(&unspent, DESTINATION, None, &fee, &key)
        .unwrap();
    let tx = engine.verify_transaction_hex(&tx_hex, &unspent).unwrap();

    assert!(tx.has_witness());
    assert!(tx.inputs[0].script_sig.is_empty());
    assert_eq!(tx.inputs[0].witness.len(), 2);
    assert_eq!(fee_of(&tx, &unspent), MIN_FEE_PER_KB);
    // Byte-exact round trip holds for the extended layout too.
    assert_eq!(hex::encode(transaction::serialize(&tx)), tx_hex);
}

#[test]
fn test_spend_wrapped_segwit_output_end_to_end() {
    let engine = engine();
    let key = match engine
        .parse_private_key("KwntMbt59tTsj8xqpqYqRRWufyjGunvhSyeMo3NTYpFYzZbXJ5Hp")
        .unwrap()
    {
        KeyMaterial::Plain(key) => key,
        KeyMaterial::Encrypted(_) => panic!("expected a plain key"),
    };

    let redeem = Script::v0_keyhash(&key.public_key_hash());
    let unspent = vec![UnspentOutputInfo {
        outpoint: txtools::OutPoint { hash: [0x22; 32], index: 5 },
        script: Script::p2sh(&hashes::sha256_ripemd160(redeem.bytes())),
        value: 2_000_000,
        confirmations: 3,
    }];

    let tx_hex = engine
        .create_transaction_hex(&unspent, DESTINATION, None, &FeePolicy::default(), &key)
        .unwrap();
    let tx = engine.verify_transaction_hex(&tx_hex, &unspent).unwrap();

    assert!(tx.has_witness());
    assert!(!tx.inputs[0].script_sig.is_empty());
    assert_eq!(tx.inputs[0].witness.len(), 2);
}

#[test]
fn test_mixed_legacy_and_segwit_inputs() {
    let engine = engine();
    let key = match engine
        .parse_private_key("KwntMbt59tTsj8xqpqYqRRWufyjGunvhSyeMo3NTYpFYzZbXJ5Hp")
        .unwrap()
    {
        KeyMaterial::Plain(key) => key,
        KeyMaterial::Encrypted(_) => panic!("expected a plain key"),
    };

    let unspent = vec![
        UnspentOutputInfo {
            outpoint: txtools::OutPoint { hash: [0x31; 32], index: 0 },
            script: Script::p2pkh(&key.public_key_hash()),
            value: 1_500_000,
            confirmations: 1,
        },
        UnspentOutputInfo {
            outpoint: txtools::OutPoint { hash: [0x32; 32], index: 1 },
            script: Script::v0_keyhash(&key.public_key_hash()),
            value: 500_000,
            confirmations: 1,
        },
    ];

    let tx_hex = engine
        .create_transaction_hex(&unspent, DESTINATION, None, &FeePolicy::default(), &key)
        .unwrap();
    let tx = engine.verify_transaction_hex(&tx_hex, &unspent).unwrap();

    assert_eq!(tx.inputs.len(), 2);
    // Legacy input signed in the signature script, segwit input in the
    // witness; both verified.
    assert!(!tx.inputs[0].script_sig.is_empty());
    assert!(tx.inputs[0].witness.is_empty());
    assert!(tx.inputs[1].script_sig.is_empty());
    assert_eq!(tx.inputs[1].witness.len(), 2);
    assert_eq!(tx.outputs[0].value, 2_000_000 - MIN_FEE_PER_KB);
}

#[test]
fn test_tampered_signature_fails_verification() {
    let engine = engine();
    let key = test_key(&engine);
    let candidates = engine.parse_unspent_outputs(FUNDING_TX_HEX).unwrap();

    let tx_hex = engine
        .create_transaction_hex(&candidates, DESTINATION, None, &FeePolicy::default(), &key)
        .unwrap();
    let mut tx = transaction::deserialize(&hex::decode(&tx_hex).unwrap()).unwrap();

    // Flip one byte in the middle of the DER signature.
    let sig_len = tx.inputs[0].script_sig.len();
    tx.inputs[0].script_sig[sig_len / 2] ^= 0x01;

    assert!(matches!(
        script::verify_all_inputs(&tx, &candidates),
        Err(WalletError::ScriptInvalid(_))
    ));
}

#[test]
fn test_output_paying_wrong_key_fails_verification() {
    let engine = engine();
    let key = test_key(&engine);
    let candidates = engine.parse_unspent_outputs(FUNDING_TX_HEX).unwrap();

    let tx_hex = engine
        .create_transaction_hex(&candidates, DESTINATION, None, &FeePolicy::default(), &key)
        .unwrap();
    let tx = transaction::deserialize(&hex::decode(&tx_hex).unwrap()).unwrap();

    // Swap the previous output's script for one paying someone else.
    let mut forged = candidates.clone();
    forged[1].script = Script::p2pkh(&[0x42; 20]);
    assert!(matches!(
        script::verify_all_inputs(&tx, &forged),
        Err(WalletError::ScriptInvalid(_))
    ));
}

#[test]
fn test_key_without_spendable_outputs() {
    let engine = engine();
    // This key controls neither output of the funding transaction.
    let key = match engine
        .parse_private_key("KwntMbt59tTsj8xqpqYqRRWufyjGunvhSyeMo3NTYpFYzZbXJ5Hp")
        .unwrap()
    {
        KeyMaterial::Plain(key) => key,
        KeyMaterial::Encrypted(_) => panic!("expected a plain key"),
    };
    let candidates = engine.parse_unspent_outputs(FUNDING_TX_HEX).unwrap();
    assert!(builder::filter_spendable(&candidates, &key).is_empty());
    assert!(matches!(
        engine.create_transaction_hex(&candidates, DESTINATION, None, &FeePolicy::default(), &key),
        Err(WalletError::InsufficientFunds(_))
    ));
}

#[test]
fn test_fee_scales_with_estimated_size() {
    let engine = engine();
    let key = test_key(&engine);

    // 8 legacy inputs at 148 bytes each push the estimate past one
    // kilobyte, doubling the per-kb component.
    let unspent: Vec<UnspentOutputInfo> = (0..8)
        .map(|i| UnspentOutputInfo {
            outpoint: txtools::OutPoint { hash: [i as u8 + 1; 32], index: i },
            script: Script::p2pkh(&key.public_key_hash()),
            value: 10_000_000,
            confirmations: 1,
        })
        .collect();

    let tx_hex = engine
        .create_transaction_hex(&unspent, DESTINATION, None, &FeePolicy::default(), &key)
        .unwrap();
    let tx = engine.verify_transaction_hex(&tx_hex, &unspent).unwrap();
    assert_eq!(fee_of(&tx, &unspent), 2 * MIN_FEE_PER_KB);
}
