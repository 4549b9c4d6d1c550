//! Parsing of caller-supplied unspent-output descriptions
//!
//! Two textual forms are accepted: the raw hex of the funding transaction
//! (every output becomes a candidate), or a JSON document with an
//! `unspent_outputs` array in the de-facto block-explorer shape.

use serde::Deserialize;

use crate::error::{Result, WalletError};
use crate::script::Script;
use crate::transaction;
use crate::types::{OutPoint, UnspentOutputInfo};
use crate::util;

#[derive(Deserialize)]
struct UnspentDocument {
    unspent_outputs: Vec<UnspentEntry>,
}

#[derive(Deserialize)]
struct UnspentEntry {
    tx_hash: String,
    tx_output_n: u32,
    script: String,
    value: i64,
    #[serde(default = "unknown_confirmations")]
    confirmations: i64,
}

fn unknown_confirmations() -> i64 {
    -1
}

/// Parse an unspent-output description in either accepted form.
pub fn parse_unspent_outputs(text: &str) -> Result<Vec<UnspentOutputInfo>> {
    // Pasted documents tend to carry non-breaking spaces.
    let cleaned = text.replace('\u{a0}', " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(WalletError::BadFormat("empty unspent output description".to_string()));
    }

    if let Ok(raw) = util::from_hex(cleaned) {
        return outputs_of_transaction(&raw);
    }
    parse_json_document(cleaned)
}

fn outputs_of_transaction(raw: &[u8]) -> Result<Vec<UnspentOutputInfo>> {
    let tx = transaction::deserialize(raw)?;
    let hash = transaction::txid(&tx);
    Ok(tx
        .outputs
        .into_iter()
        .enumerate()
        .map(|(index, output)| UnspentOutputInfo {
            outpoint: OutPoint { hash, index: index as u32 },
            script: output.script_pubkey,
            value: output.value,
            confirmations: -1,
        })
        .collect())
}

fn parse_json_document(text: &str) -> Result<Vec<UnspentOutputInfo>> {
    // Tolerate a pasted fragment missing its outer braces.
    let mut json = String::with_capacity(text.len() + 2);
    if !text.starts_with('{') {
        json.push('{');
    }
    json.push_str(text);
    if !text.ends_with('}') {
        json.push('}');
    }

    let document: UnspentDocument = serde_json::from_str(&json)
        .map_err(|e| WalletError::BadFormat(format!("invalid unspent outputs JSON: {}", e)))?;

    let mut outputs = Vec::with_capacity(document.unspent_outputs.len());
    for entry in document.unspent_outputs {
        let hash_bytes = util::from_hex(&entry.tx_hash)?;
        let hash: [u8; 32] = hash_bytes.try_into().map_err(|_| {
            WalletError::BadFormat("tx_hash must be 32 bytes of hex".to_string())
        })?;
        if entry.value < 0 {
            return Err(WalletError::BadFormat(format!(
                "negative output value {}",
                entry.value
            )));
        }
        outputs.push(UnspentOutputInfo {
            outpoint: OutPoint { hash, index: entry.tx_output_n },
            script: Script::new(util::from_hex(&entry.script)?),
            value: entry.value,
            confirmations: entry.confirmations,
        });
    }
    Ok(outputs)
}
