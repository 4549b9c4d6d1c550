//! Wire serialization, transaction identity and signature hashes

use crate::error::{Result, WalletError};
use crate::hashes::double_sha256;
use crate::script::Script;
use crate::types::{ByteString, Hash, OutPoint, Transaction, TransactionInput, TransactionOutput};
use crate::util;

/// Append a variable-length integer in the 1/3/5/9-byte wire encoding.
pub fn write_var_int(buf: &mut ByteString, n: u64) {
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Wire length of a variable-length integer.
pub fn var_int_size(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

// Sequential reader over raw transaction bytes. Every read is bounds
// checked and fails with a format error instead of slicing out of range.
struct TxReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TxReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        TxReader { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(WalletError::BadFormat("transaction truncated".to_string()));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32_le(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i32_le(&mut self) -> Result<i32> {
        Ok(self.read_u32_le()? as i32)
    }

    fn read_i64_le(&mut self) -> Result<i64> {
        let b = self.read_bytes(8)?;
        Ok(i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    fn read_var_int(&mut self) -> Result<u64> {
        let first = self.read_u8()?;
        let value = match first {
            0xfd => {
                let b = self.read_bytes(2)?;
                u16::from_le_bytes([b[0], b[1]]) as u64
            }
            0xfe => {
                let b = self.read_bytes(4)?;
                u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as u64
            }
            0xff => {
                let b = self.read_bytes(8)?;
                u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            }
            n => n as u64,
        };
        Ok(value)
    }

    /// A count or length claiming more bytes than remain is malformed,
    /// not merely truncated; rejecting it here also bounds allocations.
    fn read_var_int_bounded(&mut self) -> Result<usize> {
        let value = self.read_var_int()?;
        if value > self.remaining() as u64 {
            return Err(WalletError::BadFormat(format!(
                "length {} exceeds remaining {} bytes",
                value,
                self.remaining()
            )));
        }
        Ok(value as usize)
    }
}

fn write_outpoint(buf: &mut ByteString, outpoint: &OutPoint) {
    buf.extend_from_slice(&outpoint.hash);
    buf.extend_from_slice(&outpoint.index.to_le_bytes());
}

fn write_output(buf: &mut ByteString, output: &TransactionOutput) {
    buf.extend_from_slice(&output.value.to_le_bytes());
    write_var_int(buf, output.script_pubkey.bytes().len() as u64);
    buf.extend_from_slice(output.script_pubkey.bytes());
}

/// Serialize a transaction to the exact wire format.
///
/// The extended segwit layout (marker, flag, witness stacks) is selected
/// automatically when any input carries witness data.
pub fn serialize(tx: &Transaction) -> ByteString {
    serialize_with_witness(tx, tx.has_witness())
}

/// Serialize without witness data, the form hashed for the txid.
pub fn serialize_without_witness(tx: &Transaction) -> ByteString {
    serialize_with_witness(tx, false)
}

fn serialize_with_witness(tx: &Transaction, witness: bool) -> ByteString {
    let mut buf = Vec::new();
    buf.extend_from_slice(&tx.version.to_le_bytes());
    if witness {
        buf.push(0x00);
        buf.push(0x01);
    }
    write_var_int(&mut buf, tx.inputs.len() as u64);
    for input in &tx.inputs {
        write_outpoint(&mut buf, &input.outpoint);
        write_var_int(&mut buf, input.script_sig.len() as u64);
        buf.extend_from_slice(&input.script_sig);
        buf.extend_from_slice(&input.sequence.to_le_bytes());
    }
    write_var_int(&mut buf, tx.outputs.len() as u64);
    for output in &tx.outputs {
        write_output(&mut buf, output);
    }
    if witness {
        for input in &tx.inputs {
            write_var_int(&mut buf, input.witness.len() as u64);
            for item in &input.witness {
                write_var_int(&mut buf, item.len() as u64);
                buf.extend_from_slice(item);
            }
        }
    }
    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf
}

/// Deserialize a transaction from raw bytes.
///
/// Fails with a format error on truncation, counts or lengths exceeding the
/// remaining bytes, a witness flag with all-empty stacks, or trailing bytes.
pub fn deserialize(data: &[u8]) -> Result<Transaction> {
    let mut reader = TxReader::new(data);

    let version = reader.read_i32_le()?;

    // Segwit marker 0x00 + flag 0x01 between version and input count.
    let mut segwit = false;
    if reader.remaining() >= 2 && reader.data[reader.pos] == 0x00 {
        if reader.data[reader.pos + 1] != 0x01 {
            return Err(WalletError::BadFormat("invalid segwit flag".to_string()));
        }
        segwit = true;
        reader.pos += 2;
    }

    let input_count = reader.read_var_int_bounded()?;
    let mut inputs = Vec::with_capacity(input_count);
    for _ in 0..input_count {
        let mut hash: Hash = [0; 32];
        hash.copy_from_slice(reader.read_bytes(32)?);
        let index = reader.read_u32_le()?;
        let script_len = reader.read_var_int_bounded()?;
        let script_sig = reader.read_bytes(script_len)?.to_vec();
        let sequence = reader.read_u32_le()?;
        inputs.push(TransactionInput {
            outpoint: OutPoint { hash, index },
            script_sig,
            witness: vec![],
            sequence,
        });
    }

    let output_count = reader.read_var_int_bounded()?;
    let mut outputs = Vec::with_capacity(output_count);
    for _ in 0..output_count {
        let value = reader.read_i64_le()?;
        let script_len = reader.read_var_int_bounded()?;
        let script_pubkey = Script::new(reader.read_bytes(script_len)?.to_vec());
        outputs.push(TransactionOutput { value, script_pubkey });
    }

    if segwit {
        let mut any_witness = false;
        for input in inputs.iter_mut() {
            let item_count = reader.read_var_int_bounded()?;
            let mut witness = Vec::with_capacity(item_count);
            for _ in 0..item_count {
                let item_len = reader.read_var_int_bounded()?;
                witness.push(reader.read_bytes(item_len)?.to_vec());
            }
            any_witness |= !witness.is_empty();
            input.witness = witness;
        }
        if !any_witness {
            return Err(WalletError::BadFormat(
                "witness flag present but no witness data".to_string(),
            ));
        }
    }

    let lock_time = reader.read_u32_le()?;

    if reader.remaining() != 0 {
        return Err(WalletError::BadFormat(format!(
            "{} trailing bytes after transaction",
            reader.remaining()
        )));
    }

    Ok(Transaction {
        version,
        inputs,
        outputs,
        lock_time,
    })
}

/// Transaction hash in internal byte order: double-SHA-256 of the
/// non-witness serialization.
pub fn txid(tx: &Transaction) -> Hash {
    double_sha256(&serialize_without_witness(tx))
}

/// Transaction id as displayed: the hash byte-reversed, hex encoded.
pub fn txid_hex(tx: &Transaction) -> String {
    util::to_hex(&util::reverse(&txid(tx)))
}

/// Legacy SIGHASH_ALL digest for signing input `input_index`.
///
/// Every other input's script is blanked, the subscript is installed on the
/// signed input and the 4-byte hashtype is appended before hashing twice.
/// `input_index` must be a valid index into `tx.inputs`.
pub fn legacy_sighash(tx: &Transaction, input_index: usize, subscript: &[u8], hashtype: u32) -> Hash {
    let mut buf = Vec::new();
    buf.extend_from_slice(&tx.version.to_le_bytes());
    write_var_int(&mut buf, tx.inputs.len() as u64);
    for (i, input) in tx.inputs.iter().enumerate() {
        write_outpoint(&mut buf, &input.outpoint);
        if i == input_index {
            write_var_int(&mut buf, subscript.len() as u64);
            buf.extend_from_slice(subscript);
        } else {
            write_var_int(&mut buf, 0);
        }
        buf.extend_from_slice(&input.sequence.to_le_bytes());
    }
    write_var_int(&mut buf, tx.outputs.len() as u64);
    for output in &tx.outputs {
        write_output(&mut buf, output);
    }
    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf.extend_from_slice(&hashtype.to_le_bytes());
    double_sha256(&buf)
}

/// BIP-143 digest for signing segwit input `input_index` spending `value`
/// satoshis with the given script code.
///
/// `input_index` must be a valid index into `tx.inputs`.
pub fn bip143_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    value: i64,
    hashtype: u32,
) -> Hash {
    let mut prevouts = Vec::new();
    for input in &tx.inputs {
        write_outpoint(&mut prevouts, &input.outpoint);
    }
    let hash_prevouts = double_sha256(&prevouts);

    let mut sequences = Vec::new();
    for input in &tx.inputs {
        sequences.extend_from_slice(&input.sequence.to_le_bytes());
    }
    let hash_sequences = double_sha256(&sequences);

    let mut outs = Vec::new();
    for output in &tx.outputs {
        write_output(&mut outs, output);
    }
    let hash_outputs = double_sha256(&outs);

    let input = &tx.inputs[input_index];
    let mut buf = Vec::new();
    buf.extend_from_slice(&tx.version.to_le_bytes());
    buf.extend_from_slice(&hash_prevouts);
    buf.extend_from_slice(&hash_sequences);
    write_outpoint(&mut buf, &input.outpoint);
    write_var_int(&mut buf, script_code.len() as u64);
    buf.extend_from_slice(script_code);
    buf.extend_from_slice(&value.to_le_bytes());
    buf.extend_from_slice(&input.sequence.to_le_bytes());
    buf.extend_from_slice(&hash_outputs);
    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf.extend_from_slice(&hashtype.to_le_bytes());
    double_sha256(&buf)
}
