//! Signature hashing for legacy and witness v0 inputs.

use std::fmt;

use resync_consensus::Hash256;
use resync_primitives::encoding::{Encodable, Encoder};
use resync_primitives::hash::sha256d;
use resync_primitives::transaction::{Transaction, TxOut};

use crate::opcodes::OP_CODESEPARATOR;

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// Digest returned when legacy signing has nothing to commit to: an input
/// index past the inputs, or SIGHASH_SINGLE past the outputs.
pub const LEGACY_ONE_HASH: Hash256 = {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
};

const ZERO_HASH: Hash256 = [0u8; 32];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SighashType(pub u32);

impl SighashType {
    pub fn base_type(self) -> u32 {
        self.0 & 0x1f
    }

    pub fn has_anyone_can_pay(self) -> bool {
        self.0 & SIGHASH_ANYONECANPAY != 0
    }

    /// Whether the type is one of the six defined combinations.
    pub fn is_defined(self) -> bool {
        matches!(self.0 & !SIGHASH_ANYONECANPAY, SIGHASH_ALL..=SIGHASH_SINGLE)
    }

    fn outputs(self) -> Outputs {
        match self.base_type() {
            SIGHASH_NONE => Outputs::None,
            SIGHASH_SINGLE => Outputs::Single,
            _ => Outputs::All,
        }
    }
}

/// Which outputs a signature commits to.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Outputs {
    All,
    None,
    Single,
}

/// Which signature-hash discipline an input executes under.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SigVersion {
    Base,
    WitnessV0,
}

impl fmt::Display for SigVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SigVersion::Base => "base",
            SigVersion::WitnessV0 => "witness_v0",
        })
    }
}

pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    amount: i64,
    sighash_type: SighashType,
    sig_version: SigVersion,
) -> Hash256 {
    match sig_version {
        SigVersion::Base => legacy_signature_hash(tx, input_index, script_code, sighash_type),
        SigVersion::WitnessV0 => {
            witness_v0_signature_hash(tx, input_index, script_code, amount, sighash_type)
        }
    }
}

/// Double SHA-256 of whatever `write` serializes.
fn digest(write: impl FnOnce(&mut Encoder)) -> Hash256 {
    let mut encoder = Encoder::new();
    write(&mut encoder);
    sha256d(&encoder.into_inner())
}

/// Pre-segwit digest over a modified copy of the spending transaction.
pub fn legacy_signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    sighash_type: SighashType,
) -> Hash256 {
    let outputs = sighash_type.outputs();
    if input_index >= tx.vin.len()
        || (outputs == Outputs::Single && input_index >= tx.vout.len())
    {
        return LEGACY_ONE_HASH;
    }
    let script_code = strip_code_separators(script_code);
    let signed: Vec<usize> = if sighash_type.has_anyone_can_pay() {
        vec![input_index]
    } else {
        (0..tx.vin.len()).collect()
    };

    digest(|encoder| {
        encoder.write_i32_le(tx.version);

        encoder.write_varint(signed.len() as u64);
        for &idx in &signed {
            let input = &tx.vin[idx];
            input.prevout.consensus_encode(encoder);
            if idx == input_index {
                encoder.write_var_bytes(&script_code);
                encoder.write_u32_le(input.sequence);
            } else {
                encoder.write_varint(0);
                // NONE and SINGLE let other inputs update their sequence.
                let sequence = if outputs == Outputs::All { input.sequence } else { 0 };
                encoder.write_u32_le(sequence);
            }
        }

        match outputs {
            Outputs::All => {
                encoder.write_varint(tx.vout.len() as u64);
                tx.vout.iter().for_each(|out| out.consensus_encode(encoder));
            }
            Outputs::None => encoder.write_varint(0),
            Outputs::Single => {
                encoder.write_varint(input_index as u64 + 1);
                for _ in 0..input_index {
                    encoder.write_i64_le(-1);
                    encoder.write_varint(0);
                }
                tx.vout[input_index].consensus_encode(encoder);
            }
        }

        encoder.write_u32_le(tx.lock_time);
        encoder.write_u32_le(sighash_type.0);
    })
}

/// BIP143 digest. An out-of-range input index yields [`LEGACY_ONE_HASH`],
/// which never matches a real signature.
pub fn witness_v0_signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    amount: i64,
    sighash_type: SighashType,
) -> Hash256 {
    let Some(input) = tx.vin.get(input_index) else {
        return LEGACY_ONE_HASH;
    };
    let anyone_can_pay = sighash_type.has_anyone_can_pay();
    let outputs = sighash_type.outputs();

    let hash_prevouts = if anyone_can_pay {
        ZERO_HASH
    } else {
        digest(|encoder| {
            tx.vin
                .iter()
                .for_each(|input| input.prevout.consensus_encode(encoder))
        })
    };
    let hash_sequence = if anyone_can_pay || outputs != Outputs::All {
        ZERO_HASH
    } else {
        digest(|encoder| {
            tx.vin
                .iter()
                .for_each(|input| encoder.write_u32_le(input.sequence))
        })
    };
    let hash_outputs = match outputs {
        Outputs::All => outputs_digest(&tx.vout),
        Outputs::Single if input_index < tx.vout.len() => {
            outputs_digest(std::slice::from_ref(&tx.vout[input_index]))
        }
        _ => ZERO_HASH,
    };

    digest(|encoder| {
        encoder.write_i32_le(tx.version);
        encoder.write_hash_le(&hash_prevouts);
        encoder.write_hash_le(&hash_sequence);
        input.prevout.consensus_encode(encoder);
        encoder.write_var_bytes(script_code);
        encoder.write_i64_le(amount);
        encoder.write_u32_le(input.sequence);
        encoder.write_hash_le(&hash_outputs);
        encoder.write_u32_le(tx.lock_time);
        encoder.write_u32_le(sighash_type.0);
    })
}

fn outputs_digest(outputs: &[TxOut]) -> Hash256 {
    digest(|encoder| outputs.iter().for_each(|out| out.consensus_encode(encoder)))
}

/// Copy of `script` with every OP_CODESEPARATOR removed. A truncated push is
/// copied through verbatim.
fn strip_code_separators(script: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(script.len());
    let mut cursor = 0usize;
    while cursor < script.len() {
        let start = cursor;
        match crate::interpreter::next_op(script, &mut cursor) {
            Ok((OP_CODESEPARATOR, _)) => {}
            Ok(_) => out.extend_from_slice(&script[start..cursor]),
            Err(_) => {
                out.extend_from_slice(&script[start..]);
                break;
            }
        }
    }
    out
}
