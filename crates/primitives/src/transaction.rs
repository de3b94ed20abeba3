//! Transaction types and serialization, including the segregated witness form.

use resync_consensus::Hash256;

use crate::encoding::{
    prealloc, read_vec, write_vec, Decodable, DecodeError, Decoder, Encodable, Encoder,
};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;

/// Marker byte that replaces the empty input vector in witness serialization.
const WITNESS_MARKER: u8 = 0x00;
const WITNESS_FLAG: u8 = 0x01;

pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    /// Witness stack; empty for inputs without witness data.
    pub witness: Vec<Vec<u8>>,
}

impl TxIn {
    pub fn new(prevout: OutPoint, script_sig: Vec<u8>) -> Self {
        Self {
            prevout,
            script_sig,
            sequence: SEQUENCE_FINAL,
            witness: Vec::new(),
        }
    }
}

// The witness travels separately; see `Transaction::encode_into`.
impl Encodable for TxIn {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.prevout.consensus_encode(encoder);
        encoder.write_var_bytes(&self.script_sig);
        encoder.write_u32_le(self.sequence);
    }
}

impl Decodable for TxIn {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let prevout = OutPoint::consensus_decode(decoder)?;
        let script_sig = decoder.read_var_bytes()?;
        let sequence = decoder.read_u32_le()?;
        Ok(Self {
            prevout,
            script_sig,
            sequence,
            witness: Vec::new(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl Encodable for TxOut {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let value = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    pub fn has_witness(&self) -> bool {
        self.vin.iter().any(|input| !input.witness.is_empty())
    }

    /// Full serialization; witness data is included when any input carries it.
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        self.encode_into(&mut encoder, true);
        encoder.into_inner()
    }

    /// Legacy serialization used for the txid and legacy signature hashing.
    pub fn encode_without_witness(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        self.encode_into(&mut encoder, false);
        encoder.into_inner()
    }

    pub fn encode_into(&self, encoder: &mut Encoder, allow_witness: bool) {
        let with_witness = allow_witness && self.has_witness();
        encoder.write_i32_le(self.version);
        if with_witness {
            encoder.write_u8(WITNESS_MARKER);
            encoder.write_u8(WITNESS_FLAG);
        }
        write_vec(encoder, &self.vin);
        write_vec(encoder, &self.vout);
        if with_witness {
            for input in &self.vin {
                encoder.write_varint(input.witness.len() as u64);
                for item in &input.witness {
                    encoder.write_var_bytes(item);
                }
            }
        }
        encoder.write_u32_le(self.lock_time);
    }

    pub fn txid(&self) -> Hash256 {
        sha256d(&self.encode_without_witness())
    }

    pub fn wtxid(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, TransactionDecodeError> {
        let mut decoder = Decoder::new(bytes);
        let tx = Self::decode_from(&mut decoder)?;
        decoder.finish()?;
        Ok(tx)
    }

    pub fn decode_from(decoder: &mut Decoder) -> Result<Self, TransactionDecodeError> {
        let version = decoder.read_i32_le()?;
        let mut flags = 0u8;
        let mut vin: Vec<TxIn> = read_vec(decoder)?;
        let vout = if vin.is_empty() {
            // Either a zero-input transaction or the witness marker.
            flags = decoder.read_u8()?;
            if flags != 0 {
                vin = read_vec(decoder)?;
                read_vec(decoder)?
            } else {
                Vec::new()
            }
        } else {
            read_vec(decoder)?
        };

        if flags & WITNESS_FLAG != 0 {
            flags ^= WITNESS_FLAG;
            for input in vin.iter_mut() {
                let count = decoder.read_count()?;
                let mut stack = Vec::with_capacity(prealloc(count));
                for _ in 0..count {
                    stack.push(decoder.read_var_bytes()?);
                }
                input.witness = stack;
            }
            if vin.iter().all(|input| input.witness.is_empty()) {
                return Err(TransactionDecodeError::SuperfluousWitness);
            }
        }
        if flags != 0 {
            return Err(TransactionDecodeError::UnknownOptionalData(flags));
        }

        let lock_time = decoder.read_u32_le()?;
        Ok(Self {
            version,
            vin,
            vout,
            lock_time,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionDecodeError {
    Decode(DecodeError),
    SuperfluousWitness,
    UnknownOptionalData(u8),
}

impl From<DecodeError> for TransactionDecodeError {
    fn from(error: DecodeError) -> Self {
        TransactionDecodeError::Decode(error)
    }
}

impl std::fmt::Display for TransactionDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionDecodeError::Decode(error) => write!(f, "{error}"),
            TransactionDecodeError::SuperfluousWitness => write!(f, "superfluous witness record"),
            TransactionDecodeError::UnknownOptionalData(flags) => {
                write!(f, "unknown transaction optional data (flags {flags:#04x})")
            }
        }
    }
}

impl std::error::Error for TransactionDecodeError {}
