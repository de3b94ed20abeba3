//! Reference to a transaction output being spent.

use std::fmt;

use resync_consensus::{hash256_to_hex, Hash256};

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};

/// Index value of the coinbase placeholder input.
const NULL_INDEX: u32 = u32::MAX;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash256, index: u32) -> Self {
        Self { hash, index }
    }

    /// The prevout carried by a coinbase input.
    pub fn null() -> Self {
        Self::new([0u8; 32], NULL_INDEX)
    }

    pub fn is_null(&self) -> bool {
        *self == Self::null()
    }
}

/// `<txid>:<index>` with the txid in display byte order.
impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hash256_to_hex(&self.hash), self.index)
    }
}

impl Encodable for OutPoint {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_hash_le(&self.hash);
        encoder.write_u32_le(self.index);
    }
}

impl Decodable for OutPoint {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self::new(decoder.read_hash_le()?, decoder.read_u32_le()?))
    }
}
