//! Block header and block types.

use resync_consensus::Hash256;

use crate::encoding::{prealloc, DecodeError, Decoder, Encoder};
use crate::hash::{sha256d, sha256d_pair};
use crate::transaction::{Transaction, TransactionDecodeError};

pub const HEADER_SIZE: usize = 80;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(HEADER_SIZE);
        self.encode_into(&mut encoder);
        encoder.into_inner()
    }

    fn encode_into(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_hash_le(&self.prev_block);
        encoder.write_hash_le(&self.merkle_root);
        encoder.write_u32_le(self.time);
        encoder.write_u32_le(self.bits);
        encoder.write_u32_le(self.nonce);
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let header = Self::decode_from(&mut decoder)?;
        decoder.finish()?;
        Ok(header)
    }

    pub fn decode_from(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            version: decoder.read_i32_le()?,
            prev_block: decoder.read_hash_le()?,
            merkle_root: decoder.read_hash_le()?,
            time: decoder.read_u32_le()?,
            bits: decoder.read_u32_le()?,
            nonce: decoder.read_u32_le()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        self.header.encode_into(&mut encoder);
        encoder.write_varint(self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.encode_into(&mut encoder, true);
        }
        encoder.into_inner()
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, BlockDecodeError> {
        let mut decoder = Decoder::new(bytes);
        let header = BlockHeader::decode_from(&mut decoder)?;
        let count = decoder.read_count()?;
        let mut transactions = Vec::with_capacity(prealloc(count));
        for _ in 0..count {
            transactions.push(Transaction::decode_from(&mut decoder)?);
        }
        decoder.finish()?;
        Ok(Self {
            header,
            transactions,
        })
    }

    /// Merkle root over the txids, duplicating the last entry of odd levels.
    pub fn compute_merkle_root(&self) -> Hash256 {
        let leaves: Vec<Hash256> = self.transactions.iter().map(Transaction::txid).collect();
        merkle_root(leaves)
    }
}

pub fn merkle_root(mut layer: Vec<Hash256>) -> Hash256 {
    if layer.is_empty() {
        return [0u8; 32];
    }
    while layer.len() > 1 {
        if layer.len() % 2 == 1 {
            if let Some(last) = layer.last().copied() {
                layer.push(last);
            }
        }
        layer = layer
            .chunks(2)
            .map(|pair| sha256d_pair(&pair[0], &pair[1]))
            .collect();
    }
    layer[0]
}

#[derive(Debug)]
pub enum BlockDecodeError {
    Decode(DecodeError),
    Transaction(TransactionDecodeError),
}

impl From<DecodeError> for BlockDecodeError {
    fn from(error: DecodeError) -> Self {
        BlockDecodeError::Decode(error)
    }
}

impl From<TransactionDecodeError> for BlockDecodeError {
    fn from(error: TransactionDecodeError) -> Self {
        BlockDecodeError::Transaction(error)
    }
}

impl std::fmt::Display for BlockDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockDecodeError::Decode(error) => write!(f, "{error}"),
            BlockDecodeError::Transaction(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for BlockDecodeError {}
