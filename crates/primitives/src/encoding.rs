//! Consensus byte codec: little-endian integers and CompactSize prefixes.
//!
//! Decode errors carry the byte offset they were raised at, so a corrupt
//! block record or checkpoint can be located with a hex dump.

use std::fmt;

use resync_consensus::Hash256;

/// Upper bound for any CompactSize length prefix.
const MAX_COMPACT_SIZE: u64 = 0x0200_0000;

/// Preallocation cap for decoded collections; the prefix is untrusted.
const MAX_PREALLOC: usize = 4096;

#[derive(Default)]
pub struct Encoder {
    out: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.out
    }

    pub fn write_u8(&mut self, value: u8) {
        self.out.push(value);
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i32_le(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i64_le(&mut self, value: i64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    pub fn write_hash_le(&mut self, hash: &Hash256) {
        self.write_bytes(hash);
    }

    pub fn write_varint(&mut self, value: u64) {
        match value {
            0..=0xfc => self.write_u8(value as u8),
            0xfd..=0xffff => {
                self.write_u8(0xfd);
                self.write_bytes(&(value as u16).to_le_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                self.write_u8(0xfe);
                self.write_u32_le(value as u32);
            }
            _ => {
                self.write_u8(0xff);
                self.write_u64_le(value);
            }
        }
    }

    /// Length-prefixed byte string (scripts, witness items).
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.write_bytes(bytes);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEof { offset: usize, needed: usize },
    NonCanonicalVarInt { offset: usize },
    SizeTooLarge { offset: usize, size: u64 },
    TrailingBytes { count: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof { offset, needed } => {
                write!(f, "unexpected end of data at byte {offset} ({needed} more needed)")
            }
            DecodeError::NonCanonicalVarInt { offset } => {
                write!(f, "non-canonical CompactSize at byte {offset}")
            }
            DecodeError::SizeTooLarge { offset, size } => {
                write!(f, "CompactSize {size} at byte {offset} exceeds maximum")
            }
            DecodeError::TrailingBytes { count } => {
                write!(f, "{count} trailing bytes after decode")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

pub struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Fails unless every input byte was consumed.
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.input.len().saturating_sub(self.pos) {
            0 => Ok(()),
            count => Err(DecodeError::TrailingBytes { count }),
        }
    }

    pub fn peek_u8(&self) -> Result<u8, DecodeError> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: 1,
            })
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.input.len().saturating_sub(self.pos);
        if available < len {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: len - available,
            });
        }
        let bytes = &self.input[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        self.read_fixed().map(u32::from_le_bytes)
    }

    pub fn read_i32_le(&mut self) -> Result<i32, DecodeError> {
        self.read_fixed().map(i32::from_le_bytes)
    }

    pub fn read_u64_le(&mut self) -> Result<u64, DecodeError> {
        self.read_fixed().map(u64::from_le_bytes)
    }

    pub fn read_i64_le(&mut self) -> Result<i64, DecodeError> {
        self.read_fixed().map(i64::from_le_bytes)
    }

    pub fn read_hash_le(&mut self) -> Result<Hash256, DecodeError> {
        self.read_fixed()
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let offset = self.pos;
        let (value, floor) = match self.read_u8()? {
            0xfd => (u64::from(u16::from_le_bytes(self.read_fixed()?)), 0xfd),
            0xfe => (u64::from(self.read_u32_le()?), 0x1_0000),
            0xff => (self.read_u64_le()?, 0x1_0000_0000),
            small => return Ok(u64::from(small)),
        };
        if value < floor {
            return Err(DecodeError::NonCanonicalVarInt { offset });
        }
        if value > MAX_COMPACT_SIZE {
            return Err(DecodeError::SizeTooLarge {
                offset,
                size: value,
            });
        }
        Ok(value)
    }

    /// CompactSize element count.
    pub fn read_count(&mut self) -> Result<usize, DecodeError> {
        let offset = self.pos;
        let size = self.read_varint()?;
        usize::try_from(size).map_err(|_| DecodeError::SizeTooLarge { offset, size })
    }

    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_count()?;
        Ok(self.take(len)?.to_vec())
    }
}

pub trait Encodable {
    fn consensus_encode(&self, encoder: &mut Encoder);
}

pub trait Decodable: Sized {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError>;
}

pub(crate) fn write_vec<T: Encodable>(encoder: &mut Encoder, values: &[T]) {
    encoder.write_varint(values.len() as u64);
    values
        .iter()
        .for_each(|value| value.consensus_encode(encoder));
}

pub(crate) fn read_vec<T: Decodable>(decoder: &mut Decoder) -> Result<Vec<T>, DecodeError> {
    let count = decoder.read_count()?;
    let mut values = Vec::with_capacity(prealloc(count));
    for _ in 0..count {
        values.push(T::consensus_decode(decoder)?);
    }
    Ok(values)
}

/// Initial capacity for a collection of `count` decoded items.
pub fn prealloc(count: usize) -> usize {
    count.min(MAX_PREALLOC)
}
