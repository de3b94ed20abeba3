//! Incremental txid -> transaction store.
//!
//! Entries are never removed: a transaction is kept for as long as the pass
//! runs, even once every output has been spent.

use std::collections::BTreeMap;

use resync_consensus::Hash256;
use resync_primitives::encoding::{DecodeError, Decoder, Encoder};
use resync_primitives::transaction::{Transaction, TransactionDecodeError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxView {
    entries: BTreeMap<Hash256, Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewDecodeError {
    Decode(DecodeError),
    Transaction(TransactionDecodeError),
    TxidMismatch { stored: Hash256, computed: Hash256 },
    DuplicateTxid(Hash256),
}

impl std::fmt::Display for ViewDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewDecodeError::Decode(err) => write!(f, "{err}"),
            ViewDecodeError::Transaction(err) => write!(f, "{err}"),
            ViewDecodeError::TxidMismatch { stored, computed } => write!(
                f,
                "view entry keyed {} decodes to transaction {}",
                resync_consensus::hash256_to_hex(stored),
                resync_consensus::hash256_to_hex(computed)
            ),
            ViewDecodeError::DuplicateTxid(txid) => write!(
                f,
                "duplicate view entry {}",
                resync_consensus::hash256_to_hex(txid)
            ),
        }
    }
}

impl std::error::Error for ViewDecodeError {}

impl From<DecodeError> for ViewDecodeError {
    fn from(err: DecodeError) -> Self {
        ViewDecodeError::Decode(err)
    }
}

impl From<TransactionDecodeError> for ViewDecodeError {
    fn from(err: TransactionDecodeError) -> Self {
        ViewDecodeError::Transaction(err)
    }
}

impl TxView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash256) -> Option<&Transaction> {
        self.entries.get(txid)
    }

    /// Stores `tx` under its computed txid. A later insert of the same txid
    /// replaces the earlier entry.
    pub fn insert(&mut self, tx: Transaction) -> Hash256 {
        let txid = tx.txid();
        self.entries.insert(txid, tx);
        txid
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hash256, &Transaction)> {
        self.entries.iter()
    }

    pub fn encode_into(&self, encoder: &mut Encoder) {
        encoder.write_u64_le(self.entries.len() as u64);
        for (txid, tx) in &self.entries {
            encoder.write_bytes(txid);
            tx.encode_into(encoder, true);
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        self.encode_into(&mut encoder);
        encoder.into_inner()
    }

    /// Reads a view written by [`TxView::encode_into`]. Every stored key must
    /// match the txid of the transaction that follows it.
    pub fn decode_from(decoder: &mut Decoder) -> Result<Self, ViewDecodeError> {
        let count = decoder.read_u64_le()?;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let stored: Hash256 = decoder.read_fixed()?;
            let tx = Transaction::decode_from(decoder)?;
            let computed = tx.txid();
            if computed != stored {
                return Err(ViewDecodeError::TxidMismatch { stored, computed });
            }
            if entries.insert(stored, tx).is_some() {
                return Err(ViewDecodeError::DuplicateTxid(stored));
            }
        }
        Ok(Self { entries })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ViewDecodeError> {
        let mut decoder = Decoder::new(bytes);
        let view = Self::decode_from(&mut decoder)?;
        decoder.finish()?;
        Ok(view)
    }
}
