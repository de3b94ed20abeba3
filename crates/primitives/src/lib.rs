//! Core block/transaction types and consensus serialization.

pub mod block;
pub mod encoding;
pub mod hash;
pub mod outpoint;
pub mod transaction;

pub use block::{Block, BlockDecodeError, BlockHeader};
pub use hash::{hash160, sha256, sha256d, sha256d_pair};
pub use outpoint::OutPoint;
pub use transaction::{Transaction, TransactionDecodeError, TxIn, TxOut};
