//! Consensus constants, script-flag vocabulary, and historical rule selection.

pub mod constants;
pub mod flags;
pub mod hex;

pub use flags::{script_flags_for, ScriptFlags, STANDARD_SCRIPT_VERIFY_FLAGS};
pub use hex::{bytes_to_hex, hash256_from_hex, hash256_to_hex, hex_to_bytes, HexError};

/// 32-byte hash in internal (little-endian) byte order.
pub type Hash256 = [u8; 32];
