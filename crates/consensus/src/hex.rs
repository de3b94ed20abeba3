//! Hex helpers for hashes and raw payloads.

use std::fmt::Write;

use crate::Hash256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HexError {
    InvalidLength,
    InvalidCharacter,
}

impl std::fmt::Display for HexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HexError::InvalidLength => write!(f, "invalid hex length"),
            HexError::InvalidCharacter => write!(f, "invalid hex character"),
        }
    }
}

impl std::error::Error for HexError {}

/// Parses a display-order hash (as printed by node RPC) into internal byte order.
pub fn hash256_from_hex(input: &str) -> Result<Hash256, HexError> {
    let mut hex = input.trim();
    if let Some(stripped) = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")) {
        hex = stripped;
    }
    if hex.len() != 64 {
        return Err(HexError::InvalidLength);
    }
    let bytes = hex_to_bytes(hex)?;
    let mut out = [0u8; 32];
    for (slot, byte) in out.iter_mut().zip(bytes.iter().rev()) {
        *slot = *byte;
    }
    Ok(out)
}

/// Display-order hex of an internal-order hash.
pub fn hash256_to_hex(hash: &Hash256) -> String {
    let mut out = String::with_capacity(64);
    for byte in hash.iter().rev() {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

pub fn hex_to_bytes(input: &str) -> Result<Vec<u8>, HexError> {
    let hex = input.trim();
    if hex.len() % 2 == 1 {
        return Err(HexError::InvalidLength);
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    let mut iter = hex.as_bytes().iter().copied();
    while let (Some(high), Some(low)) = (iter.next(), iter.next()) {
        let high = (high as char)
            .to_digit(16)
            .ok_or(HexError::InvalidCharacter)? as u8;
        let low = (low as char)
            .to_digit(16)
            .ok_or(HexError::InvalidCharacter)? as u8;
        bytes.push(high << 4 | low);
    }
    Ok(bytes)
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}
