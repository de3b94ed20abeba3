//! Digests behind txids, merkle nodes and the script hash opcodes.

use resync_consensus::Hash256;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> Hash256 {
    Sha256::digest(data).into()
}

/// Double SHA-256, as used for txids and block hashes.
pub fn sha256d(data: &[u8]) -> Hash256 {
    Sha256::digest(Sha256::digest(data)).into()
}

/// Merkle parent of two child nodes: `sha256d(left || right)`.
pub fn sha256d_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let inner = Sha256::new().chain_update(left).chain_update(right).finalize();
    Sha256::digest(inner).into()
}

/// RIPEMD-160 of SHA-256; the payload of P2PKH and P2SH outputs.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_matches_concatenation() {
        let left = [0x11u8; 32];
        let right = [0x22u8; 32];
        let mut joined = left.to_vec();
        joined.extend_from_slice(&right);
        assert_eq!(sha256d_pair(&left, &right), sha256d(&joined));
    }

    #[test]
    fn empty_input_digests() {
        assert_eq!(
            resync_consensus::bytes_to_hex(&sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            resync_consensus::bytes_to_hex(&hash160(b"")),
            "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb"
        );
    }
}
