use std::sync::OnceLock;

use resync_consensus::Hash256;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, VerifyOnly};

static SECP256K1_VERIFY: OnceLock<Secp256k1<VerifyOnly>> = OnceLock::new();

fn secp256k1_verify() -> &'static Secp256k1<VerifyOnly> {
    SECP256K1_VERIFY.get_or_init(Secp256k1::verification_only)
}

/// Verifies a DER signature (without hash type byte) over `digest`.
/// Parsing is lax so pre-BIP66 encodings still verify; strictness is enforced
/// by the interpreter's encoding checks. High-S values are normalized first
/// since libsecp256k1 only accepts low-S.
pub(crate) fn verify_ecdsa(der: &[u8], pubkey: &[u8], digest: &Hash256) -> bool {
    let Ok(mut signature) = Signature::from_der_lax(der) else {
        return false;
    };
    signature.normalize_s();
    let Ok(pubkey) = PublicKey::from_slice(pubkey) else {
        return false;
    };
    let message = Message::from_digest(*digest);
    secp256k1_verify()
        .verify_ecdsa(&message, &signature, &pubkey)
        .is_ok()
}

/// Whether the DER body carries an S value above half the curve order.
pub(crate) fn is_high_s(der: &[u8]) -> bool {
    let Ok(signature) = Signature::from_der_lax(der) else {
        return false;
    };
    let mut normalized = signature;
    normalized.normalize_s();
    normalized != signature
}
