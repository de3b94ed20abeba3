use resync_consensus::{bytes_to_hex, hex_to_bytes};
use resync_primitives::transaction::Transaction;
use resync_script::sighash::{
    legacy_signature_hash, witness_v0_signature_hash, SighashType, LEGACY_ONE_HASH, SIGHASH_ALL,
    SIGHASH_ANYONECANPAY, SIGHASH_NONE, SIGHASH_SINGLE,
};

// Native P2WPKH example from BIP143.
const BIP143_UNSIGNED_TX: &str = "0100000002fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f0000000000eeffffffef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a0100000000ffffffff02202cb206000000001976a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac9093510d000000001976a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac11000000";

fn decode_tx(hex: &str) -> Transaction {
    let bytes = hex_to_bytes(hex).expect("hex");
    Transaction::consensus_decode(&bytes).expect("decode tx")
}

#[test]
fn sighash_type_flags() {
    let combined = SighashType(SIGHASH_ALL | SIGHASH_ANYONECANPAY);
    assert_eq!(combined.base_type(), SIGHASH_ALL);
    assert!(combined.has_anyone_can_pay());

    let none = SighashType(SIGHASH_NONE);
    assert_eq!(none.base_type(), SIGHASH_NONE);
    assert!(!none.has_anyone_can_pay());

    let single = SighashType(SIGHASH_SINGLE | SIGHASH_ANYONECANPAY);
    assert_eq!(single.base_type(), SIGHASH_SINGLE);
    assert!(single.has_anyone_can_pay());
}

#[test]
fn bip143_native_p2wpkh_digest() {
    let tx = decode_tx(BIP143_UNSIGNED_TX);
    let script_code =
        hex_to_bytes("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac").expect("script");
    let digest = witness_v0_signature_hash(
        &tx,
        1,
        &script_code,
        600_000_000,
        SighashType(SIGHASH_ALL),
    );
    assert_eq!(
        bytes_to_hex(&digest),
        "c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670"
    );
}

#[test]
fn legacy_single_without_output_hashes_to_one() {
    let mut tx = decode_tx(BIP143_UNSIGNED_TX);
    tx.vout.truncate(1);
    let digest = legacy_signature_hash(&tx, 1, &[0x51], SighashType(SIGHASH_SINGLE));
    assert_eq!(digest, LEGACY_ONE_HASH);
    let digest = legacy_signature_hash(&tx, 5, &[0x51], SighashType(SIGHASH_ALL));
    assert_eq!(digest, LEGACY_ONE_HASH);
}

#[test]
fn legacy_digest_commits_to_hash_type() {
    let tx = decode_tx(BIP143_UNSIGNED_TX);
    let all = legacy_signature_hash(&tx, 0, &[0x51], SighashType(SIGHASH_ALL));
    let none = legacy_signature_hash(&tx, 0, &[0x51], SighashType(SIGHASH_NONE));
    let acp = legacy_signature_hash(
        &tx,
        0,
        &[0x51],
        SighashType(SIGHASH_ALL | SIGHASH_ANYONECANPAY),
    );
    assert_ne!(all, none);
    assert_ne!(all, acp);

    // NONE ignores outputs entirely.
    let mut changed = tx.clone();
    changed.vout[0].value += 1;
    assert_eq!(
        legacy_signature_hash(&changed, 0, &[0x51], SighashType(SIGHASH_NONE)),
        none
    );
    assert_ne!(
        legacy_signature_hash(&changed, 0, &[0x51], SighashType(SIGHASH_ALL)),
        all
    );
}
