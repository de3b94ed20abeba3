use resync_consensus::{hash256_to_hex, hex_to_bytes, Hash256};
use resync_primitives::block::{merkle_root, Block, BlockHeader};
use resync_primitives::hash::sha256d;
use resync_primitives::outpoint::OutPoint;
use resync_primitives::transaction::{Transaction, TxIn, TxOut};

const GENESIS_HEADER: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";
const GENESIS_COINBASE: &str = "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";

fn genesis_bytes() -> Vec<u8> {
    let mut bytes = hex_to_bytes(GENESIS_HEADER).expect("header hex");
    bytes.push(1);
    bytes.extend(hex_to_bytes(GENESIS_COINBASE).expect("tx hex"));
    bytes
}

fn seq_hash(start: u8) -> Hash256 {
    std::array::from_fn(|i| start.wrapping_add(i as u8))
}

#[test]
fn genesis_header_hash() {
    let bytes = hex_to_bytes(GENESIS_HEADER).expect("hex");
    let header = BlockHeader::consensus_decode(&bytes).expect("decode");
    assert_eq!(header.version, 1);
    assert_eq!(header.bits, 0x1d00ffff);
    assert_eq!(header.nonce, 2_083_236_893);
    assert_eq!(
        hash256_to_hex(&header.hash()),
        "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
    );
    assert_eq!(header.consensus_encode(), bytes);
}

#[test]
fn genesis_block_decodes_and_merkle_matches() {
    let bytes = genesis_bytes();
    let block = Block::consensus_decode(&bytes).expect("decode");
    assert_eq!(block.transactions.len(), 1);
    let coinbase = &block.transactions[0];
    assert!(coinbase.is_coinbase());
    assert_eq!(coinbase.vout[0].value, 5_000_000_000);
    assert_eq!(
        hash256_to_hex(&coinbase.txid()),
        "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
    );
    assert_eq!(block.compute_merkle_root(), block.header.merkle_root);
    assert_eq!(block.consensus_encode(), bytes);
}

#[test]
fn block_rejects_trailing_bytes() {
    let mut bytes = genesis_bytes();
    bytes.push(0);
    assert!(Block::consensus_decode(&bytes).is_err());
}

#[test]
fn merkle_root_duplicates_odd_tail() {
    let (a, b, c) = (seq_hash(1), seq_hash(2), seq_hash(3));
    let pair = |left: &Hash256, right: &Hash256| {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(left);
        buf.extend_from_slice(right);
        sha256d(&buf)
    };
    let expected = pair(&pair(&a, &b), &pair(&c, &c));
    assert_eq!(merkle_root(vec![a, b, c]), expected);
    assert_eq!(merkle_root(vec![a]), a);
    assert_eq!(merkle_root(Vec::new()), [0u8; 32]);
}

#[test]
fn witness_transaction_layout() {
    let mut input = TxIn::new(
        OutPoint {
            hash: seq_hash(0x40),
            index: 0,
        },
        Vec::new(),
    );
    input.witness = vec![vec![0xaa; 3], vec![0xbb]];
    let tx = Transaction {
        version: 1,
        vin: vec![input],
        vout: vec![TxOut {
            value: 1,
            script_pubkey: vec![0x00, 0x14],
        }],
        lock_time: 17,
    };

    let encoded = tx.consensus_encode();
    let mut expected = Vec::new();
    expected.extend_from_slice(&1i32.to_le_bytes());
    expected.extend_from_slice(&[0x00, 0x01, 0x01]);
    expected.extend_from_slice(&seq_hash(0x40));
    expected.extend_from_slice(&0u32.to_le_bytes());
    expected.push(0);
    expected.extend_from_slice(&u32::MAX.to_le_bytes());
    expected.push(1);
    expected.extend_from_slice(&1i64.to_le_bytes());
    expected.extend_from_slice(&[0x02, 0x00, 0x14]);
    expected.extend_from_slice(&[0x02, 0x03, 0xaa, 0xaa, 0xaa, 0x01, 0xbb]);
    expected.extend_from_slice(&17u32.to_le_bytes());
    assert_eq!(encoded, expected);

    let decoded = Transaction::consensus_decode(&encoded).expect("decode");
    assert_eq!(decoded, tx);
}
