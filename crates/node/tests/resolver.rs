mod common;

use std::fs;

use resync::resolver::{ResolveError, BLOCK_DATA_DIR};
use resync_consensus::{bytes_to_hex, hash256_to_hex};

use common::{resolver, three_block_chain, MemorySource};

#[test]
fn resolution_is_cached_after_first_fetch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = three_block_chain();
    let source = MemorySource::new(&chain);
    let calls = source.calls.clone();
    let mut resolver = resolver(dir.path(), source);

    let first = resolver.resolve_height(2).expect("resolve");
    assert_eq!(first.height, 2);
    assert_eq!(first.hash, chain[1].hash());
    assert_eq!(first.block, chain[1]);
    assert_eq!(calls.borrow().len(), 3);

    let again = resolver.resolve_height(2).expect("resolve again");
    let by_hash = resolver.resolve_hash(&chain[1].hash()).expect("resolve hash");
    assert_eq!(again, first);
    assert_eq!(by_hash, first);
    assert_eq!(calls.borrow().len(), 3, "cached lookups must not fetch");
}

#[test]
fn intermediates_are_replaced_by_binary_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = three_block_chain();
    let mut resolver = resolver(dir.path(), MemorySource::new(&chain));
    resolver.resolve_height(1).expect("resolve");

    let blockdata = dir.path().join(BLOCK_DATA_DIR);
    let stem = hash256_to_hex(&chain[0].hash());
    let record = fs::read(blockdata.join(format!("{stem}.mffb"))).expect("record");
    assert_eq!(&record[..4], &1u32.to_le_bytes());
    assert_eq!(&record[4..], chain[0].consensus_encode().as_slice());
    assert_eq!(
        fs::read(blockdata.join("1.hth")).expect("height index"),
        chain[0].hash().to_vec()
    );
    for leftover in [
        format!("{stem}.hex"),
        format!("{stem}.hdr"),
        format!("{stem}.height"),
        "1.hth.txt".to_string(),
    ] {
        assert!(!blockdata.join(&leftover).exists(), "{leftover} left behind");
    }
}

#[test]
fn interrupted_intermediates_are_reused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = three_block_chain();
    let source = MemorySource::new(&chain);
    let calls = source.calls.clone();
    let mut resolver = resolver(dir.path(), source);

    let blockdata = dir.path().join(BLOCK_DATA_DIR);
    let stem = hash256_to_hex(&chain[2].hash());
    fs::write(blockdata.join("3.hth.txt"), format!("{stem}\n")).expect("write");
    fs::write(
        blockdata.join(format!("{stem}.hex")),
        bytes_to_hex(&chain[2].consensus_encode()),
    )
    .expect("write");

    let record = resolver.resolve_height(3).expect("resolve");
    assert_eq!(record.block, chain[2]);
    assert_eq!(*calls.borrow(), vec![format!("getblockheader {stem}")]);
}

#[test]
fn payload_for_another_block_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = three_block_chain();
    let mut resolver = resolver(dir.path(), MemorySource::new(&chain));

    let blockdata = dir.path().join(BLOCK_DATA_DIR);
    let stem = hash256_to_hex(&chain[0].hash());
    fs::write(
        blockdata.join(format!("{stem}.hex")),
        bytes_to_hex(&chain[1].consensus_encode()),
    )
    .expect("write");

    match resolver.resolve_hash(&chain[0].hash()) {
        Err(ResolveError::HashMismatch { expected, actual }) => {
            assert_eq!(expected, chain[0].hash());
            assert_eq!(actual, chain[1].hash());
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!blockdata.join(format!("{stem}.mffb")).exists());
    assert!(!blockdata.join(format!("{stem}.hex")).exists());

    // The bad intermediate is gone, so the next attempt refetches.
    assert_eq!(
        resolver.resolve_hash(&chain[0].hash()).expect("refetch").block,
        chain[0]
    );
}

#[test]
fn wrong_hash_for_height_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = three_block_chain();
    let source = MemorySource::new(&chain).with_hash_at(1, chain[1].hash());
    let mut resolver = resolver(dir.path(), source);

    assert!(matches!(
        resolver.resolve_height(1),
        Err(ResolveError::HeightMismatch {
            expected: 1,
            actual: 2,
            ..
        })
    ));
    let blockdata = dir.path().join(BLOCK_DATA_DIR);
    assert!(!blockdata.join("1.hth").exists());
    assert!(!blockdata.join("1.hth.txt").exists());
    let stem = hash256_to_hex(&chain[1].hash());
    assert!(!blockdata.join(format!("{stem}.mffb")).exists());
}

#[test]
fn wrong_hash_for_height_is_refetched_after_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = three_block_chain();
    let bad = MemorySource::new(&chain).with_hash_at(1, chain[1].hash());
    assert!(resolver(dir.path(), bad).resolve_height(1).is_err());

    let source = MemorySource::new(&chain);
    let calls = source.calls.clone();
    let mut restarted = resolver(dir.path(), source);
    let record = restarted.resolve_height(1).expect("resolve after restart");
    assert_eq!(record.block, chain[0]);
    assert_eq!(calls.borrow().first().map(String::as_str), Some("getblockhash 1"));
}

#[test]
fn wrong_header_height_is_not_persisted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = three_block_chain();
    let stem = hash256_to_hex(&chain[0].hash());
    let blockdata = dir.path().join(BLOCK_DATA_DIR);

    let bad = MemorySource::new(&chain).with_header_height(chain[0].hash(), 2);
    assert!(matches!(
        resolver(dir.path(), bad).resolve_height(1),
        Err(ResolveError::HeightMismatch {
            expected: 1,
            actual: 2,
            ..
        })
    ));
    assert!(!blockdata.join(format!("{stem}.mffb")).exists());
    assert!(!blockdata.join(format!("{stem}.hdr")).exists());

    let source = MemorySource::new(&chain);
    let calls = source.calls.clone();
    let mut restarted = resolver(dir.path(), source);
    let record = restarted.resolve_height(1).expect("resolve after restart");
    assert_eq!(record.height, 1);
    assert_eq!(record.block, chain[0]);
    assert_eq!(
        *calls.borrow(),
        vec!["getblockhash 1".to_string(), format!("getblockheader {stem}")]
    );
}

#[test]
fn unparseable_header_is_refetched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = three_block_chain();
    let source = MemorySource::new(&chain);
    let calls = source.calls.clone();
    let mut resolver = resolver(dir.path(), source);

    let blockdata = dir.path().join(BLOCK_DATA_DIR);
    let stem = hash256_to_hex(&chain[0].hash());
    let header_path = blockdata.join(format!("{stem}.hdr"));
    fs::write(&header_path, "{\"height\":").expect("write");

    assert!(matches!(
        resolver.resolve_hash(&chain[0].hash()),
        Err(ResolveError::Corrupt { .. })
    ));
    assert!(!header_path.exists());
    resolver.resolve_hash(&chain[0].hash()).expect("refetch");
    assert_eq!(
        calls.borrow().iter().filter(|call| call.starts_with("getblockheader")).count(),
        1
    );
}

#[test]
fn malformed_cache_files_are_corruption() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = three_block_chain();
    let mut resolver = resolver(dir.path(), MemorySource::new(&chain));
    let blockdata = dir.path().join(BLOCK_DATA_DIR);

    fs::write(blockdata.join("1.hth"), [0u8; 5]).expect("write");
    assert!(matches!(
        resolver.resolve_height(1),
        Err(ResolveError::Corrupt { .. })
    ));

    let stem = hash256_to_hex(&chain[1].hash());
    fs::write(blockdata.join(format!("{stem}.mffb")), [2, 0, 0, 0, 1]).expect("write");
    assert!(matches!(
        resolver.resolve_hash(&chain[1].hash()),
        Err(ResolveError::Corrupt { .. })
    ));
}
