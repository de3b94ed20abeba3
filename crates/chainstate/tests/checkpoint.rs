use std::fs;

use resync_chainstate::checkpoint::{STAGING_FILE_NAME, STATE_FILE_NAME};
use resync_chainstate::{CheckpointManager, CheckpointState, TxView};
use resync_primitives::outpoint::OutPoint;
use resync_primitives::transaction::{Transaction, TxIn, TxOut};

fn tx(tag: u8) -> Transaction {
    let mut input = TxIn::new(
        OutPoint {
            hash: [tag; 32],
            index: 0,
        },
        vec![0x51],
    );
    if tag % 2 == 0 {
        input.witness = vec![vec![tag; 71], vec![2; 33]];
    }
    Transaction {
        version: 2,
        vin: vec![input],
        vout: vec![TxOut {
            value: tag as i64 * 1_000,
            script_pubkey: vec![0x00, 0x14, tag, tag],
        }],
        lock_time: 0,
    }
}

fn view_of(tags: &[u8]) -> TxView {
    let mut view = TxView::new();
    for tag in tags {
        view.insert(tx(*tag));
    }
    view
}

#[test]
fn save_then_load_restores_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = CheckpointManager::new(dir.path());
    let view = view_of(&[1, 2, 3]);
    manager.save(100, &view, 250).expect("save");

    assert!(dir.path().join(STATE_FILE_NAME).exists());
    assert!(!dir.path().join(STAGING_FILE_NAME).exists());
    let state = manager.load().expect("load").expect("checkpoint");
    assert_eq!(
        state,
        CheckpointState {
            height: 100,
            view,
            total_transactions: 250,
        }
    );
}

#[test]
fn crash_after_staging_keeps_previous_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = CheckpointManager::new(dir.path());
    let first = view_of(&[1]);
    manager.save(100, &first, 1).expect("first save");

    let second = view_of(&[1, 2, 3, 4]);
    manager.write_staging(200, &second, 9).expect("stage");
    // Process dies here; a fresh manager sees the old checkpoint.
    let restarted = CheckpointManager::new(dir.path());
    let state = restarted.load().expect("load").expect("checkpoint");
    assert_eq!(state.height, 100);
    assert_eq!(state.view, first);
    assert_eq!(state.total_transactions, 1);

    // Resuming overwrites the stale staging file.
    restarted.save(200, &second, 9).expect("second save");
    let state = restarted.load().expect("load").expect("checkpoint");
    assert_eq!(state.height, 200);
    assert_eq!(state.view, second);
}

#[test]
fn crash_after_verify_keeps_previous_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = CheckpointManager::new(dir.path());
    manager.save(100, &view_of(&[5]), 3).expect("first save");

    let next = view_of(&[5, 6]);
    manager.write_staging(200, &next, 4).expect("stage");
    manager.verify_staging(200, &next, 4).expect("verify");
    assert_eq!(manager.load().expect("load").expect("state").height, 100);

    manager.promote_staging().expect("promote");
    assert_eq!(manager.load().expect("load").expect("state").height, 200);
}

#[test]
fn truncated_staging_fails_verification() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = CheckpointManager::new(dir.path());
    let view = view_of(&[7, 8]);
    manager.write_staging(300, &view, 2).expect("stage");

    let staging = dir.path().join(STAGING_FILE_NAME);
    let bytes = fs::read(&staging).expect("read");
    fs::write(&staging, &bytes[..bytes.len() - 3]).expect("truncate");
    assert!(manager.verify_staging(300, &view, 2).is_err());
    assert!(manager.load().expect("load").is_none());
}
