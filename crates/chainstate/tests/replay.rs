use resync_chainstate::{verify_block_inputs, InputError, TxView};
use resync_consensus::constants::UPGRADABLE_NOPS_HEIGHT;
use resync_consensus::Hash256;
use resync_primitives::block::{Block, BlockHeader};
use resync_primitives::hash::hash160;
use resync_primitives::outpoint::OutPoint;
use resync_primitives::transaction::{Transaction, TxIn, TxOut};
use resync_script::interpreter::push_data;
use resync_script::sighash::{legacy_signature_hash, SighashType, SIGHASH_ALL};
use resync_script::{ScriptError, StandardEngine};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

const REWARD: i64 = 50_0000_0000;
const OP_NOP1: u8 = 0xb0;
const OP_TRUE: u8 = 0x51;

fn coinbase(height: u32, script_pubkey: Vec<u8>) -> Transaction {
    let mut script_sig = vec![0x04];
    script_sig.extend_from_slice(&height.to_le_bytes());
    Transaction {
        version: 1,
        vin: vec![TxIn::new(OutPoint::null(), script_sig)],
        vout: vec![TxOut {
            value: REWARD,
            script_pubkey,
        }],
        lock_time: 0,
    }
}

fn spend(prev: &Transaction, script_sig: Vec<u8>) -> Transaction {
    Transaction {
        version: 1,
        vin: vec![TxIn::new(
            OutPoint {
                hash: prev.txid(),
                index: 0,
            },
            script_sig,
        )],
        vout: vec![TxOut {
            value: REWARD - 1_000,
            script_pubkey: vec![OP_TRUE],
        }],
        lock_time: 0,
    }
}

fn block(prev_block: Hash256, transactions: Vec<Transaction>) -> Block {
    let mut block = Block {
        header: BlockHeader {
            version: 1,
            prev_block,
            merkle_root: [0u8; 32],
            time: 1_231_006_505,
            bits: 0x1d00_ffff,
            nonce: 0,
        },
        transactions,
    };
    block.header.merkle_root = block.compute_merkle_root();
    block
}

fn p2pkh(pubkey: &[u8]) -> Vec<u8> {
    let mut script = vec![0x76, 0xa9, 0x14];
    script.extend_from_slice(&hash160(pubkey));
    script.extend_from_slice(&[0x88, 0xac]);
    script
}

/// Three blocks: block 1 pays a key, block 2 spends it with a signature,
/// block 3 spends block 2's output with a bare OP_TRUE.
fn three_block_chain() -> Vec<Block> {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[0x42; 32]).expect("secret key");
    let pubkey = PublicKey::from_secret_key(&secp, &secret).serialize().to_vec();
    let script_pubkey = p2pkh(&pubkey);

    let funding = coinbase(1, script_pubkey.clone());
    let mut payment = spend(&funding, Vec::new());
    let digest = legacy_signature_hash(&payment, 0, &script_pubkey, SighashType(SIGHASH_ALL));
    let mut signature = secp
        .sign_ecdsa(&Message::from_digest(digest), &secret)
        .serialize_der()
        .to_vec();
    signature.push(SIGHASH_ALL as u8);
    let mut script_sig = push_data(&signature);
    script_sig.extend(push_data(&pubkey));
    payment.vin[0].script_sig = script_sig;

    let sweep = spend(&payment, Vec::new());

    let block1 = block([0u8; 32], vec![funding]);
    let block2 = block(block1.hash(), vec![coinbase(2, vec![OP_TRUE]), payment]);
    let block3 = block(block2.hash(), vec![coinbase(3, vec![OP_TRUE]), sweep]);
    vec![block1, block2, block3]
}

fn commit(view: &mut TxView, block: &Block) {
    for tx in &block.transactions {
        view.insert(tx.clone());
    }
}

#[test]
fn blocks_replay_in_height_order() {
    let chain = three_block_chain();
    let mut view = TxView::new();
    let mut checked = Vec::new();
    for (offset, block) in chain.iter().enumerate() {
        let height = offset as u32 + 1;
        let inputs = verify_block_inputs(height, &block.hash(), block, &view, &StandardEngine)
            .unwrap_or_else(|err| panic!("height {height}: {err}"));
        checked.push(inputs);
        commit(&mut view, block);
    }
    assert_eq!(checked, vec![0, 1, 1]);
    assert_eq!(view.len(), 5);
}

#[test]
fn spend_before_its_funding_block_is_fatal() {
    let chain = three_block_chain();
    let view = TxView::new();
    let err = verify_block_inputs(2, &chain[1].hash(), &chain[1], &view, &StandardEngine)
        .expect_err("block 2 without block 1");
    assert_eq!(err.error, InputError::MissingInput);
    assert_eq!(err.block_hash, chain[1].hash());
    assert_eq!(err.tx_index, 1);
    assert_eq!(err.input_index, 0);
    assert_eq!(err.prevout.hash, chain[0].transactions[0].txid());
}

#[test]
fn tampered_signature_is_rejected() {
    let mut chain = three_block_chain();
    let mut view = TxView::new();
    commit(&mut view, &chain[0]);
    chain[1].transactions[1].vout[0].value -= 1;
    let block = &chain[1];
    let err = verify_block_inputs(2, &block.hash(), block, &view, &StandardEngine)
        .expect_err("tampered payment");
    assert!(matches!(
        err.error,
        InputError::ScriptFailed {
            error: ScriptError::SigNullFail,
            ..
        }
    ));
}

#[test]
fn upgradable_nop_is_accepted_only_before_activation() {
    let funding = coinbase(1, vec![OP_NOP1, OP_TRUE]);
    let mut view = TxView::new();
    view.insert(funding.clone());
    let block = block([7u8; 32], vec![coinbase(2, vec![OP_TRUE]), spend(&funding, Vec::new())]);

    let before = UPGRADABLE_NOPS_HEIGHT - 1;
    assert_eq!(
        verify_block_inputs(before, &block.hash(), &block, &view, &StandardEngine),
        Ok(1)
    );

    let err = verify_block_inputs(
        UPGRADABLE_NOPS_HEIGHT,
        &block.hash(),
        &block,
        &view,
        &StandardEngine,
    )
    .expect_err("discouraged nop after activation");
    assert!(matches!(
        err.error,
        InputError::ScriptFailed {
            error: ScriptError::DiscourageUpgradableNops,
            ..
        }
    ));
}

#[test]
fn legacy_spend_leaving_extra_items_passes() {
    let funding = coinbase(1, vec![OP_TRUE]);
    let mut view = TxView::new();
    view.insert(funding.clone());
    let block = block([8u8; 32], vec![coinbase(2, vec![OP_TRUE]), spend(&funding, vec![OP_TRUE])]);
    assert_eq!(
        verify_block_inputs(1_000, &block.hash(), &block, &view, &StandardEngine),
        Ok(1)
    );
}
