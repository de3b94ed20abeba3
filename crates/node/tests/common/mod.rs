#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use resync::cache::FetchCache;
use resync::fetch::{FetchClient, FetchError, FetchRequest, RemoteSource};
use resync::resolver::BlockResolver;
use resync_consensus::{bytes_to_hex, hash256_to_hex, Hash256};
use resync_primitives::block::{Block, BlockHeader};
use resync_primitives::outpoint::OutPoint;
use resync_primitives::transaction::{Transaction, TxIn, TxOut};

const OP_EQUAL: u8 = 0x87;
const OP_TRUE: u8 = 0x51;

fn coinbase(height: u32, script_pubkey: Vec<u8>) -> Transaction {
    let mut script_sig = vec![0x04];
    script_sig.extend_from_slice(&height.to_le_bytes());
    Transaction {
        version: 1,
        vin: vec![TxIn::new(OutPoint::null(), script_sig)],
        vout: vec![TxOut {
            value: 50_0000_0000,
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
            value: prev.vout[0].value - 1_000,
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
            time: 1_300_000_000,
            bits: 0x207f_ffff,
            nonce: 0,
        },
        transactions,
    };
    block.header.merkle_root = block.compute_merkle_root();
    block
}

/// Block 1 locks its reward behind `<42> OP_EQUAL`, block 2 unlocks it and
/// block 3 spends block 2's output.
pub fn three_block_chain() -> Vec<Block> {
    let funding = coinbase(1, vec![0x01, 0x2a, OP_EQUAL]);
    let payment = spend(&funding, vec![0x01, 0x2a]);
    let sweep = spend(&payment, Vec::new());

    let block1 = block([0u8; 32], vec![funding]);
    let block2 = block(block1.hash(), vec![coinbase(2, vec![OP_TRUE]), payment]);
    let block3 = block(block2.hash(), vec![coinbase(3, vec![OP_TRUE]), sweep]);
    vec![block1, block2, block3]
}

/// In-memory node answering the three RPC verbs.
pub struct MemorySource {
    hashes: HashMap<u32, Hash256>,
    blocks: HashMap<Hash256, (u32, Block)>,
    pub calls: Rc<RefCell<Vec<String>>>,
    pub failures: Rc<Cell<usize>>,
}

impl MemorySource {
    /// Serves `chain[i]` at height `i + 1`.
    pub fn new(chain: &[Block]) -> Self {
        Self::at(
            chain
                .iter()
                .enumerate()
                .map(|(idx, block)| (idx as u32 + 1, block.clone()))
                .collect(),
        )
    }

    pub fn at(entries: Vec<(u32, Block)>) -> Self {
        let mut hashes = HashMap::new();
        let mut blocks = HashMap::new();
        for (height, block) in entries {
            hashes.insert(height, block.hash());
            blocks.insert(block.hash(), (height, block));
        }
        Self {
            hashes,
            blocks,
            calls: Rc::new(RefCell::new(Vec::new())),
            failures: Rc::new(Cell::new(0)),
        }
    }

    /// Answers `getblockhash height` with `hash` regardless of the chain.
    pub fn with_hash_at(mut self, height: u32, hash: Hash256) -> Self {
        self.hashes.insert(height, hash);
        self
    }

    /// Reports `height` in the header of block `hash`.
    pub fn with_header_height(mut self, hash: Hash256, height: u32) -> Self {
        if let Some(entry) = self.blocks.get_mut(&hash) {
            entry.0 = height;
        }
        self
    }

    fn respond(&self, request: &FetchRequest) -> Option<String> {
        match request {
            FetchRequest::BlockHash { height } => {
                self.hashes.get(height).map(|hash| format!("{}\n", hash256_to_hex(hash)))
            }
            FetchRequest::Block { hash } => self
                .blocks
                .get(hash)
                .map(|(_, block)| format!("{}\n", bytes_to_hex(&block.consensus_encode()))),
            FetchRequest::BlockHeader { hash } => self.blocks.get(hash).map(|(height, _)| {
                serde_json::json!({
                    "hash": hash256_to_hex(hash),
                    "confirmations": 1,
                    "height": height,
                })
                .to_string()
            }),
        }
    }
}

impl RemoteSource for MemorySource {
    fn fetch(&self, request: &FetchRequest, destination: &Path) -> Result<(), FetchError> {
        self.calls.borrow_mut().push(request.to_string());
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(FetchError::Unavailable("injected failure".to_string()));
        }
        let text = self
            .respond(request)
            .ok_or_else(|| FetchError::Unavailable(format!("no answer for {request}")))?;
        fs::write(destination, text).map_err(|error| FetchError::Unreadable {
            path: destination.to_path_buf(),
            error,
        })
    }
}

pub fn resolver(data_dir: &Path, source: MemorySource) -> BlockResolver<MemorySource> {
    let client = FetchClient::new(source).with_retry_delay(Duration::ZERO);
    BlockResolver::new(data_dir, client, FetchCache::new()).expect("resolver")
}
