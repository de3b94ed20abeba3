//! Height/hash to block resolution over three on-disk tiers.
//!
//! `blockdata/<hash>.mffb` holds `{height:u32 LE}{raw block}` and is kept
//! forever, as is `blockdata/<height>.hth` (32 raw hash bytes). The text
//! responses `.hex`, `.hdr` and `.hth.txt` are intermediates: they are
//! deleted once the binary record exists, with the fetch cache bounding any
//! that are left behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use resync_consensus::{hash256_from_hex, hash256_to_hex, hex_to_bytes, Hash256};
use resync_primitives::block::Block;
use serde::Deserialize;

use crate::cache::FetchCache;
use crate::fetch::{FetchClient, FetchError, FetchRequest, RemoteSource};

pub const BLOCK_DATA_DIR: &str = "blockdata";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRecord {
    pub height: u32,
    pub hash: Hash256,
    pub block: Block,
}

#[derive(Debug)]
pub enum ResolveError {
    Fetch(FetchError),
    Io { path: PathBuf, error: io::Error },
    Corrupt { path: PathBuf, reason: String },
    HashMismatch { expected: Hash256, actual: Hash256 },
    HeightMismatch { hash: Hash256, expected: u32, actual: u32 },
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::Fetch(err) => write!(f, "{err}"),
            ResolveError::Io { path, error } => write!(f, "{}: {error}", path.display()),
            ResolveError::Corrupt { path, reason } => {
                write!(f, "corrupt block data in {}: {reason}", path.display())
            }
            ResolveError::HashMismatch { expected, actual } => write!(
                f,
                "requested block {} but received {}",
                hash256_to_hex(expected),
                hash256_to_hex(actual)
            ),
            ResolveError::HeightMismatch {
                hash,
                expected,
                actual,
            } => write!(
                f,
                "block {} reports height {actual}, expected {expected}",
                hash256_to_hex(hash)
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<FetchError> for ResolveError {
    fn from(err: FetchError) -> Self {
        ResolveError::Fetch(err)
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ResolveError + '_ {
    move |error| ResolveError::Io {
        path: path.to_path_buf(),
        error,
    }
}

fn corrupt(path: &Path, reason: impl ToString) -> ResolveError {
    ResolveError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[derive(Deserialize)]
struct HeaderSummary {
    height: u32,
}

pub struct BlockResolver<S> {
    dir: PathBuf,
    client: FetchClient<S>,
    cache: FetchCache,
}

impl<S: RemoteSource> BlockResolver<S> {
    /// Uses `<data_dir>/blockdata`, creating it if needed.
    pub fn new(
        data_dir: &Path,
        client: FetchClient<S>,
        cache: FetchCache,
    ) -> Result<Self, ResolveError> {
        let dir = data_dir.join(BLOCK_DATA_DIR);
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        Ok(Self { dir, client, cache })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    pub fn client(&self) -> &FetchClient<S> {
        &self.client
    }

    pub fn record_path(&self, hash: &Hash256) -> PathBuf {
        self.dir.join(format!("{}.mffb", hash256_to_hex(hash)))
    }

    pub fn height_index_path(&self, height: u32) -> PathBuf {
        self.dir.join(format!("{height}.hth"))
    }

    pub fn resolve_height(&mut self, height: u32) -> Result<BlockRecord, ResolveError> {
        let index_path = self.height_index_path(height);
        let (hash, fetched_from) = match fs::read(&index_path) {
            Ok(bytes) => {
                let hash = Hash256::try_from(bytes.as_slice())
                    .map_err(|_| corrupt(&index_path, format!("{} bytes", bytes.len())))?;
                (hash, None)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let (hash, text_path) = self.fetch_block_hash(height)?;
                (hash, Some(text_path))
            }
            Err(err) => return Err(io_error(&index_path)(err)),
        };
        let record = match self.resolve_checked(&hash, Some(height)) {
            Ok(record) => record,
            Err(err) => {
                // A hash that does not lead to the block at `height` is asked
                // for again on the next run.
                if let Some(text_path) = &fetched_from {
                    remove_intermediate(text_path);
                }
                return Err(err);
            }
        };
        // The index is only written for a hash whose block checked out.
        if let Some(text_path) = fetched_from {
            write_file_atomic(&index_path, &hash).map_err(io_error(&index_path))?;
            remove_intermediate(&text_path);
        }
        Ok(record)
    }

    pub fn resolve_hash(&mut self, hash: &Hash256) -> Result<BlockRecord, ResolveError> {
        self.resolve_checked(hash, None)
    }

    /// Resolves `hash`, requiring the block to sit at `expected` when given.
    fn resolve_checked(
        &mut self,
        hash: &Hash256,
        expected: Option<u32>,
    ) -> Result<BlockRecord, ResolveError> {
        let record_path = self.record_path(hash);
        if !record_path.exists() {
            self.build_record(hash, &record_path, expected)?;
        }
        let record = read_record(&record_path)?;
        if record.hash != *hash {
            return Err(ResolveError::HashMismatch {
                expected: *hash,
                actual: record.hash,
            });
        }
        match expected {
            Some(height) if record.height != height => Err(ResolveError::HeightMismatch {
                hash: *hash,
                expected: height,
                actual: record.height,
            }),
            _ => Ok(record),
        }
    }

    fn fetch_block_hash(&mut self, height: u32) -> Result<(Hash256, PathBuf), ResolveError> {
        let text_path = self.dir.join(format!("{height}.hth.txt"));
        let text = self.read_or_fetch(&text_path, FetchRequest::BlockHash { height })?;
        let token = text.split_whitespace().next().unwrap_or_default();
        match hash256_from_hex(token) {
            Ok(hash) => Ok((hash, text_path)),
            Err(err) => {
                remove_intermediate(&text_path);
                Err(corrupt(&text_path, format!("block hash '{token}': {err}")))
            }
        }
    }

    /// Fetches and checks `hash`, then compacts it into `record_path`. Every
    /// check runs before the record is written; an intermediate that fails
    /// one is deleted so it is fetched again.
    fn build_record(
        &mut self,
        hash: &Hash256,
        record_path: &Path,
        expected: Option<u32>,
    ) -> Result<(), ResolveError> {
        let stem = hash256_to_hex(hash);
        let hex_path = self.dir.join(format!("{stem}.hex"));
        let header_path = self.dir.join(format!("{stem}.hdr"));

        let body = self.read_or_fetch(&hex_path, FetchRequest::Block { hash: *hash })?;
        let header = self.read_or_fetch(&header_path, FetchRequest::BlockHeader { hash: *hash })?;
        let height = match serde_json::from_str::<HeaderSummary>(&header) {
            Ok(summary) => summary.height,
            Err(err) => {
                remove_intermediate(&header_path);
                return Err(corrupt(&header_path, err));
            }
        };
        if let Some(expected) = expected.filter(|expected| *expected != height) {
            remove_intermediate(&header_path);
            return Err(ResolveError::HeightMismatch {
                hash: *hash,
                expected,
                actual: height,
            });
        }
        let raw = match hex_to_bytes(&body) {
            Ok(raw) => raw,
            Err(err) => {
                remove_intermediate(&hex_path);
                return Err(corrupt(&hex_path, err));
            }
        };

        let block = match Block::consensus_decode(&raw) {
            Ok(block) => block,
            Err(err) => {
                remove_intermediate(&hex_path);
                return Err(corrupt(&hex_path, err));
            }
        };
        let actual = block.hash();
        if actual != *hash {
            remove_intermediate(&hex_path);
            remove_intermediate(&header_path);
            return Err(ResolveError::HashMismatch {
                expected: *hash,
                actual,
            });
        }
        if block.compute_merkle_root() != block.header.merkle_root {
            remove_intermediate(&hex_path);
            return Err(corrupt(&hex_path, "merkle root mismatch"));
        }

        let mut record = Vec::with_capacity(4 + raw.len());
        record.extend_from_slice(&height.to_le_bytes());
        record.extend_from_slice(&raw);
        write_file_atomic(record_path, &record).map_err(io_error(record_path))?;
        log_debug!("cached block {stem} at height {height}");

        remove_intermediate(&hex_path);
        remove_intermediate(&header_path);
        // Stale height extraction output.
        remove_intermediate(&self.dir.join(format!("{stem}.height")));
        Ok(())
    }

    /// Reuses an intermediate from an interrupted run when it has content.
    fn read_or_fetch(&mut self, path: &Path, request: FetchRequest) -> Result<String, ResolveError> {
        match fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => return Ok(text),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_error(path)(err)),
        }
        Ok(self.client.fetch(&request, path, &mut self.cache)?)
    }
}

fn read_record(path: &Path) -> Result<BlockRecord, ResolveError> {
    let bytes = fs::read(path).map_err(io_error(path))?;
    if bytes.len() < 4 {
        return Err(corrupt(path, "truncated height"));
    }
    let (height_bytes, raw) = bytes.split_at(4);
    let mut height = [0u8; 4];
    height.copy_from_slice(height_bytes);
    let block = Block::consensus_decode(raw).map_err(|err| corrupt(path, err))?;
    Ok(BlockRecord {
        height: u32::from_le_bytes(height),
        hash: block.hash(),
        block,
    })
}

fn remove_intermediate(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            log_warn!("failed to remove {}: {err}", path.display());
        }
    }
}

fn write_file_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    if fs::rename(&tmp, path).is_err() {
        let _ = fs::remove_file(path);
        fs::rename(&tmp, path)?;
    }
    Ok(())
}
