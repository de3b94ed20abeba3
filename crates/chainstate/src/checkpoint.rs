//! Crash-safe persistence of the sync position.
//!
//! A save goes through three phases: the staging file is written and synced,
//! read back and compared against the live state, then renamed over the
//! canonical file. A crash before the rename leaves the previous checkpoint
//! in place.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use resync_primitives::encoding::{Decoder, Encoder};

use crate::view::{TxView, ViewDecodeError};

pub const STATE_FILE_NAME: &str = "current-sync-state.dat";
pub const STAGING_FILE_NAME: &str = "current-sync-state.new";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckpointState {
    pub height: u32,
    pub view: TxView,
    pub total_transactions: u64,
}

impl CheckpointState {
    pub fn encode(height: u32, view: &TxView, total_transactions: u64) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_u32_le(height);
        view.encode_into(&mut encoder);
        encoder.write_u64_le(total_transactions);
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ViewDecodeError> {
        let mut decoder = Decoder::new(bytes);
        let height = decoder.read_u32_le()?;
        let view = TxView::decode_from(&mut decoder)?;
        let total_transactions = decoder.read_u64_le()?;
        decoder.finish()?;
        Ok(Self {
            height,
            view,
            total_transactions,
        })
    }
}

#[derive(Debug)]
pub enum CheckpointError {
    Io { path: PathBuf, error: io::Error },
    Decode { path: PathBuf, error: ViewDecodeError },
    RoundTripMismatch { path: PathBuf },
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io { path, error } => write!(f, "{}: {error}", path.display()),
            CheckpointError::Decode { path, error } => {
                write!(f, "{}: corrupt checkpoint: {error}", path.display())
            }
            CheckpointError::RoundTripMismatch { path } => write!(
                f,
                "{}: staged checkpoint does not match the live state",
                path.display()
            ),
        }
    }
}

impl std::error::Error for CheckpointError {}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CheckpointError + '_ {
    move |error| CheckpointError::Io {
        path: path.to_path_buf(),
        error,
    }
}

pub struct CheckpointManager {
    state_path: PathBuf,
    staging_path: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            state_path: dir.join(STATE_FILE_NAME),
            staging_path: dir.join(STAGING_FILE_NAME),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    /// Returns the last promoted checkpoint, or `None` when no canonical file
    /// exists yet. A leftover staging file is ignored.
    pub fn load(&self) -> Result<Option<CheckpointState>, CheckpointError> {
        let bytes = match fs::read(&self.state_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&self.state_path)(err)),
        };
        CheckpointState::decode(&bytes)
            .map(Some)
            .map_err(|error| CheckpointError::Decode {
                path: self.state_path.clone(),
                error,
            })
    }

    pub fn save(
        &self,
        height: u32,
        view: &TxView,
        total_transactions: u64,
    ) -> Result<(), CheckpointError> {
        self.write_staging(height, view, total_transactions)?;
        self.verify_staging(height, view, total_transactions)?;
        self.promote_staging()?;
        resync_log::log_debug!(
            "checkpoint saved at height {height} ({} view entries)",
            view.len()
        );
        Ok(())
    }

    pub fn write_staging(
        &self,
        height: u32,
        view: &TxView,
        total_transactions: u64,
    ) -> Result<(), CheckpointError> {
        if let Some(parent) = self.staging_path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let bytes = CheckpointState::encode(height, view, total_transactions);
        let mut file = File::create(&self.staging_path).map_err(io_error(&self.staging_path))?;
        file.write_all(&bytes)
            .map_err(io_error(&self.staging_path))?;
        file.sync_all().map_err(io_error(&self.staging_path))?;
        Ok(())
    }

    /// Re-reads the staging file into a fresh state and requires it to equal
    /// the live one.
    pub fn verify_staging(
        &self,
        height: u32,
        view: &TxView,
        total_transactions: u64,
    ) -> Result<(), CheckpointError> {
        let bytes = fs::read(&self.staging_path).map_err(io_error(&self.staging_path))?;
        let staged = CheckpointState::decode(&bytes).map_err(|error| CheckpointError::Decode {
            path: self.staging_path.clone(),
            error,
        })?;
        if staged.height != height
            || staged.total_transactions != total_transactions
            || staged.view != *view
        {
            return Err(CheckpointError::RoundTripMismatch {
                path: self.staging_path.clone(),
            });
        }
        Ok(())
    }

    pub fn promote_staging(&self) -> Result<(), CheckpointError> {
        if fs::rename(&self.staging_path, &self.state_path).is_err() {
            let _ = fs::remove_file(&self.state_path);
            fs::rename(&self.staging_path, &self.state_path)
                .map_err(io_error(&self.state_path))?;
        }
        Ok(())
    }
}
