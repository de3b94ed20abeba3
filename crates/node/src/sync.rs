//! Resume, then replay the chain one height at a time.

use std::fmt;

use resync_chainstate::{
    verify_block_inputs, BlockValidationError, CheckpointError, CheckpointManager, TxView,
};
use resync_consensus::{hash256_to_hex, Hash256};
use resync_script::ScriptEngine;

use crate::fetch::RemoteSource;
use crate::resolver::{BlockResolver, ResolveError};

pub const CHECKPOINT_INTERVAL: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Bootstrapping,
    Syncing,
}

#[derive(Debug)]
pub enum SyncError {
    Resolve { height: u32, error: ResolveError },
    Validation { height: u32, error: BlockValidationError },
    Checkpoint { height: u32, error: CheckpointError },
}

impl SyncError {
    pub fn height(&self) -> u32 {
        match self {
            SyncError::Resolve { height, .. }
            | SyncError::Validation { height, .. }
            | SyncError::Checkpoint { height, .. } => *height,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Resolve { height, error } => {
                write!(f, "failed to resolve block #{height}: {error}")
            }
            SyncError::Validation { height, error } => {
                write!(f, "block #{height} failed verification: {error}")
            }
            SyncError::Checkpoint { height, error } => {
                write!(f, "failed to write state at #{height}: {error}")
            }
        }
    }
}

impl std::error::Error for SyncError {}

/// What one call to [`Syncer::step`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepReport {
    pub height: u32,
    pub hash: Hash256,
    pub transactions: usize,
    pub inputs: usize,
    /// Transactions in all blocks before this one.
    pub total_transactions: u64,
    pub checkpointed: bool,
}

pub struct Syncer<S, E> {
    resolver: BlockResolver<S>,
    engine: E,
    checkpoints: CheckpointManager,
    checkpoint_interval: u32,
    state: SyncState,
    view: TxView,
    height: u32,
    total_transactions: u64,
    previous_block_transactions: u64,
}

impl<S: RemoteSource, E: ScriptEngine> Syncer<S, E> {
    /// Restores the last checkpoint, or starts before genesis when there is
    /// none.
    pub fn bootstrap(
        resolver: BlockResolver<S>,
        engine: E,
        checkpoints: CheckpointManager,
    ) -> Result<Self, SyncError> {
        let mut syncer = Self {
            resolver,
            engine,
            checkpoints,
            checkpoint_interval: CHECKPOINT_INTERVAL,
            state: SyncState::Bootstrapping,
            view: TxView::new(),
            height: 0,
            total_transactions: 0,
            previous_block_transactions: 0,
        };
        let restored = syncer
            .checkpoints
            .load()
            .map_err(|error| SyncError::Checkpoint { height: 0, error })?;
        if let Some(state) = restored {
            log_info!(
                "restoring from state: height {} ({} transactions in view, {} total)",
                state.height,
                state.view.len(),
                state.total_transactions
            );
            syncer.height = state.height;
            syncer.view = state.view;
            syncer.total_transactions = state.total_transactions;
        } else {
            log_info!("no saved state; starting from genesis");
        }
        syncer.state = SyncState::Syncing;
        Ok(syncer)
    }

    pub fn with_checkpoint_interval(mut self, interval: u32) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Last height whose block was fully verified and committed.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn view(&self) -> &TxView {
        &self.view
    }

    pub fn resolver(&self) -> &BlockResolver<S> {
        &self.resolver
    }

    /// Resolves, verifies and commits the next block.
    pub fn step(&mut self) -> Result<StepReport, SyncError> {
        let height = self.height + 1;
        self.total_transactions += self.previous_block_transactions;
        self.previous_block_transactions = 0;

        let record = self
            .resolver
            .resolve_height(height)
            .map_err(|error| SyncError::Resolve { height, error })?;
        let transactions = record.block.transactions.len();
        log_info!(
            "block #{height}={} (#tx = {transactions:4}; total = {:9})",
            hash256_to_hex(&record.hash),
            self.total_transactions
        );

        let inputs = verify_block_inputs(
            height,
            &record.hash,
            &record.block,
            &self.view,
            &self.engine,
        )
        .map_err(|error| SyncError::Validation { height, error })?;

        for tx in record.block.transactions {
            self.view.insert(tx);
        }
        self.height = height;
        self.previous_block_transactions = transactions as u64;

        let checkpointed = height % self.checkpoint_interval == 0;
        if checkpointed {
            self.checkpoint()?;
        }
        Ok(StepReport {
            height,
            hash: record.hash,
            transactions,
            inputs,
            total_transactions: self.total_transactions,
            checkpointed,
        })
    }

    /// Steps until a fault stops the replay.
    pub fn run(&mut self) -> Result<(), SyncError> {
        loop {
            self.step()?;
        }
    }

    /// Saves the current height and view. The stored total includes the
    /// block at `height` so that a resumed run counts it exactly once.
    pub fn checkpoint(&self) -> Result<(), SyncError> {
        let height = self.height;
        log_info!("writing state to disk at height {height}");
        self.checkpoints
            .save(
                height,
                &self.view,
                self.total_transactions + self.previous_block_transactions,
            )
            .map_err(|error| SyncError::Checkpoint { height, error })
    }
}
