//! Unspent-output view, crash-safe checkpoints and block input verification.

pub mod checkpoint;
pub mod validation;
pub mod view;

pub use checkpoint::{CheckpointError, CheckpointManager, CheckpointState};
pub use validation::{verify_block_inputs, BlockValidationError, InputError};
pub use view::{TxView, ViewDecodeError};
