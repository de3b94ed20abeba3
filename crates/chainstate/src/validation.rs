//! Re-verification of every non-coinbase input of a block.

use std::collections::HashMap;

use resync_consensus::{bytes_to_hex, hash256_to_hex, script_flags_for, Hash256};
use resync_primitives::block::Block;
use resync_primitives::outpoint::OutPoint;
use resync_primitives::transaction::Transaction;
use resync_script::standard::{classify_script_pubkey, ScriptType};
use resync_script::{
    cast_to_bool, EngineError, Execution, InputContext, ScriptEngine, ScriptError, SigVersion,
};

use crate::view::TxView;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputError {
    MissingInput,
    Setup(EngineError),
    ScriptFailed {
        error: ScriptError,
        script_type: ScriptType,
    },
    NonCleanStack {
        size: usize,
        sig_version: SigVersion,
    },
    EmptyStack,
    FalseStack {
        stack: Vec<Vec<u8>>,
    },
}

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputError::MissingInput => write!(f, "could not find input transaction"),
            InputError::Setup(err) => write!(f, "failed to set up script execution: {err}"),
            InputError::ScriptFailed { error, script_type } => write!(
                f,
                "failed to validate {script_type} spend: {} ({error})",
                error.code()
            ),
            InputError::NonCleanStack { size, sig_version } => write!(
                f,
                "finished {sig_version} execution with non-1 stack size: size() == {size}"
            ),
            InputError::EmptyStack => write!(f, "finished execution with an empty stack"),
            InputError::FalseStack { stack } => write!(
                f,
                "finished execution with non-truthy on stack: stack top = {}",
                stack.last().map(|top| bytes_to_hex(top)).unwrap_or_default()
            ),
        }
    }
}

/// An input that failed verification, with the coordinates needed to find it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockValidationError {
    pub block_hash: Hash256,
    pub tx_index: usize,
    pub txid: Hash256,
    pub input_index: usize,
    pub prevout: OutPoint,
    pub error: InputError,
}

impl std::fmt::Display for BlockValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "block {}, index {} tx {} input {}={}: {}",
            hash256_to_hex(&self.block_hash),
            self.tx_index,
            hash256_to_hex(&self.txid),
            self.input_index,
            self.prevout,
            self.error
        )
    }
}

impl std::error::Error for BlockValidationError {}

/// Renders a final stack top first, one `<NN>\t<hex>` line per element.
pub fn format_stack(stack: &[Vec<u8>]) -> String {
    if stack.is_empty() {
        return "- empty stack -\n".to_string();
    }
    let mut out = String::new();
    for (position, item) in stack.iter().rev().enumerate() {
        let marker = if position == 0 { "\t(top)" } else { "" };
        out.push_str(&format!(
            "<{:02}>\t{}{marker}\n",
            position + 1,
            bytes_to_hex(item)
        ));
    }
    out
}

/// Checks every non-coinbase input of `block` at `height`.
///
/// Prior transactions are looked up in `view` and then among the earlier
/// transactions of the same block. The view itself is not modified; the
/// caller commits the block once this returns `Ok`. Returns the number of
/// inputs checked.
pub fn verify_block_inputs<E: ScriptEngine + ?Sized>(
    height: u32,
    block_hash: &Hash256,
    block: &Block,
    view: &TxView,
    engine: &E,
) -> Result<usize, BlockValidationError> {
    let mut earlier: HashMap<Hash256, &Transaction> = HashMap::new();
    let mut checked = 0usize;
    for (tx_index, tx) in block.transactions.iter().enumerate() {
        let txid = tx.txid();
        if !tx.is_coinbase() {
            for (input_index, input) in tx.vin.iter().enumerate() {
                let fail = |error: InputError| BlockValidationError {
                    block_hash: *block_hash,
                    tx_index,
                    txid,
                    input_index,
                    prevout: input.prevout.clone(),
                    error,
                };
                let prev_tx = view
                    .get(&input.prevout.hash)
                    .or_else(|| earlier.get(&input.prevout.hash).copied())
                    .ok_or_else(|| fail(InputError::MissingInput))?;
                let ctx = InputContext {
                    tx,
                    input_index,
                    prev_tx,
                    flags: script_flags_for(height, block_hash, &txid),
                };
                let execution = engine
                    .execute(&ctx)
                    .map_err(|err| fail(InputError::Setup(err)))?;
                check_execution(&ctx, &txid, execution).map_err(fail)?;
                checked += 1;
            }
        }
        earlier.insert(txid, tx);
    }
    Ok(checked)
}

fn check_execution(
    ctx: &InputContext<'_>,
    txid: &Hash256,
    execution: Execution,
) -> Result<(), InputError> {
    if let Err(error) = execution.outcome {
        let script_type = ctx
            .tx
            .vin
            .get(ctx.input_index)
            .and_then(|input| ctx.prev_tx.vout.get(input.prevout.index as usize))
            .map(|out| classify_script_pubkey(&out.script_pubkey))
            .unwrap_or(ScriptType::Unknown);
        return Err(InputError::ScriptFailed { error, script_type });
    }

    let stack = execution.stack;
    if stack.len() != 1 {
        if execution.sig_version == SigVersion::WitnessV0 {
            return Err(InputError::NonCleanStack {
                size: stack.len(),
                sig_version: execution.sig_version,
            });
        }
        resync_log::log_warn!(
            "tx {} input {} finished execution with non-1 stack size: size() == {}",
            hash256_to_hex(txid),
            ctx.input_index,
            stack.len()
        );
    }
    let truthy = match stack.last() {
        Some(top) => cast_to_bool(top),
        None => return Err(InputError::EmptyStack),
    };
    if !truthy {
        resync_log::log_error!(
            "tx {} input {} final stack:\n{}",
            hash256_to_hex(txid),
            ctx.input_index,
            format_stack(&stack)
        );
        return Err(InputError::FalseStack { stack });
    }
    Ok(())
}
