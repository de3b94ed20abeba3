//! Per-input script execution capability.
//!
//! The caller supplies the spending transaction, the input being checked, the
//! transaction that created the spent output and the flag set. The engine runs
//! the scripts and reports the final stack; the caller decides what a
//! successful final stack looks like.

use resync_consensus::flags::{
    ScriptFlags, SCRIPT_VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM, SCRIPT_VERIFY_P2SH,
    SCRIPT_VERIFY_SIGPUSHONLY, SCRIPT_VERIFY_WITNESS,
};
use resync_consensus::{hash256_to_hex, Hash256};
use resync_consensus::constants::MAX_SCRIPT_ELEMENT_SIZE;
use resync_primitives::hash::sha256;
use resync_primitives::transaction::Transaction;

use crate::interpreter::{
    cast_to_bool, eval_script, is_p2sh, is_push_only, push_data, witness_program, ScriptError,
    Stack, TransactionSignatureChecker,
};
use crate::opcodes::{OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160};
use crate::sighash::SigVersion;

pub struct InputContext<'a> {
    pub tx: &'a Transaction,
    pub input_index: usize,
    pub prev_tx: &'a Transaction,
    pub flags: ScriptFlags,
}

/// Result of running one input's scripts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execution {
    pub sig_version: SigVersion,
    pub outcome: Result<(), ScriptError>,
    pub stack: Stack,
}

/// The input could not be prepared for execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    InputIndexOutOfRange { index: usize, inputs: usize },
    PrevTxMismatch { expected: Hash256, actual: Hash256 },
    MissingOutput { txid: Hash256, index: u32, outputs: usize },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InputIndexOutOfRange { index, inputs } => {
                write!(f, "input index {index} out of range ({inputs} inputs)")
            }
            EngineError::PrevTxMismatch { expected, actual } => write!(
                f,
                "input transaction {} does not match prevout {}",
                hash256_to_hex(actual),
                hash256_to_hex(expected)
            ),
            EngineError::MissingOutput {
                txid,
                index,
                outputs,
            } => write!(
                f,
                "prevout {}:{index} out of range ({outputs} outputs)",
                hash256_to_hex(txid)
            ),
        }
    }
}

impl std::error::Error for EngineError {}

pub trait ScriptEngine {
    fn execute(&self, ctx: &InputContext<'_>) -> Result<Execution, EngineError>;
}

/// Legacy, P2SH and witness v0 execution.
///
/// Final clean-stack and truthiness checks are left to the caller so that
/// historical non-clean legacy spends can be tolerated.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardEngine;

impl ScriptEngine for StandardEngine {
    fn execute(&self, ctx: &InputContext<'_>) -> Result<Execution, EngineError> {
        let input = ctx
            .tx
            .vin
            .get(ctx.input_index)
            .ok_or(EngineError::InputIndexOutOfRange {
                index: ctx.input_index,
                inputs: ctx.tx.vin.len(),
            })?;
        let prev_txid = ctx.prev_tx.txid();
        if prev_txid != input.prevout.hash {
            return Err(EngineError::PrevTxMismatch {
                expected: input.prevout.hash,
                actual: prev_txid,
            });
        }
        let spent = ctx
            .prev_tx
            .vout
            .get(input.prevout.index as usize)
            .ok_or(EngineError::MissingOutput {
                txid: prev_txid,
                index: input.prevout.index,
                outputs: ctx.prev_tx.vout.len(),
            })?;

        let checker = TransactionSignatureChecker::new(ctx.tx, ctx.input_index, spent.value);
        let mut run = Run {
            flags: ctx.flags,
            checker: &checker,
            sig_version: SigVersion::Base,
            stack: Vec::new(),
        };
        let outcome = run.verify(&input.script_sig, &spent.script_pubkey, &input.witness);
        Ok(Execution {
            sig_version: run.sig_version,
            outcome,
            stack: run.stack,
        })
    }
}

struct Run<'a> {
    flags: ScriptFlags,
    checker: &'a TransactionSignatureChecker<'a>,
    sig_version: SigVersion,
    stack: Stack,
}

impl Run<'_> {
    fn verify(
        &mut self,
        script_sig: &[u8],
        script_pubkey: &[u8],
        witness: &[Vec<u8>],
    ) -> Result<(), ScriptError> {
        let flags = self.flags;
        if flags & SCRIPT_VERIFY_SIGPUSHONLY != 0 && !is_push_only(script_sig) {
            return Err(ScriptError::SigPushOnly);
        }

        self.eval(script_sig)?;
        let stack_copy = if flags & SCRIPT_VERIFY_P2SH != 0 {
            self.stack.clone()
        } else {
            Vec::new()
        };
        self.eval(script_pubkey)?;

        let native_program = if flags & SCRIPT_VERIFY_WITNESS != 0 {
            witness_program(script_pubkey)
        } else {
            None
        };
        let p2sh = flags & SCRIPT_VERIFY_P2SH != 0 && is_p2sh(script_pubkey);
        if native_program.is_none() && !p2sh {
            return self.reject_unexpected_witness(witness);
        }
        self.require_true()?;

        if let Some((version, program)) = native_program {
            if !script_sig.is_empty() {
                return Err(ScriptError::WitnessMalleated);
            }
            return self.verify_witness_program(witness, version, program);
        }

        if !is_push_only(script_sig) {
            return Err(ScriptError::SigPushOnly);
        }
        self.stack = stack_copy;
        let redeem_script = self.stack.pop().ok_or(ScriptError::EvalFalse)?;
        self.eval(&redeem_script)?;

        let nested_program = if flags & SCRIPT_VERIFY_WITNESS != 0 {
            witness_program(&redeem_script)
        } else {
            None
        };
        match nested_program {
            Some((version, program)) => {
                self.require_true()?;
                if script_sig != push_data(&redeem_script).as_slice() {
                    return Err(ScriptError::WitnessMalleatedP2sh);
                }
                self.verify_witness_program(witness, version, program)
            }
            None => self.reject_unexpected_witness(witness),
        }
    }

    fn verify_witness_program(
        &mut self,
        witness: &[Vec<u8>],
        version: u8,
        program: &[u8],
    ) -> Result<(), ScriptError> {
        if version != 0 {
            if self.flags & SCRIPT_VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM != 0 {
                return Err(ScriptError::DiscourageUpgradableWitnessProgram);
            }
            // Future versions succeed unconditionally.
            self.stack = vec![vec![1]];
            return Ok(());
        }

        let (script, stack) = match program.len() {
            32 => {
                let (script, rest) = witness
                    .split_last()
                    .ok_or(ScriptError::WitnessProgramWitnessEmpty)?;
                if sha256(script).as_slice() != program {
                    return Err(ScriptError::WitnessProgramMismatch);
                }
                (script.clone(), rest.to_vec())
            }
            20 => {
                if witness.len() != 2 {
                    return Err(ScriptError::WitnessProgramMismatch);
                }
                let mut script = vec![OP_DUP, OP_HASH160, 0x14];
                script.extend_from_slice(program);
                script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
                (script, witness.to_vec())
            }
            _ => return Err(ScriptError::WitnessProgramWrongLength),
        };

        if stack.iter().any(|item| item.len() > MAX_SCRIPT_ELEMENT_SIZE) {
            return Err(ScriptError::PushSize);
        }
        self.sig_version = SigVersion::WitnessV0;
        self.stack = stack;
        self.eval(&script)
    }

    fn eval(&mut self, script: &[u8]) -> Result<(), ScriptError> {
        eval_script(
            &mut self.stack,
            script,
            self.flags,
            self.checker,
            self.sig_version,
        )
    }

    fn require_true(&self) -> Result<(), ScriptError> {
        match self.stack.last() {
            Some(top) if cast_to_bool(top) => Ok(()),
            _ => Err(ScriptError::EvalFalse),
        }
    }

    fn reject_unexpected_witness(&self, witness: &[Vec<u8>]) -> Result<(), ScriptError> {
        if self.flags & SCRIPT_VERIFY_WITNESS != 0 && !witness.is_empty() {
            return Err(ScriptError::WitnessUnexpected);
        }
        Ok(())
    }
}
