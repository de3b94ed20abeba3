//! Script interpreter.

use resync_consensus::constants::{
    LOCKTIME_THRESHOLD, MAX_OPS_PER_SCRIPT, MAX_PUBKEYS_PER_MULTISIG, MAX_SCRIPT_ELEMENT_SIZE,
    MAX_SCRIPT_SIZE, MAX_STACK_SIZE,
};
use resync_consensus::flags::{
    ScriptFlags, SCRIPT_VERIFY_CHECKLOCKTIMEVERIFY, SCRIPT_VERIFY_CHECKSEQUENCEVERIFY,
    SCRIPT_VERIFY_CONST_SCRIPTCODE, SCRIPT_VERIFY_DERSIG,
    SCRIPT_VERIFY_DISCOURAGE_UPGRADABLE_NOPS, SCRIPT_VERIFY_LOW_S, SCRIPT_VERIFY_MINIMALDATA,
    SCRIPT_VERIFY_MINIMALIF, SCRIPT_VERIFY_NULLDUMMY, SCRIPT_VERIFY_NULLFAIL,
    SCRIPT_VERIFY_STRICTENC, SCRIPT_VERIFY_WITNESS_PUBKEYTYPE,
};
use resync_primitives::hash::{hash160, sha256, sha256d};
use resync_primitives::transaction::{Transaction, SEQUENCE_FINAL};
use ripemd::{Digest, Ripemd160};
use sha1::Sha1;

use crate::opcodes::*;
use crate::secp::{is_high_s, verify_ecdsa};
use crate::sighash::{signature_hash, SigVersion, SighashType};

pub type Stack = Vec<Vec<u8>>;

const SEQUENCE_LOCKTIME_DISABLE_FLAG: i64 = 1 << 31;
const SEQUENCE_LOCKTIME_TYPE_FLAG: i64 = 1 << 22;
const SEQUENCE_LOCKTIME_MASK: i64 = 0x0000_ffff;

const DEFAULT_NUM_SIZE: usize = 4;
const LOCKTIME_NUM_SIZE: usize = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScriptError {
    EvalFalse,
    OpReturn,
    ScriptSize,
    PushSize,
    OpCount,
    StackSize,
    SigCount,
    PubkeyCount,
    Verify,
    EqualVerify,
    CheckMultisigVerify,
    CheckSigVerify,
    NumEqualVerify,
    BadOpcode,
    DisabledOpcode,
    InvalidStackOperation,
    InvalidAltstackOperation,
    UnbalancedConditional,
    NegativeLockTime,
    UnsatisfiedLockTime,
    InvalidNumber,
    SigHashType,
    SigDer,
    MinimalData,
    SigPushOnly,
    SigHighS,
    SigNullDummy,
    PubkeyType,
    MinimalIf,
    SigNullFail,
    DiscourageUpgradableNops,
    DiscourageUpgradableWitnessProgram,
    WitnessProgramWrongLength,
    WitnessProgramWitnessEmpty,
    WitnessProgramMismatch,
    WitnessMalleated,
    WitnessMalleatedP2sh,
    WitnessUnexpected,
    WitnessPubkeyType,
    OpCodeSeparator,
    SigFindAndDelete,
}

impl ScriptError {
    /// Stable identifier for diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            ScriptError::EvalFalse => "eval_false",
            ScriptError::OpReturn => "op_return",
            ScriptError::ScriptSize => "script_size",
            ScriptError::PushSize => "push_size",
            ScriptError::OpCount => "op_count",
            ScriptError::StackSize => "stack_size",
            ScriptError::SigCount => "sig_count",
            ScriptError::PubkeyCount => "pubkey_count",
            ScriptError::Verify => "verify",
            ScriptError::EqualVerify => "equalverify",
            ScriptError::CheckMultisigVerify => "checkmultisigverify",
            ScriptError::CheckSigVerify => "checksigverify",
            ScriptError::NumEqualVerify => "numequalverify",
            ScriptError::BadOpcode => "bad_opcode",
            ScriptError::DisabledOpcode => "disabled_opcode",
            ScriptError::InvalidStackOperation => "invalid_stack_operation",
            ScriptError::InvalidAltstackOperation => "invalid_altstack_operation",
            ScriptError::UnbalancedConditional => "unbalanced_conditional",
            ScriptError::NegativeLockTime => "negative_locktime",
            ScriptError::UnsatisfiedLockTime => "unsatisfied_locktime",
            ScriptError::InvalidNumber => "invalid_number",
            ScriptError::SigHashType => "sig_hashtype",
            ScriptError::SigDer => "sig_der",
            ScriptError::MinimalData => "minimaldata",
            ScriptError::SigPushOnly => "sig_pushonly",
            ScriptError::SigHighS => "sig_high_s",
            ScriptError::SigNullDummy => "sig_nulldummy",
            ScriptError::PubkeyType => "pubkeytype",
            ScriptError::MinimalIf => "minimalif",
            ScriptError::SigNullFail => "nullfail",
            ScriptError::DiscourageUpgradableNops => "discourage_upgradable_nops",
            ScriptError::DiscourageUpgradableWitnessProgram => {
                "discourage_upgradable_witness_program"
            }
            ScriptError::WitnessProgramWrongLength => "witness_program_wrong_length",
            ScriptError::WitnessProgramWitnessEmpty => "witness_program_witness_empty",
            ScriptError::WitnessProgramMismatch => "witness_program_mismatch",
            ScriptError::WitnessMalleated => "witness_malleated",
            ScriptError::WitnessMalleatedP2sh => "witness_malleated_p2sh",
            ScriptError::WitnessUnexpected => "witness_unexpected",
            ScriptError::WitnessPubkeyType => "witness_pubkeytype",
            ScriptError::OpCodeSeparator => "op_codeseparator",
            ScriptError::SigFindAndDelete => "sig_findanddelete",
        }
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            ScriptError::EvalFalse => "script evaluated without error but finished with a false/empty top stack element",
            ScriptError::OpReturn => "OP_RETURN was encountered",
            ScriptError::ScriptSize => "script is too big",
            ScriptError::PushSize => "push value size limit exceeded",
            ScriptError::OpCount => "operation limit exceeded",
            ScriptError::StackSize => "stack size limit exceeded",
            ScriptError::SigCount => "signature count negative or greater than pubkey count",
            ScriptError::PubkeyCount => "pubkey count negative or limit exceeded",
            ScriptError::Verify => "script failed an OP_VERIFY operation",
            ScriptError::EqualVerify => "script failed an OP_EQUALVERIFY operation",
            ScriptError::CheckMultisigVerify => "script failed an OP_CHECKMULTISIGVERIFY operation",
            ScriptError::CheckSigVerify => "script failed an OP_CHECKSIGVERIFY operation",
            ScriptError::NumEqualVerify => "script failed an OP_NUMEQUALVERIFY operation",
            ScriptError::BadOpcode => "opcode missing or not understood",
            ScriptError::DisabledOpcode => "attempted to use a disabled opcode",
            ScriptError::InvalidStackOperation => "operation not valid with the current stack size",
            ScriptError::InvalidAltstackOperation => {
                "operation not valid with the current altstack size"
            }
            ScriptError::UnbalancedConditional => "invalid OP_IF construction",
            ScriptError::NegativeLockTime => "negative locktime",
            ScriptError::UnsatisfiedLockTime => "locktime requirement not satisfied",
            ScriptError::InvalidNumber => "script number overflow or non-minimal encoding",
            ScriptError::SigHashType => "signature hash type missing or not understood",
            ScriptError::SigDer => "non-canonical DER signature",
            ScriptError::MinimalData => "data push larger than necessary",
            ScriptError::SigPushOnly => "only push operators allowed in signatures",
            ScriptError::SigHighS => "non-canonical signature: S value is unnecessarily high",
            ScriptError::SigNullDummy => "dummy CHECKMULTISIG argument must be zero",
            ScriptError::PubkeyType => "public key is neither compressed or uncompressed",
            ScriptError::MinimalIf => "OP_IF/NOTIF argument must be minimal",
            ScriptError::SigNullFail => {
                "signature must be zero for failed CHECK(MULTI)SIG operation"
            }
            ScriptError::DiscourageUpgradableNops => "NOPx reserved for soft-fork upgrades",
            ScriptError::DiscourageUpgradableWitnessProgram => {
                "witness version reserved for soft-fork upgrades"
            }
            ScriptError::WitnessProgramWrongLength => "witness program has incorrect length",
            ScriptError::WitnessProgramWitnessEmpty => "witness program was passed an empty witness",
            ScriptError::WitnessProgramMismatch => "witness program hash mismatch",
            ScriptError::WitnessMalleated => "witness requires empty scriptSig",
            ScriptError::WitnessMalleatedP2sh => "witness requires only-redeemscript scriptSig",
            ScriptError::WitnessUnexpected => "witness provided for non-witness script",
            ScriptError::WitnessPubkeyType => "using non-compressed keys in segwit",
            ScriptError::OpCodeSeparator => "using OP_CODESEPARATOR in non-witness script",
            ScriptError::SigFindAndDelete => "signature is found in scriptCode",
        };
        write!(f, "{message}")
    }
}

impl std::error::Error for ScriptError {}

/// Transaction-dependent checks used by the signature and timelock opcodes.
pub trait SignatureChecker {
    fn check_sig(
        &self,
        sig: &[u8],
        pubkey: &[u8],
        script_code: &[u8],
        sig_version: SigVersion,
    ) -> bool;

    fn check_lock_time(&self, lock_time: i64) -> bool;

    fn check_sequence(&self, sequence: i64) -> bool;
}

pub struct TransactionSignatureChecker<'a> {
    tx: &'a Transaction,
    input_index: usize,
    amount: i64,
}

impl<'a> TransactionSignatureChecker<'a> {
    pub fn new(tx: &'a Transaction, input_index: usize, amount: i64) -> Self {
        Self {
            tx,
            input_index,
            amount,
        }
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn check_sig(
        &self,
        sig: &[u8],
        pubkey: &[u8],
        script_code: &[u8],
        sig_version: SigVersion,
    ) -> bool {
        let Some((&hash_type, der)) = sig.split_last() else {
            return false;
        };
        let digest = signature_hash(
            self.tx,
            self.input_index,
            script_code,
            self.amount,
            SighashType(hash_type as u32),
            sig_version,
        );
        verify_ecdsa(der, pubkey, &digest)
    }

    fn check_lock_time(&self, lock_time: i64) -> bool {
        let tx_lock_time = self.tx.lock_time as i64;
        let same_kind = (tx_lock_time < LOCKTIME_THRESHOLD && lock_time < LOCKTIME_THRESHOLD)
            || (tx_lock_time >= LOCKTIME_THRESHOLD && lock_time >= LOCKTIME_THRESHOLD);
        if !same_kind || lock_time > tx_lock_time {
            return false;
        }
        match self.tx.vin.get(self.input_index) {
            Some(input) => input.sequence != SEQUENCE_FINAL,
            None => false,
        }
    }

    fn check_sequence(&self, sequence: i64) -> bool {
        let Some(input) = self.tx.vin.get(self.input_index) else {
            return false;
        };
        let tx_sequence = input.sequence as i64;
        if (self.tx.version as u32) < 2 {
            return false;
        }
        if tx_sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return false;
        }
        let mask = SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK;
        let tx_masked = tx_sequence & mask;
        let masked = sequence & mask;
        let same_kind = (tx_masked < SEQUENCE_LOCKTIME_TYPE_FLAG
            && masked < SEQUENCE_LOCKTIME_TYPE_FLAG)
            || (tx_masked >= SEQUENCE_LOCKTIME_TYPE_FLAG && masked >= SEQUENCE_LOCKTIME_TYPE_FLAG);
        same_kind && masked <= tx_masked
    }
}

/// Executes `script` against `stack`.
pub fn eval_script(
    stack: &mut Stack,
    script: &[u8],
    flags: ScriptFlags,
    checker: &dyn SignatureChecker,
    sig_version: SigVersion,
) -> Result<(), ScriptError> {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(ScriptError::ScriptSize);
    }
    let require_minimal = flags & SCRIPT_VERIFY_MINIMALDATA != 0;
    let mut cursor = 0usize;
    let mut code_start = 0usize;
    let mut exec_stack: Vec<bool> = Vec::new();
    let mut altstack: Stack = Vec::new();
    let mut op_count = 0usize;

    while cursor < script.len() {
        let exec = !exec_stack.contains(&false);
        let (opcode, push) = next_op(script, &mut cursor)?;

        if push.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ScriptError::PushSize);
        }
        if opcode > OP_16 {
            op_count += 1;
            if op_count > MAX_OPS_PER_SCRIPT {
                return Err(ScriptError::OpCount);
            }
        }
        if is_disabled(opcode) {
            return Err(ScriptError::DisabledOpcode);
        }
        if opcode == OP_CODESEPARATOR
            && sig_version == SigVersion::Base
            && flags & SCRIPT_VERIFY_CONST_SCRIPTCODE != 0
        {
            return Err(ScriptError::OpCodeSeparator);
        }

        if exec && opcode <= OP_PUSHDATA4 {
            if require_minimal && !check_minimal_push(push, opcode) {
                return Err(ScriptError::MinimalData);
            }
            stack.push(push.to_vec());
        } else if exec || (OP_IF..=OP_ENDIF).contains(&opcode) {
            match opcode {
                OP_1NEGATE | OP_1..=OP_16 => {
                    let value = opcode as i64 - (OP_1 as i64 - 1);
                    stack.push(encode_num(value));
                }

                OP_NOP => {}
                OP_CHECKLOCKTIMEVERIFY => {
                    if flags & SCRIPT_VERIFY_CHECKLOCKTIMEVERIFY == 0 {
                        if flags & SCRIPT_VERIFY_DISCOURAGE_UPGRADABLE_NOPS != 0 {
                            return Err(ScriptError::DiscourageUpgradableNops);
                        }
                    } else {
                        let lock_time = decode_num(top(stack, 1)?, require_minimal, LOCKTIME_NUM_SIZE)?;
                        if lock_time < 0 {
                            return Err(ScriptError::NegativeLockTime);
                        }
                        if !checker.check_lock_time(lock_time) {
                            return Err(ScriptError::UnsatisfiedLockTime);
                        }
                    }
                }
                OP_CHECKSEQUENCEVERIFY => {
                    if flags & SCRIPT_VERIFY_CHECKSEQUENCEVERIFY == 0 {
                        if flags & SCRIPT_VERIFY_DISCOURAGE_UPGRADABLE_NOPS != 0 {
                            return Err(ScriptError::DiscourageUpgradableNops);
                        }
                    } else {
                        let sequence = decode_num(top(stack, 1)?, require_minimal, LOCKTIME_NUM_SIZE)?;
                        if sequence < 0 {
                            return Err(ScriptError::NegativeLockTime);
                        }
                        if sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG == 0
                            && !checker.check_sequence(sequence)
                        {
                            return Err(ScriptError::UnsatisfiedLockTime);
                        }
                    }
                }
                OP_NOP1 | OP_NOP4..=OP_NOP10 => {
                    if flags & SCRIPT_VERIFY_DISCOURAGE_UPGRADABLE_NOPS != 0 {
                        return Err(ScriptError::DiscourageUpgradableNops);
                    }
                }

                OP_IF | OP_NOTIF => {
                    let mut value = false;
                    if exec {
                        let condition = stack.last().ok_or(ScriptError::UnbalancedConditional)?;
                        if sig_version == SigVersion::WitnessV0
                            && flags & SCRIPT_VERIFY_MINIMALIF != 0
                            && (condition.len() > 1 || (condition.len() == 1 && condition[0] != 1))
                        {
                            return Err(ScriptError::MinimalIf);
                        }
                        value = cast_to_bool(condition);
                        if opcode == OP_NOTIF {
                            value = !value;
                        }
                        stack.pop();
                    }
                    exec_stack.push(value);
                }
                OP_ELSE => {
                    let last = exec_stack
                        .last_mut()
                        .ok_or(ScriptError::UnbalancedConditional)?;
                    *last = !*last;
                }
                OP_ENDIF => {
                    exec_stack.pop().ok_or(ScriptError::UnbalancedConditional)?;
                }
                OP_VERIFY => {
                    if !cast_to_bool(top(stack, 1)?) {
                        return Err(ScriptError::Verify);
                    }
                    stack.pop();
                }
                OP_RETURN => return Err(ScriptError::OpReturn),

                OP_TOALTSTACK => {
                    let value = pop(stack)?;
                    altstack.push(value);
                }
                OP_FROMALTSTACK => {
                    let value = altstack
                        .pop()
                        .ok_or(ScriptError::InvalidAltstackOperation)?;
                    stack.push(value);
                }
                OP_2DROP => {
                    require(stack, 2)?;
                    stack.truncate(stack.len() - 2);
                }
                OP_2DUP => {
                    require(stack, 2)?;
                    let a = top(stack, 2)?.clone();
                    let b = top(stack, 1)?.clone();
                    stack.push(a);
                    stack.push(b);
                }
                OP_3DUP => {
                    require(stack, 3)?;
                    let a = top(stack, 3)?.clone();
                    let b = top(stack, 2)?.clone();
                    let c = top(stack, 1)?.clone();
                    stack.push(a);
                    stack.push(b);
                    stack.push(c);
                }
                OP_2OVER => {
                    require(stack, 4)?;
                    let a = top(stack, 4)?.clone();
                    let b = top(stack, 3)?.clone();
                    stack.push(a);
                    stack.push(b);
                }
                OP_2ROT => {
                    require(stack, 6)?;
                    let start = stack.len() - 6;
                    let moved: Vec<Vec<u8>> = stack.drain(start..start + 2).collect();
                    stack.extend(moved);
                }
                OP_2SWAP => {
                    require(stack, 4)?;
                    let len = stack.len();
                    stack.swap(len - 4, len - 2);
                    stack.swap(len - 3, len - 1);
                }
                OP_IFDUP => {
                    let value = top(stack, 1)?;
                    if cast_to_bool(value) {
                        let copy = value.clone();
                        stack.push(copy);
                    }
                }
                OP_DEPTH => {
                    let depth = stack.len() as i64;
                    stack.push(encode_num(depth));
                }
                OP_DROP => {
                    pop(stack)?;
                }
                OP_DUP => {
                    let value = top(stack, 1)?.clone();
                    stack.push(value);
                }
                OP_NIP => {
                    require(stack, 2)?;
                    let len = stack.len();
                    stack.remove(len - 2);
                }
                OP_OVER => {
                    let value = top(stack, 2)?.clone();
                    stack.push(value);
                }
                OP_PICK | OP_ROLL => {
                    require(stack, 2)?;
                    let n = decode_num(top(stack, 1)?, require_minimal, DEFAULT_NUM_SIZE)?;
                    stack.pop();
                    if n < 0 || n as usize >= stack.len() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let index = stack.len() - 1 - n as usize;
                    let value = if opcode == OP_ROLL {
                        stack.remove(index)
                    } else {
                        stack[index].clone()
                    };
                    stack.push(value);
                }
                OP_ROT => {
                    require(stack, 3)?;
                    let len = stack.len();
                    stack.swap(len - 3, len - 2);
                    stack.swap(len - 2, len - 1);
                }
                OP_SWAP => {
                    require(stack, 2)?;
                    let len = stack.len();
                    stack.swap(len - 2, len - 1);
                }
                OP_TUCK => {
                    require(stack, 2)?;
                    let value = top(stack, 1)?.clone();
                    let len = stack.len();
                    stack.insert(len - 2, value);
                }
                OP_SIZE => {
                    let size = top(stack, 1)?.len() as i64;
                    stack.push(encode_num(size));
                }

                OP_EQUAL | OP_EQUALVERIFY => {
                    require(stack, 2)?;
                    let equal = top(stack, 2)? == top(stack, 1)?;
                    stack.truncate(stack.len() - 2);
                    if opcode == OP_EQUALVERIFY {
                        if !equal {
                            return Err(ScriptError::EqualVerify);
                        }
                    } else {
                        stack.push(encode_bool(equal));
                    }
                }

                OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                    let n = decode_num(top(stack, 1)?, require_minimal, DEFAULT_NUM_SIZE)?;
                    let result = match opcode {
                        OP_1ADD => n + 1,
                        OP_1SUB => n - 1,
                        OP_NEGATE => -n,
                        OP_ABS => n.abs(),
                        OP_NOT => (n == 0) as i64,
                        _ => (n != 0) as i64,
                    };
                    stack.pop();
                    stack.push(encode_num(result));
                }
                OP_ADD | OP_SUB | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMEQUALVERIFY
                | OP_NUMNOTEQUAL | OP_LESSTHAN | OP_GREATERTHAN | OP_LESSTHANOREQUAL
                | OP_GREATERTHANOREQUAL | OP_MIN | OP_MAX => {
                    require(stack, 2)?;
                    let a = decode_num(top(stack, 2)?, require_minimal, DEFAULT_NUM_SIZE)?;
                    let b = decode_num(top(stack, 1)?, require_minimal, DEFAULT_NUM_SIZE)?;
                    let result = match opcode {
                        OP_ADD => a + b,
                        OP_SUB => a - b,
                        OP_BOOLAND => (a != 0 && b != 0) as i64,
                        OP_BOOLOR => (a != 0 || b != 0) as i64,
                        OP_NUMEQUAL | OP_NUMEQUALVERIFY => (a == b) as i64,
                        OP_NUMNOTEQUAL => (a != b) as i64,
                        OP_LESSTHAN => (a < b) as i64,
                        OP_GREATERTHAN => (a > b) as i64,
                        OP_LESSTHANOREQUAL => (a <= b) as i64,
                        OP_GREATERTHANOREQUAL => (a >= b) as i64,
                        OP_MIN => a.min(b),
                        _ => a.max(b),
                    };
                    stack.truncate(stack.len() - 2);
                    if opcode == OP_NUMEQUALVERIFY {
                        if result == 0 {
                            return Err(ScriptError::NumEqualVerify);
                        }
                    } else {
                        stack.push(encode_num(result));
                    }
                }
                OP_WITHIN => {
                    require(stack, 3)?;
                    let value = decode_num(top(stack, 3)?, require_minimal, DEFAULT_NUM_SIZE)?;
                    let min = decode_num(top(stack, 2)?, require_minimal, DEFAULT_NUM_SIZE)?;
                    let max = decode_num(top(stack, 1)?, require_minimal, DEFAULT_NUM_SIZE)?;
                    stack.truncate(stack.len() - 3);
                    stack.push(encode_bool(min <= value && value < max));
                }

                OP_RIPEMD160 | OP_SHA1 | OP_SHA256 | OP_HASH160 | OP_HASH256 => {
                    let data = pop(stack)?;
                    let digest = match opcode {
                        OP_RIPEMD160 => Ripemd160::digest(&data).to_vec(),
                        OP_SHA1 => Sha1::digest(&data).to_vec(),
                        OP_SHA256 => sha256(&data).to_vec(),
                        OP_HASH160 => hash160(&data).to_vec(),
                        _ => sha256d(&data).to_vec(),
                    };
                    stack.push(digest);
                }
                OP_CODESEPARATOR => {
                    code_start = cursor;
                }
                OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                    require(stack, 2)?;
                    let sig = top(stack, 2)?.clone();
                    let pubkey = top(stack, 1)?.clone();
                    let mut script_code = script[code_start..].to_vec();
                    if sig_version == SigVersion::Base {
                        let found = find_and_delete(&mut script_code, &push_data(&sig));
                        if found > 0 && flags & SCRIPT_VERIFY_CONST_SCRIPTCODE != 0 {
                            return Err(ScriptError::SigFindAndDelete);
                        }
                    }
                    check_signature_encoding(&sig, flags)?;
                    check_pubkey_encoding(&pubkey, flags, sig_version)?;
                    let success = checker.check_sig(&sig, &pubkey, &script_code, sig_version);
                    if !success && flags & SCRIPT_VERIFY_NULLFAIL != 0 && !sig.is_empty() {
                        return Err(ScriptError::SigNullFail);
                    }
                    stack.truncate(stack.len() - 2);
                    if opcode == OP_CHECKSIGVERIFY {
                        if !success {
                            return Err(ScriptError::CheckSigVerify);
                        }
                    } else {
                        stack.push(encode_bool(success));
                    }
                }
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    let success = check_multisig(
                        stack,
                        &script[code_start..],
                        flags,
                        checker,
                        sig_version,
                        &mut op_count,
                    )?;
                    if opcode == OP_CHECKMULTISIGVERIFY {
                        if !success {
                            return Err(ScriptError::CheckMultisigVerify);
                        }
                    } else {
                        stack.push(encode_bool(success));
                    }
                }

                _ => {
                    resync_log::log_trace!("bad opcode 0x{opcode:02x} at offset {}", cursor - 1);
                    return Err(ScriptError::BadOpcode);
                }
            }
        }

        if stack.len() + altstack.len() > MAX_STACK_SIZE {
            return Err(ScriptError::StackSize);
        }
    }

    if !exec_stack.is_empty() {
        return Err(ScriptError::UnbalancedConditional);
    }
    Ok(())
}

/// Pops the multisig operands and returns whether enough signatures matched.
/// The result is not pushed.
fn check_multisig(
    stack: &mut Stack,
    script_code: &[u8],
    flags: ScriptFlags,
    checker: &dyn SignatureChecker,
    sig_version: SigVersion,
    op_count: &mut usize,
) -> Result<bool, ScriptError> {
    let require_minimal = flags & SCRIPT_VERIFY_MINIMALDATA != 0;
    let mut i = 1usize;
    let key_count = decode_num(top(stack, i)?, require_minimal, DEFAULT_NUM_SIZE)?;
    if !(0..=MAX_PUBKEYS_PER_MULTISIG).contains(&key_count) {
        return Err(ScriptError::PubkeyCount);
    }
    let mut key_count = key_count as usize;
    *op_count += key_count;
    if *op_count > MAX_OPS_PER_SCRIPT {
        return Err(ScriptError::OpCount);
    }
    i += 1;
    let mut key_index = i;
    // Operands still owed a NULLFAIL check when popped.
    let mut keys_to_pop = key_count + 2;
    i += key_count;
    let sig_count = decode_num(top(stack, i)?, require_minimal, DEFAULT_NUM_SIZE)?;
    if sig_count < 0 || sig_count as usize > key_count {
        return Err(ScriptError::SigCount);
    }
    let mut sig_count = sig_count as usize;
    i += 1;
    let mut sig_index = i;
    i += sig_count;
    require(stack, i)?;

    let mut script_code = script_code.to_vec();
    if sig_version == SigVersion::Base {
        for k in 0..sig_count {
            let sig = top(stack, sig_index + k)?.clone();
            let found = find_and_delete(&mut script_code, &push_data(&sig));
            if found > 0 && flags & SCRIPT_VERIFY_CONST_SCRIPTCODE != 0 {
                return Err(ScriptError::SigFindAndDelete);
            }
        }
    }

    let mut success = true;
    while success && sig_count > 0 {
        let sig = top(stack, sig_index)?;
        let pubkey = top(stack, key_index)?;
        check_signature_encoding(sig, flags)?;
        check_pubkey_encoding(pubkey, flags, sig_version)?;
        if checker.check_sig(sig, pubkey, &script_code, sig_version) {
            sig_index += 1;
            sig_count -= 1;
        }
        key_index += 1;
        key_count -= 1;
        if sig_count > key_count {
            success = false;
        }
    }

    while i > 1 {
        i -= 1;
        if !success
            && flags & SCRIPT_VERIFY_NULLFAIL != 0
            && keys_to_pop == 0
            && !top(stack, 1)?.is_empty()
        {
            return Err(ScriptError::SigNullFail);
        }
        keys_to_pop = keys_to_pop.saturating_sub(1);
        stack.pop();
    }

    // The extra element consumed by the historical off-by-one.
    let dummy = top(stack, 1)?;
    if flags & SCRIPT_VERIFY_NULLDUMMY != 0 && !dummy.is_empty() {
        return Err(ScriptError::SigNullDummy);
    }
    stack.pop();
    Ok(success)
}

/// Reads one operation, returning the opcode and its push payload (empty for
/// non-push opcodes). A truncated push is `BadOpcode`.
pub fn next_op<'a>(script: &'a [u8], cursor: &mut usize) -> Result<(u8, &'a [u8]), ScriptError> {
    let opcode = *script.get(*cursor).ok_or(ScriptError::BadOpcode)?;
    *cursor += 1;
    let len = match opcode {
        0x01..=0x4b => opcode as usize,
        OP_PUSHDATA1 => read_le(script, cursor, 1)?,
        OP_PUSHDATA2 => read_le(script, cursor, 2)?,
        OP_PUSHDATA4 => read_le(script, cursor, 4)?,
        _ => return Ok((opcode, &[])),
    };
    let end = cursor
        .checked_add(len)
        .filter(|end| *end <= script.len())
        .ok_or(ScriptError::BadOpcode)?;
    let data = &script[*cursor..end];
    *cursor = end;
    Ok((opcode, data))
}

fn read_le(script: &[u8], cursor: &mut usize, width: usize) -> Result<usize, ScriptError> {
    let end = *cursor + width;
    let bytes = script.get(*cursor..end).ok_or(ScriptError::BadOpcode)?;
    *cursor = end;
    Ok(bytes
        .iter()
        .rev()
        .fold(0usize, |acc, byte| (acc << 8) | *byte as usize))
}

pub fn is_push_only(script: &[u8]) -> bool {
    let mut cursor = 0usize;
    while cursor < script.len() {
        match next_op(script, &mut cursor) {
            Ok((opcode, _)) if opcode <= OP_16 => {}
            _ => return false,
        }
    }
    true
}

pub fn is_p2sh(script_pubkey: &[u8]) -> bool {
    script_pubkey.len() == 23
        && script_pubkey[0] == OP_HASH160
        && script_pubkey[1] == 0x14
        && script_pubkey[22] == OP_EQUAL
}

/// Splits a witness program into (version, program).
pub fn witness_program(script: &[u8]) -> Option<(u8, &[u8])> {
    if script.len() < 4 || script.len() > 42 {
        return None;
    }
    let version = match script[0] {
        OP_0 => 0,
        op @ OP_1..=OP_16 => op - OP_1 + 1,
        _ => return None,
    };
    if script[1] as usize + 2 != script.len() {
        return None;
    }
    Some((version, &script[2..]))
}

pub fn cast_to_bool(data: &[u8]) -> bool {
    for (index, byte) in data.iter().enumerate() {
        if *byte != 0 {
            return !(index == data.len() - 1 && *byte == 0x80);
        }
    }
    false
}

/// Decodes a minimally sized little-endian sign-magnitude number.
pub fn decode_num(data: &[u8], require_minimal: bool, max_size: usize) -> Result<i64, ScriptError> {
    if data.len() > max_size {
        return Err(ScriptError::InvalidNumber);
    }
    let Some(&last) = data.last() else {
        return Ok(0);
    };
    if require_minimal
        && last & 0x7f == 0
        && (data.len() <= 1 || data[data.len() - 2] & 0x80 == 0)
    {
        return Err(ScriptError::InvalidNumber);
    }
    let mut result: i64 = 0;
    for (i, byte) in data.iter().enumerate() {
        result |= (*byte as i64) << (8 * i);
    }
    if last & 0x80 != 0 {
        result &= !(0x80i64 << (8 * (data.len() - 1)));
        result = -result;
    }
    Ok(result)
}

pub fn encode_num(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let mut abs = value.unsigned_abs();
    let mut result = Vec::new();
    while abs > 0 {
        result.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    if let Some(last) = result.last_mut() {
        if *last & 0x80 != 0 {
            result.push(if value < 0 { 0x80 } else { 0 });
        } else if value < 0 {
            *last |= 0x80;
        }
    }
    result
}

fn encode_bool(value: bool) -> Vec<u8> {
    if value {
        vec![1]
    } else {
        Vec::new()
    }
}

fn pop(stack: &mut Stack) -> Result<Vec<u8>, ScriptError> {
    stack.pop().ok_or(ScriptError::InvalidStackOperation)
}

/// Element `depth` positions from the top (1 = top).
fn top(stack: &Stack, depth: usize) -> Result<&Vec<u8>, ScriptError> {
    stack
        .len()
        .checked_sub(depth)
        .and_then(|index| stack.get(index))
        .ok_or(ScriptError::InvalidStackOperation)
}

fn require(stack: &Stack, count: usize) -> Result<(), ScriptError> {
    if stack.len() < count {
        return Err(ScriptError::InvalidStackOperation);
    }
    Ok(())
}

/// Script fragment that pushes `data`.
pub fn push_data(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 5);
    if data.len() < OP_PUSHDATA1 as usize {
        out.push(data.len() as u8);
    } else if data.len() <= 0xff {
        out.push(OP_PUSHDATA1);
        out.push(data.len() as u8);
    } else if data.len() <= 0xffff {
        out.push(OP_PUSHDATA2);
        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    } else {
        out.push(OP_PUSHDATA4);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
    out
}

/// Removes every op-aligned occurrence of `pattern` from `script`.
fn find_and_delete(script: &mut Vec<u8>, pattern: &[u8]) -> usize {
    if pattern.is_empty() {
        return 0;
    }
    let mut result = Vec::with_capacity(script.len());
    let mut found = 0usize;
    let mut pc = 0usize;
    let mut copied_to = 0usize;
    loop {
        result.extend_from_slice(&script[copied_to..pc]);
        while script.len() - pc >= pattern.len() && script[pc..pc + pattern.len()] == *pattern {
            pc += pattern.len();
            found += 1;
        }
        copied_to = pc;
        if pc >= script.len() || next_op(script, &mut pc).is_err() {
            break;
        }
    }
    if found > 0 {
        result.extend_from_slice(&script[copied_to..]);
        *script = result;
    }
    found
}

fn check_minimal_push(data: &[u8], opcode: u8) -> bool {
    if data.is_empty() {
        return opcode == OP_0;
    }
    if data.len() == 1 && (1..=16).contains(&data[0]) {
        return opcode == OP_1 + (data[0] - 1);
    }
    if data.len() == 1 && data[0] == 0x81 {
        return opcode == OP_1NEGATE;
    }
    if data.len() <= 75 {
        return opcode == data.len() as u8;
    }
    if data.len() <= 255 {
        return opcode == OP_PUSHDATA1;
    }
    if data.len() <= 65535 {
        return opcode == OP_PUSHDATA2;
    }
    true
}

/// Strict DER check from BIP66, on a signature that still carries its hash type byte.
fn is_valid_signature_encoding(sig: &[u8]) -> bool {
    let len = sig.len();
    if !(9..=73).contains(&len) {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != len - 3 {
        return false;
    }
    let len_r = sig[3] as usize;
    if 5 + len_r >= len {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_r + len_s + 7 != len {
        return false;
    }
    if sig[2] != 0x02 || len_r == 0 || sig[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }
    if sig[len_r + 4] != 0x02 || len_s == 0 || sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0 {
        return false;
    }
    true
}

fn check_signature_encoding(sig: &[u8], flags: ScriptFlags) -> Result<(), ScriptError> {
    if sig.is_empty() {
        return Ok(());
    }
    if flags & (SCRIPT_VERIFY_DERSIG | SCRIPT_VERIFY_LOW_S | SCRIPT_VERIFY_STRICTENC) != 0
        && !is_valid_signature_encoding(sig)
    {
        return Err(ScriptError::SigDer);
    }
    if flags & SCRIPT_VERIFY_LOW_S != 0 && is_high_s(&sig[..sig.len() - 1]) {
        return Err(ScriptError::SigHighS);
    }
    if flags & SCRIPT_VERIFY_STRICTENC != 0 {
        let hash_type = SighashType(sig[sig.len() - 1] as u32);
        if !hash_type.is_defined() {
            return Err(ScriptError::SigHashType);
        }
    }
    Ok(())
}

fn check_pubkey_encoding(
    pubkey: &[u8],
    flags: ScriptFlags,
    sig_version: SigVersion,
) -> Result<(), ScriptError> {
    let compressed = pubkey.len() == 33 && (pubkey[0] == 0x02 || pubkey[0] == 0x03);
    let uncompressed = pubkey.len() == 65 && pubkey[0] == 0x04;
    if flags & SCRIPT_VERIFY_STRICTENC != 0 && !(compressed || uncompressed) {
        return Err(ScriptError::PubkeyType);
    }
    if flags & SCRIPT_VERIFY_WITNESS_PUBKEYTYPE != 0
        && sig_version == SigVersion::WitnessV0
        && !compressed
    {
        return Err(ScriptError::WitnessPubkeyType);
    }
    Ok(())
}
