//! Script verification flags and per-height rule selection.

use crate::constants::{
    BIP16_EXCEPTION_BLOCK, BIP65_HEIGHT, BIP66_HEIGHT, MINIMALDATA_EXCEPTION_TXIDS,
    UPGRADABLE_NOPS_HEIGHT,
};
use crate::Hash256;

pub type ScriptFlags = u32;

pub const SCRIPT_VERIFY_NONE: ScriptFlags = 0;
pub const SCRIPT_VERIFY_P2SH: ScriptFlags = 1 << 0;
pub const SCRIPT_VERIFY_STRICTENC: ScriptFlags = 1 << 1;
pub const SCRIPT_VERIFY_DERSIG: ScriptFlags = 1 << 2;
pub const SCRIPT_VERIFY_LOW_S: ScriptFlags = 1 << 3;
pub const SCRIPT_VERIFY_NULLDUMMY: ScriptFlags = 1 << 4;
pub const SCRIPT_VERIFY_SIGPUSHONLY: ScriptFlags = 1 << 5;
pub const SCRIPT_VERIFY_MINIMALDATA: ScriptFlags = 1 << 6;
pub const SCRIPT_VERIFY_DISCOURAGE_UPGRADABLE_NOPS: ScriptFlags = 1 << 7;
pub const SCRIPT_VERIFY_CLEANSTACK: ScriptFlags = 1 << 8;
pub const SCRIPT_VERIFY_CHECKLOCKTIMEVERIFY: ScriptFlags = 1 << 9;
pub const SCRIPT_VERIFY_CHECKSEQUENCEVERIFY: ScriptFlags = 1 << 10;
pub const SCRIPT_VERIFY_WITNESS: ScriptFlags = 1 << 11;
pub const SCRIPT_VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM: ScriptFlags = 1 << 12;
pub const SCRIPT_VERIFY_MINIMALIF: ScriptFlags = 1 << 13;
pub const SCRIPT_VERIFY_NULLFAIL: ScriptFlags = 1 << 14;
pub const SCRIPT_VERIFY_WITNESS_PUBKEYTYPE: ScriptFlags = 1 << 15;
pub const SCRIPT_VERIFY_CONST_SCRIPTCODE: ScriptFlags = 1 << 16;

pub const MANDATORY_SCRIPT_VERIFY_FLAGS: ScriptFlags = SCRIPT_VERIFY_P2SH;
pub const STANDARD_SCRIPT_VERIFY_FLAGS: ScriptFlags = MANDATORY_SCRIPT_VERIFY_FLAGS
    | SCRIPT_VERIFY_DERSIG
    | SCRIPT_VERIFY_STRICTENC
    | SCRIPT_VERIFY_MINIMALDATA
    | SCRIPT_VERIFY_NULLDUMMY
    | SCRIPT_VERIFY_DISCOURAGE_UPGRADABLE_NOPS
    | SCRIPT_VERIFY_CLEANSTACK
    | SCRIPT_VERIFY_MINIMALIF
    | SCRIPT_VERIFY_NULLFAIL
    | SCRIPT_VERIFY_CHECKLOCKTIMEVERIFY
    | SCRIPT_VERIFY_CHECKSEQUENCEVERIFY
    | SCRIPT_VERIFY_LOW_S
    | SCRIPT_VERIFY_WITNESS
    | SCRIPT_VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM
    | SCRIPT_VERIFY_WITNESS_PUBKEYTYPE
    | SCRIPT_VERIFY_CONST_SCRIPTCODE;

/// Flags switched on by BIP66.
pub const BIP66_FLAGS: ScriptFlags =
    SCRIPT_VERIFY_STRICTENC | SCRIPT_VERIFY_DERSIG | SCRIPT_VERIFY_LOW_S;

/// Returns the script flags a historical validator enforced for one input of
/// `txid` in block `block_hash` at `height`.
pub fn script_flags_for(height: u32, block_hash: &Hash256, txid: &Hash256) -> ScriptFlags {
    let mut flags = STANDARD_SCRIPT_VERIFY_FLAGS;
    if height < BIP66_HEIGHT {
        flags &= !BIP66_FLAGS;
    }
    if height < BIP65_HEIGHT {
        flags &= !SCRIPT_VERIFY_CHECKLOCKTIMEVERIFY;
    }
    if height < UPGRADABLE_NOPS_HEIGHT {
        flags &= !SCRIPT_VERIFY_DISCOURAGE_UPGRADABLE_NOPS;
    }
    if *block_hash == BIP16_EXCEPTION_BLOCK {
        flags &= !SCRIPT_VERIFY_P2SH;
    }
    if MINIMALDATA_EXCEPTION_TXIDS.contains(txid) {
        flags &= !SCRIPT_VERIFY_MINIMALDATA;
    }
    flags
}
