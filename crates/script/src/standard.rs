//! Standard output script classification, used to label failing inputs.

use crate::interpreter::{is_p2sh, witness_program};
use crate::opcodes::{OP_1, OP_16, OP_CHECKMULTISIG, OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160, OP_RETURN};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScriptType {
    P2Pk,
    P2Pkh,
    P2Sh,
    Multisig,
    NullData,
    P2Wpkh,
    P2Wsh,
    WitnessUnknown,
    Unknown,
}

impl ScriptType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptType::P2Pk => "pubkey",
            ScriptType::P2Pkh => "pubkeyhash",
            ScriptType::P2Sh => "scripthash",
            ScriptType::Multisig => "multisig",
            ScriptType::NullData => "nulldata",
            ScriptType::P2Wpkh => "witness_v0_keyhash",
            ScriptType::P2Wsh => "witness_v0_scripthash",
            ScriptType::WitnessUnknown => "witness_unknown",
            ScriptType::Unknown => "nonstandard",
        }
    }
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify_script_pubkey(script: &[u8]) -> ScriptType {
    if is_p2pkh(script) {
        ScriptType::P2Pkh
    } else if is_p2sh(script) {
        ScriptType::P2Sh
    } else if let Some((version, program)) = witness_program(script) {
        match (version, program.len()) {
            (0, 20) => ScriptType::P2Wpkh,
            (0, 32) => ScriptType::P2Wsh,
            _ => ScriptType::WitnessUnknown,
        }
    } else if is_p2pk(script) {
        ScriptType::P2Pk
    } else if script.first() == Some(&OP_RETURN) {
        ScriptType::NullData
    } else if is_bare_multisig(script) {
        ScriptType::Multisig
    } else {
        ScriptType::Unknown
    }
}

fn is_p2pkh(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

fn is_p2pk(script: &[u8]) -> bool {
    let key_len = match script.first().copied() {
        Some(len @ 33) => len,
        Some(len @ 65) => len,
        _ => return false,
    };

    let expected_len = key_len as usize + 2;
    script.len() == expected_len && script[script.len() - 1] == OP_CHECKSIG
}

// <m> <key>... <n> OP_CHECKMULTISIG with 33/65-byte keys.
fn is_bare_multisig(script: &[u8]) -> bool {
    let (Some(&first), Some(&last)) = (script.first(), script.last()) else {
        return false;
    };
    if last != OP_CHECKMULTISIG || !(OP_1..=OP_16).contains(&first) || script.len() < 3 {
        return false;
    }
    let n_op = script[script.len() - 2];
    if !(OP_1..=OP_16).contains(&n_op) {
        return false;
    }
    let mut cursor = 1usize;
    let mut keys = 0u8;
    while cursor < script.len() - 2 {
        let len = script[cursor] as usize;
        if len != 33 && len != 65 {
            return false;
        }
        cursor += 1 + len;
        keys += 1;
    }
    cursor == script.len() - 2 && keys == n_op - OP_1 + 1 && first <= n_op
}
