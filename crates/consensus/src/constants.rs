//! Historical chain constants used when replaying old blocks.

use crate::Hash256;

/// BIP66 (strict DER signatures) activation height.
pub const BIP66_HEIGHT: u32 = 363_725;
/// BIP65 (OP_CHECKLOCKTIMEVERIFY) activation height.
pub const BIP65_HEIGHT: u32 = 388_381;
/// First height at which upgradable NOPs are rejected. The last offender was
/// tx 03d7e1fa4d5fefa169431f24f7798552861b255cd55d377066fedcd088fb0e99 at 212614.
pub const UPGRADABLE_NOPS_HEIGHT: u32 = 212_615;

/// The one block validated without P2SH evaluation after BIP16,
/// 00000000000002dc756eebf4f49723ed8d30cc28a5f108eb94b1ba88ac4f9c22.
pub const BIP16_EXCEPTION_BLOCK: Hash256 = [
    0x22, 0x9c, 0x4f, 0xac, 0x88, 0xba, 0xb1, 0x94,
    0xeb, 0x08, 0xf1, 0xa5, 0x28, 0xcc, 0x30, 0x8d,
    0xed, 0x23, 0x97, 0xf4, 0xf4, 0xeb, 0x6e, 0x75,
    0xdc, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Transactions whose scripts predate minimal-push enforcement:
/// 0f24294a1d23efbb49c1765cf443fba7930702752aba6d765870082fe4f13cae and
/// 7caed7650c392c24e44a093f30438fe6dc9ec1154b92bedc8a561130c9c50920.
pub const MINIMALDATA_EXCEPTION_TXIDS: [Hash256; 2] = [
    [
        0xae, 0x3c, 0xf1, 0xe4, 0x2f, 0x08, 0x70, 0x58,
        0x76, 0x6d, 0xba, 0x2a, 0x75, 0x02, 0x07, 0x93,
        0xa7, 0xfb, 0x43, 0xf4, 0x5c, 0x76, 0xc1, 0x49,
        0xbb, 0xef, 0x23, 0x1d, 0x4a, 0x29, 0x24, 0x0f,
    ],
    [
        0x20, 0x09, 0xc5, 0xc9, 0x30, 0x11, 0x56, 0x8a,
        0xdc, 0xbe, 0x92, 0x4b, 0x15, 0xc1, 0x9e, 0xdc,
        0xe6, 0x8f, 0x43, 0x30, 0x3f, 0x09, 0x4a, 0xe4,
        0x24, 0x2c, 0x39, 0x0c, 0x65, 0xd7, 0xae, 0x7c,
    ],
];

/// Maximum script size (consensus).
pub const MAX_SCRIPT_SIZE: usize = 10_000;
/// Maximum size of a single stack element.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
/// Maximum number of non-push opcodes per script.
pub const MAX_OPS_PER_SCRIPT: usize = 201;
/// Maximum combined size of the main and alt stacks.
pub const MAX_STACK_SIZE: usize = 1_000;
/// Maximum number of public keys in a CHECKMULTISIG.
pub const MAX_PUBKEYS_PER_MULTISIG: i64 = 20;
/// nLockTime values below this are block heights, above are timestamps.
pub const LOCKTIME_THRESHOLD: i64 = 500_000_000;
