//! Script execution capability and the default interpreter behind it.

pub mod engine;
pub mod interpreter;
pub mod opcodes;
mod secp;
pub mod sighash;
pub mod standard;

pub use engine::{EngineError, Execution, InputContext, ScriptEngine, StandardEngine};
pub use interpreter::{cast_to_bool, ScriptError};
pub use sighash::SigVersion;
