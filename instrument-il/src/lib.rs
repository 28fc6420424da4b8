//! Language-independent SSA intermediate representation for shader
//! bytecode instrumentation.
//!
//! A `Program` holds a single shader's IL: an identifier space, interned
//! types and constants, a list of functions built of basic blocks of
//! `Instruction`s. Bytecode-specific backends (`instrument-bitcode`,
//! `instrument-spir`) parse their wire format into a `Program`, features
//! (`instrument-features`) mutate it through an `Emitter`, and the same
//! backend that parsed it recompiles it back to bytes.

pub mod block;
pub mod constants;
pub mod dom;
pub mod emitter;
pub mod function;
pub mod identifier;
pub mod ids;
pub mod instruction;
pub mod program;
pub mod reorder;
pub mod types;

pub use block::{BasicBlock, BasicBlockFlags};
pub use constants::{Constant, ConstantMap};
pub use dom::Dominators;
pub use emitter::Emitter;
pub use function::{Function, VerifyError};
pub use identifier::IdentifierMap;
pub use ids::{BlockId, ConstId, FuncId, GlobalId, TypeId, ValueDef, ValueId};
pub use instruction::{
    AtomicKind, BinOpKind, CastKind, CmpKind, Instruction, InstructionKind, ReduceKind, SourceSpan,
};
pub use program::{GlobalVar, Program};
pub use reorder::{reorder_by_dominant_blocks, ReorderError};
pub use types::{SamplerMode, TexelFormat, TextureDim, Type, TypeMap};

/// Crate-wide error type. Each variant wraps the failure type of one
/// fallible operation this crate exposes; callers that need to tell them
/// apart use `?` and match, everyone else just propagates with `?`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("SSA verification failed: {0}")]
    Verify(#[from] VerifyError),
    #[error("block reorder failed: {0}")]
    Reorder(#[from] ReorderError),
}

pub type Result<T> = std::result::Result<T, Error>;
