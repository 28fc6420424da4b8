//! Parse, lower, recompile, and stitch a structured-SSA SPIR-style
//! bytecode (§4.3). Grounded in the `spirv` crate: the 5-word
//! header check (`Module::from_words`), the `(wordCount<<16)|opcode`
//! raw-instruction decode (`decode::decode_raw_instruction`), and the
//! edit-list-then-splice recompile shape (`edit.rs`'s
//! `into_vec_and_apply_edits`) — generalized here from a single flat edit
//! list to a per-section relocation stream, since §4.3 stitches in a
//! fixed section order rather than splicing at arbitrary points.

pub mod compile;
pub mod header;
pub mod parse;
pub mod prelude;
pub mod raw;
pub mod relocation;
pub mod sections;
pub mod stitch;

pub use compile::{recompile_function, recompile_module, CompileContext};
pub use header::ModuleHeader;
pub use parse::{parse_module, ParsedModule};
pub use prelude::{reserve_export_globals, ExportGlobals};
pub use sections::{SectionId, SectionMap};
pub use stitch::stitch_module;

#[derive(Debug, thiserror::Error)]
pub enum SpirError {
    #[error("word stream is shorter than a module header")]
    Truncated,
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("instruction at word {0} overruns the stream")]
    IncompleteInstruction(usize),
    #[error("reference to unknown result id {0}")]
    UnknownId(u32),
    #[error("block reorder failed during recompile: {0}")]
    Reorder(#[from] instrument_il::ReorderError),
}

pub type Result<T> = std::result::Result<T, SpirError>;
