//! Shader/pipeline state held by the scheduler (§3 "Shader state"/
//! "Pipeline state"), and the bitcode-vs-SPIR backend dispatch (§6
//! "Bytecode container", picked "by magic number" per §5's compile
//! description).

use fxhash::FxHashMap;

use crate::key::InstrumentationKey;

pub type ShaderUid = u64;
pub type PipelineUid = u64;

/// A parsed program plus whichever backend's side tables its compile
/// step needs, tagged by which backend produced it.
pub enum ParsedProgram {
    Bitcode(instrument_bitcode::ParsedModule),
    Spir(instrument_spir::ParsedModule),
}

impl ParsedProgram {
    pub fn program(&self) -> &instrument_il::Program {
        match self {
            ParsedProgram::Bitcode(m) => &m.program,
            ParsedProgram::Spir(m) => &m.program,
        }
    }

    /// A private copy for one compile job (§5 "Shared-resource policy").
    /// Only `Program` actually needs forking (`Program::fork`'s contract,
    /// C1); the backend side tables (`value_type`/`type_of`/`base_ids`/
    /// `symbols`/`sections`/`words`) are keyed by `TypeId`/`ConstId`
    /// values that `fork` preserves numerically identical, since it
    /// re-interns into a fresh, initially empty destination map in the
    /// same enumeration order as the source — the first intern of each
    /// distinct type/constant is guaranteed the same index it had in the
    /// original. So those tables are cloned verbatim rather than
    /// recomputed.
    pub fn fork(&self) -> ParsedProgram {
        match self {
            ParsedProgram::Bitcode(m) => ParsedProgram::Bitcode(instrument_bitcode::ParsedModule {
                program: m.program.fork(),
                entry_func: m.entry_func,
                type_of: m.type_of.clone(),
                symbols: m.symbols.clone(),
                base_ids: m.base_ids.clone(),
                value_type: m.value_type.clone(),
            }),
            ParsedProgram::Spir(m) => ParsedProgram::Spir(instrument_spir::ParsedModule {
                header: m.header,
                sections: m.sections.clone(),
                words: m.words.clone(),
                program: m.program.fork(),
                entry_func: m.entry_func,
                value_of: m.value_of.clone(),
                type_of: m.type_of.clone(),
                next_numeric_id: m.next_numeric_id,
            }),
        }
    }

    pub fn inject(&mut self, registry: &instrument_features::FeatureRegistry, enabled: instrument_features::FeatureSet) {
        let program = match self {
            ParsedProgram::Bitcode(m) => &mut m.program,
            ParsedProgram::Spir(m) => &mut m.program,
        };
        registry.inject_all(program, enabled);
    }

    pub fn compile(&mut self, export_set: u32, stream_count: u32) -> Result<Vec<u32>> {
        match self {
            ParsedProgram::Bitcode(m) => instrument_bitcode::compile_module(m).map_err(CompileError::Bitcode),
            ParsedProgram::Spir(m) => {
                instrument_spir::recompile_module(m, export_set, stream_count).map_err(CompileError::Spir)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Bitcode(#[from] instrument_bitcode::BitcodeError),
    #[error(transparent)]
    Spir(#[from] instrument_spir::SpirError),
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Detect which backend owns `bytecode` by its leading magic number (§6,
/// §5 "recompile via the shader's detected backend ... picked by magic
/// number") and parse it.
pub fn parse_shader(bytecode: &[u32]) -> Result<ParsedProgram> {
    if bytecode.first() == Some(&instrument_spir::header::MAGIC) {
        instrument_spir::parse_module(bytecode).map(ParsedProgram::Spir).map_err(CompileError::Spir)
    } else {
        instrument_bitcode::parse_module(bytecode).map(ParsedProgram::Bitcode).map_err(CompileError::Bitcode)
    }
}

pub struct ShaderEntry {
    pub bytecode: Vec<u32>,
    pub local_bits: u64,
    pub parsed: Option<ParsedProgram>,
    pub parse_failed: bool,
    pub variants: FxHashMap<InstrumentationKey, Vec<u32>>,
}

impl ShaderEntry {
    pub fn new(bytecode: Vec<u32>) -> Self {
        ShaderEntry { bytecode, local_bits: 0, parsed: None, parse_failed: false, variants: FxHashMap::default() }
    }

    pub fn has_variant(&self, key: &InstrumentationKey) -> bool {
        self.variants.contains_key(key)
    }
}

pub struct PipelineEntry {
    pub shaders: Vec<ShaderUid>,
    pub local_bits: u64,
}

impl PipelineEntry {
    pub fn new(shaders: Vec<ShaderUid>) -> Self {
        PipelineEntry { shaders, local_bits: 0 }
    }
}
