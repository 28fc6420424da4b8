//! Logical section partitioning (§4.3 "Contract and sections"). The
//! nine sections are ordered but not tagged on the wire — membership is
//! inferred from each instruction's opcode, exactly the rule §4.3 states
//! ("Section partitioning is logical, not on-wire").

use spirv_headers::Op;

use crate::raw::iter_raw;
use crate::Result;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum SectionId {
    Capabilities,
    Extensions,
    ImportedExtInst,
    MemoryModel,
    EntryPoint,
    ExecutionMode,
    DebugString,
    Annotation,
    Declarations,
    Function,
}

pub const SECTION_ORDER: [SectionId; 10] = [
    SectionId::Capabilities,
    SectionId::Extensions,
    SectionId::ImportedExtInst,
    SectionId::MemoryModel,
    SectionId::EntryPoint,
    SectionId::ExecutionMode,
    SectionId::DebugString,
    SectionId::Annotation,
    SectionId::Declarations,
    SectionId::Function,
];

/// Maps each section to the `[start, end)` word span (relative to the
/// post-header word stream) it occupies in the *original* module.
#[derive(Debug, Default, Clone)]
pub struct SectionMap {
    spans: Vec<(SectionId, usize, usize)>,
}

impl SectionMap {
    pub fn span(&self, id: SectionId) -> Option<(usize, usize)> {
        self.spans.iter().find(|(s, ..)| *s == id).map(|&(_, a, b)| (a, b))
    }

    pub fn words_of<'a>(&self, id: SectionId, words: &'a [u32]) -> &'a [u32] {
        match self.span(id) {
            Some((a, b)) => &words[a..b],
            None => &[],
        }
    }
}

/// Classify the opcode of the instruction at each position in the
/// post-header stream into one of the nine sections, then collapse
/// consecutive same-section runs into spans. Every instruction after the
/// first `OpFunction` belongs to `Function` (functions don't interleave
/// with declarations in a valid module).
pub fn scan_sections(words: &[u32]) -> Result<SectionMap> {
    let mut spans: Vec<(SectionId, usize, usize)> = Vec::new();
    let mut in_function = false;

    for item in iter_raw(words, 0) {
        let (offset, inst) = item?;
        let end = offset + inst.word_count as usize;
        if inst.opcode == Op::Function as u16 {
            in_function = true;
        }
        let section = if in_function { SectionId::Function } else { classify(inst.opcode) };
        match spans.last_mut() {
            Some((s, _, b)) if *s == section => *b = end,
            _ => spans.push((section, offset, end)),
        }
    }

    Ok(SectionMap { spans })
}

fn classify(opcode: u16) -> SectionId {
    if opcode == Op::Capability as u16 {
        SectionId::Capabilities
    } else if opcode == Op::Extension as u16 {
        SectionId::Extensions
    } else if opcode == Op::ExtInstImport as u16 {
        SectionId::ImportedExtInst
    } else if opcode == Op::MemoryModel as u16 {
        SectionId::MemoryModel
    } else if opcode == Op::EntryPoint as u16 {
        SectionId::EntryPoint
    } else if opcode == Op::ExecutionMode as u16 {
        SectionId::ExecutionMode
    } else if opcode == Op::String as u16 || opcode == Op::Source as u16 || opcode == Op::SourceExtension as u16 {
        SectionId::DebugString
    } else if opcode == Op::Name as u16
        || opcode == Op::MemberName as u16
        || opcode == Op::Decorate as u16
        || opcode == Op::MemberDecorate as u16
    {
        SectionId::Annotation
    } else {
        // Types, constants, global variables, and everything else that
        // precedes the first OpFunction.
        SectionId::Declarations
    }
}
