//! The tagged instruction envelope (§3 "Instruction"). Per Design Note 3,
//! the source's inheritance + `As<T>` downcast maps to a sum type: shared
//! fields (`result`, `source`) live on the envelope `Instruction`, and
//! `InstructionKind` is the per-variant payload.

use smallvec::SmallVec;

use crate::ids::{BlockId, ConstId, TypeId, ValueId};

/// Whether an instruction's original record can be copied through
/// unchanged on recompile, or must be re-synthesized from IL operands
/// (§3 "Source span").
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SourceSpan {
    /// Not derived from any original record (newly injected).
    None,
    /// Byte/word offset into the original bytecode; safe to copy
    /// verbatim as long as the instruction was not modified.
    Trivial(u32),
    /// Derived from an original record but mutated; must be re-emitted.
    Synthesized(u32),
}

impl SourceSpan {
    /// Mark a trivial span as needing re-synthesis. Used when a feature
    /// rewrites an instruction that was otherwise copyable.
    pub fn modify(self) -> SourceSpan {
        match self {
            SourceSpan::Trivial(off) => SourceSpan::Synthesized(off),
            other => other,
        }
    }

    pub fn is_trivially_copyable(self) -> bool {
        matches!(self, SourceSpan::Trivial(_))
    }

    pub fn original_offset(self) -> Option<u32> {
        match self {
            SourceSpan::Trivial(off) | SourceSpan::Synthesized(off) => Some(off),
            SourceSpan::None => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BinOpKind {
    Add, Sub, Mul, Div, Rem, Shl, Shr, BitAnd, BitOr, BitXor, And, Or,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CmpKind {
    Eq, Ne, Lt, Le, Gt, Ge,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReduceKind {
    Any,
    All,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CastKind {
    Trunc,
    BitCast,
    FloatToInt,
    IntToFloat,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AtomicKind {
    Add, Or, And, Xor, Min, Max, Exchange, CompareExchange,
}

#[derive(Clone, Debug)]
pub enum InstructionKind {
    // -- arithmetic / comparison / reduction / casts --
    BinOp { op: BinOpKind, lhs: ValueId, rhs: ValueId },
    Cmp { op: CmpKind, lhs: ValueId, rhs: ValueId, signed: bool },
    Reduce { op: ReduceKind, operand: ValueId },
    Cast { op: CastKind, operand: ValueId, dest_type: TypeId },

    // -- memory --
    Alloca { ty: TypeId },
    Load { ptr: ValueId },
    Store { ptr: ValueId, value: ValueId },

    // -- resource access --
    LoadBuffer { resource: ValueId, index: ValueId },
    StoreBuffer { resource: ValueId, index: ValueId, value: ValueId },
    LoadTexture { resource: ValueId, coord: ValueId },
    StoreTexture { resource: ValueId, coord: ValueId, value: ValueId },
    ResourceSize { resource: ValueId },
    ResourceToken { resource: ValueId },

    // -- control flow (terminators except Phi) --
    Branch { target: BlockId },
    BranchConditional {
        cond: ValueId,
        true_target: BlockId,
        false_target: BlockId,
        /// Structured-control-flow merge block, captured at parse time
        /// rather than re-inferred at recompile (Open Question 1 /
        /// SPEC_FULL.md §7.1).
        merge: Option<BlockId>,
    },
    Switch { selector: ValueId, default: BlockId, cases: SmallVec<[(i64, BlockId); 4]> },
    Phi { incomings: SmallVec<[(ValueId, BlockId); 4]> },
    Return { value: Option<ValueId> },
    Unreachable,

    // -- composite --
    Extract { aggregate: ValueId, index: u32 },
    Insert { aggregate: ValueId, index: u32, value: ValueId },
    Select { cond: ValueId, true_value: ValueId, false_value: ValueId },
    AddressChain { base: ValueId, indices: SmallVec<[ValueId; 4]> },

    // -- atomics --
    Atomic {
        op: AtomicKind,
        ptr: ValueId,
        value: ValueId,
        /// Only `CompareExchange` uses this.
        compare: Option<ValueId>,
    },

    // -- feature-specific --
    /// Appends a message to a feature's export stream; lowered by the
    /// backend into the GPU export sequence (§4.2 step 4, §4.3 "Export
    /// injects").
    Export { schema_id: u32, fields: SmallVec<[ValueId; 4]> },
    /// An immediate value materialized directly in a block (as opposed
    /// to an interned module-level `Constant`) — used by the Emitter's
    /// `Integral`/`UInt` style helpers.
    Literal { ty: TypeId, value: ConstId },

    /// Preserves an opcode we don't interpret, carrying its original
    /// operands (and, for calls, the original callee name) so it can be
    /// copied through unchanged (§3).
    Unexposed {
        opcode: u32,
        callee: Option<String>,
        operands: SmallVec<[ValueId; 4]>,
    },
}

#[derive(Clone, Debug)]
pub struct Instruction {
    pub result: Option<ValueId>,
    pub source: SourceSpan,
    pub kind: InstructionKind,
}

impl Instruction {
    pub fn new(kind: InstructionKind, result: Option<ValueId>, source: SourceSpan) -> Self {
        Instruction { result, source, kind }
    }

    /// `Branch | BranchConditional | Switch | Return | Unreachable`, per
    /// §3 "Function ... must end in a terminator". `Phi` is deliberately
    /// excluded: it is a control-flow-adjacent value instruction, not a
    /// block terminator.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::Branch { .. }
                | InstructionKind::BranchConditional { .. }
                | InstructionKind::Switch { .. }
                | InstructionKind::Return { .. }
                | InstructionKind::Unreachable
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self.kind, InstructionKind::Phi { .. })
    }

    /// Successor blocks referenced by a terminator, in the order the
    /// reorder pass and the recompiler both rely on.
    pub fn successors(&self) -> SmallVec<[BlockId; 4]> {
        match &self.kind {
            InstructionKind::Branch { target } => SmallVec::from_slice(&[*target]),
            InstructionKind::BranchConditional { true_target, false_target, .. } => {
                SmallVec::from_slice(&[*true_target, *false_target])
            }
            InstructionKind::Switch { default, cases, .. } => {
                let mut v = SmallVec::new();
                v.push(*default);
                v.extend(cases.iter().map(|(_, b)| *b));
                v
            }
            _ => SmallVec::new(),
        }
    }

    /// Non-terminator, non-phi operand value ids this instruction reads,
    /// used by the SSA dominance check (§8 "every instruction with
    /// operand o").
    pub fn operand_values(&self) -> SmallVec<[ValueId; 4]> {
        match &self.kind {
            InstructionKind::BinOp { lhs, rhs, .. } => SmallVec::from_slice(&[*lhs, *rhs]),
            InstructionKind::Cmp { lhs, rhs, .. } => SmallVec::from_slice(&[*lhs, *rhs]),
            InstructionKind::Reduce { operand, .. } => SmallVec::from_slice(&[*operand]),
            InstructionKind::Cast { operand, .. } => SmallVec::from_slice(&[*operand]),
            InstructionKind::Alloca { .. } => SmallVec::new(),
            InstructionKind::Load { ptr } => SmallVec::from_slice(&[*ptr]),
            InstructionKind::Store { ptr, value } => SmallVec::from_slice(&[*ptr, *value]),
            InstructionKind::LoadBuffer { resource, index } => {
                SmallVec::from_slice(&[*resource, *index])
            }
            InstructionKind::StoreBuffer { resource, index, value } => {
                SmallVec::from_slice(&[*resource, *index, *value])
            }
            InstructionKind::LoadTexture { resource, coord } => {
                SmallVec::from_slice(&[*resource, *coord])
            }
            InstructionKind::StoreTexture { resource, coord, value } => {
                SmallVec::from_slice(&[*resource, *coord, *value])
            }
            InstructionKind::ResourceSize { resource } => SmallVec::from_slice(&[*resource]),
            InstructionKind::ResourceToken { resource } => SmallVec::from_slice(&[*resource]),
            InstructionKind::Branch { .. } => SmallVec::new(),
            InstructionKind::BranchConditional { cond, .. } => SmallVec::from_slice(&[*cond]),
            InstructionKind::Switch { selector, .. } => SmallVec::from_slice(&[*selector]),
            InstructionKind::Phi { .. } => SmallVec::new(),
            InstructionKind::Return { value } => value.into_iter().collect(),
            InstructionKind::Unreachable => SmallVec::new(),
            InstructionKind::Extract { aggregate, .. } => SmallVec::from_slice(&[*aggregate]),
            InstructionKind::Insert { aggregate, value, .. } => {
                SmallVec::from_slice(&[*aggregate, *value])
            }
            InstructionKind::Select { cond, true_value, false_value } => {
                SmallVec::from_slice(&[*cond, *true_value, *false_value])
            }
            InstructionKind::AddressChain { base, indices } => {
                let mut v = SmallVec::new();
                v.push(*base);
                v.extend(indices.iter().copied());
                v
            }
            InstructionKind::Atomic { ptr, value, compare, .. } => {
                let mut v = SmallVec::new();
                v.push(*ptr);
                v.push(*value);
                v.extend(compare.iter().copied());
                v
            }
            InstructionKind::Export { fields, .. } => fields.clone(),
            InstructionKind::Literal { .. } => SmallVec::new(),
            InstructionKind::Unexposed { operands, .. } => operands.clone(),
        }
    }
}
