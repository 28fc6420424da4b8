//! Block identifiers and per-block record codes, adapted from the
//! standard LLVM bitstream schema. Only the variants this backend's
//! opcode lowering table (§4.2) actually dispatches on are kept; the
//! rest of the upstream vocabulary is irrelevant to a shader IR and
//! would just be dead match arms.

use num_enum::TryFromPrimitive;

/// Identifies which logical block a `BlockHeader` opened.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, TryFromPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum BlockId {
    Module = 8,
    ParamAttr = 9,
    ParamAttrGroup = 10,
    /// `CONSTANTS_BLOCK_ID`
    Constants = 11,
    /// `FUNCTION_BLOCK_ID`
    Function = 12,
    Identification = 13,
    /// `VALUE_SYMTAB_BLOCK_ID`
    ValueSymtab = 14,
    Metadata = 15,
    MetadataAttachment = 16,
    /// `TYPE_BLOCK_ID_NEW`
    Type = 17,
    Strtab = 23,
}

/// Module-level record codes (`MODULE_CODE_*`).
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum ModuleCode {
    Version = 1,
    /// `[type, callingconv, isproto, linkage, paramattrs, alignment, section, visibility, gc, unnamed_addr]`
    Function = 8,
}

/// `TYPE_BLOCK_ID_NEW` record codes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum TypeCode {
    NumEntry = 1,
    Void = 2,
    Float = 3,
    Double = 4,
    Label = 5,
    /// `[width]`
    Integer = 7,
    /// `[num_elements, elements_type]`
    Array = 11,
    /// `[num_elements, elements_type]`
    Vector = 12,
    /// `[vararg, retty, paramty x N]`
    Function = 21,
}

/// `CONSTANTS_BLOCK_ID` record codes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum ConstantsCode {
    /// `[typeid]`, sets the implicit current type for records that follow.
    Settype = 1,
    Null = 2,
    Undef = 3,
    /// `[intval]`, encoded with the sign bit as the low bit (VBR signed form).
    Integer = 4,
    /// `[fpval]`
    Float = 6,
}

/// `FUNCTION_BLOCK_ID` record codes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum FunctionCode {
    /// `[n]`, n - 1 additional blocks beyond the entry are allocated.
    DeclareBlocks = 1,
    /// `[opcode, ty, opval, opval]`
    BinOp = 2,
    /// `[opcode, ty, opty, opval]`
    Cast = 3,
    /// `[opty, opval, opval, pred]`
    Cmp2 = 28,
    /// `[opty, pval (both optional)]`
    Ret = 10,
    /// `[bb#, bb#, cond]` or `[bb#]`
    Br = 11,
    /// `[opty, op0, op1, ...]`
    Switch = 12,
    Unreachable = 15,
    /// `[ty, val0, b0, ...]`
    Phi = 16,
    /// `[instty, opty, op, align]`
    Alloca = 19,
    /// `[opty, op, align, vol]`
    Load = 20,
    /// `[ptrty, ptr, valty, val, align, vol]`
    Store = 44,
    /// `[attr, cc, fnty, fnid, args...]`
    Call = 34,
}

/// `VALUE_SYMTAB_BLOCK_ID` record codes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum ValueSymtabCode {
    /// `[valueid, namechar x N]`
    Entry = 1,
    /// `[bbid, namechar x N]`
    BbEntry = 2,
}

/// Fixed abbreviation ids every bitstream reserves before any
/// `DEFINE_ABBREV`-declared abbreviation starts at 4.
pub mod abbrev_id {
    pub const END_BLOCK: u64 = 0;
    pub const ENTER_SUBBLOCK: u64 = 1;
    pub const DEFINE_ABBREV: u64 = 2;
    pub const UNABBREV_RECORD: u64 = 3;
}

/// Binary-op sub-opcode carried by `FunctionCode::BinOp`'s first operand,
/// matching `LLVMBinOp` in the original.
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum BitcodeBinOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    UDiv = 3,
    SDiv = 4,
    URem = 5,
    SRem = 6,
    Shl = 7,
    LShr = 8,
    AShr = 9,
    And = 10,
    Or = 11,
    Xor = 12,
}

/// Cast sub-opcode carried by `FunctionCode::Cast`'s first operand.
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum BitcodeCastOp {
    Trunc = 0,
    ZExt = 1,
    SExt = 2,
    FpToUi = 3,
    FpToSi = 4,
    UiToFp = 5,
    SiToFp = 6,
    FpTrunc = 7,
    FpExt = 8,
    BitCast = 11,
}

/// Predicate carried by `FunctionCode::Cmp2`'s last operand. Values
/// below 32 are float predicates, 32 and above are integer predicates,
/// mirroring `llvm::CmpInst::Predicate`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum BitcodePredicate {
    FOeq = 1,
    FOlt = 4,
    FOgt = 2,
    FOle = 5,
    FOge = 3,
    FOne = 6,
    IEq = 32,
    INe = 33,
    IUgt = 34,
    IUge = 35,
    IUlt = 36,
    IUle = 37,
    ISgt = 38,
    ISge = 39,
    ISlt = 40,
    ISle = 41,
}
