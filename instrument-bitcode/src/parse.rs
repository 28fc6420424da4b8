//! Module- and function-level lowering into `instrument_il` (§4.2
//! "Parse" / "Function parse"), grounded in `DXILPhysicalBlockFunction.
//! cpp`'s per-record `switch` over `LLVMFunctionRecord` plus the
//! anchor/relative-id resolution it performs before the switch.

use fxhash::FxHashMap;
use instrument_il::{
    BasicBlock, BinOpKind, CastKind, CmpKind, Constant, Function, Instruction, InstructionKind,
    Program, SourceSpan, Type, TypeId, ValueDef, ValueId,
};
use smallvec::SmallVec;

use crate::codes::{BitcodeBinOp, BitcodeCastOp, BitcodePredicate, BlockId, ConstantsCode, FunctionCode, ModuleCode, TypeCode};
use crate::idmap::RelativeIdMap;
use crate::intrinsic::{self, ResourceOp};
use crate::reader::{self, BlockHeader, Record};
use crate::symbols::ValueSymbolTable;
use crate::{BitcodeError, Result};

pub struct ParsedModule {
    pub program: Program,
    pub entry_func: instrument_il::FuncId,
    pub type_of: FxHashMap<u32, TypeId>,
    pub symbols: Option<ValueSymbolTable>,
    /// Every module-scope value (function declarations, then interned
    /// constants) in anchor order, needed by `compile::compile_function`
    /// to reconstruct the same relative-id numbering on the way back out.
    pub base_ids: Vec<ValueId>,
    /// The per-value type map accumulated while parsing, handed to
    /// `compile` so it can pick the `{S,U,F}` opcode variant for a
    /// synthesized (feature-modified) instruction the same way parsing
    /// picked it for the original.
    pub value_type: FxHashMap<ValueId, TypeId>,
}

/// Shared module-level state every function parse needs: the type
/// table, the anchor-ordered list of module-scope values (function
/// declarations followed by interned constants), a running value -> type
/// map used to pick the signed/unsigned/float opcode variant at compile
/// time, and the absolute value-index each module-scope/value id was
/// issued under (so `Call` can recover a callee's value-symtab name from
/// its relative-id operand).
struct ModuleState {
    type_of: FxHashMap<u32, TypeId>,
    base_ids: Vec<ValueId>,
    value_type: FxHashMap<ValueId, TypeId>,
    value_index: FxHashMap<ValueId, u32>,
}

pub fn parse_module(words: &[u32]) -> Result<ParsedModule> {
    let root = reader::scan_module(words)?;
    let module_block = root
        .sub_blocks
        .iter()
        .find(|b| b.id == BlockId::Module as u32)
        .ok_or(BitcodeError::MissingModuleBlock)?;

    let mut program = Program::new(0);
    let mut state =
        ModuleState { type_of: FxHashMap::default(), base_ids: Vec::new(), value_type: FxHashMap::default(), value_index: FxHashMap::default() };

    if let Some(type_block) = module_block.sub_blocks.iter().find(|b| b.id == BlockId::Type as u32) {
        parse_type_block(type_block, &mut program, &mut state.type_of)?;
    }

    // The value symbol table is parsed up front, ahead of every function
    // body, so `Call` lowering can look a callee's mangled name up by the
    // absolute value-index its declaration was registered under below
    // (§4.2 "Supplemented from `original_source`": purely diagnostic
    // everywhere else, but here it is the only place a declared
    // function's real name is recoverable at all).
    let symbols = module_block
        .sub_blocks
        .iter()
        .find(|b| b.id == BlockId::ValueSymtab as u32)
        .map(ValueSymbolTable::parse);

    let mut func_sigs = Vec::new();
    for rec in &module_block.records {
        if rec.code == ModuleCode::Function as u64 {
            let type_idx = rec.op(0)? as u32;
            let sig_ty = *state.type_of.get(&type_idx).ok_or(BitcodeError::UnknownOpcode(type_idx as u64))?;
            func_sigs.push(sig_ty);
        }
    }

    // Every declared function occupies a value slot of its own, ahead of
    // the module's constants, exactly like any other module-scope value:
    // a `Call` record's `fnid` operand is a relative-id reference into
    // this same anchor space, not a raw tag.
    for &sig_ty in &func_sigs {
        register_value(&mut program, &mut state, ValueDef::Unresolved, sig_ty);
    }

    // Anomalous in-function constants blocks are migrated up before
    // their owning function is parsed (see `migrate_function_constants`
    // below); a module-level CONSTANTS block, if present, is consumed
    // here instead, ahead of every function body.
    if let Some(const_block) = module_block.sub_blocks.iter().find(|b| b.id == BlockId::Constants as u32) {
        parse_constants_block(const_block, &mut program, &mut state)?;
    }

    let mut entry_func = None;
    let mut sig_idx = 0;
    for body in module_block.sub_blocks.iter().filter(|b| b.id == BlockId::Function as u32) {
        let sig_ty = *func_sigs.get(sig_idx).ok_or(BitcodeError::MissingDeclareBlocks)?;
        sig_idx += 1;
        let (params, ret) = match program.types.get(sig_ty) {
            Type::Function { ret, params } => (params.clone(), *ret),
            _ => return Err(BitcodeError::UnknownOpcode(sig_ty.0 as u64)),
        };
        let migrated = migrate_function_constants(body, &mut program, &mut state)?;
        let func_id = parse_function(&migrated, params, ret, symbols.as_ref(), &mut program, &mut state)?;
        if entry_func.is_none() {
            entry_func = Some(func_id);
        }
    }
    let entry_func = entry_func.ok_or(BitcodeError::MissingDeclareBlocks)?;

    Ok(ParsedModule { program, entry_func, type_of: state.type_of, symbols, base_ids: state.base_ids, value_type: state.value_type })
}

fn parse_type_block(block: &BlockHeader, program: &mut Program, type_of: &mut FxHashMap<u32, TypeId>) -> Result<()> {
    let mut next_idx = 0u32;
    for rec in &block.records {
        if rec.code == TypeCode::NumEntry as u64 {
            continue;
        }
        let ty = if rec.code == TypeCode::Void as u64 {
            Type::Void
        } else if rec.code == TypeCode::Float as u64 {
            Type::FP { bit_width: 32 }
        } else if rec.code == TypeCode::Double as u64 {
            Type::FP { bit_width: 64 }
        } else if rec.code == TypeCode::Integer as u64 {
            Type::Int { bit_width: rec.op(0)? as u32, signed: false }
        } else if rec.code == TypeCode::Array as u64 {
            let count = rec.op(0)? as u32;
            let elem = lookup_type(type_of, rec.op(1)? as u32)?;
            Type::Array { elem, count }
        } else if rec.code == TypeCode::Vector as u64 {
            let dim = rec.op(0)? as u32;
            let elem = lookup_type(type_of, rec.op(1)? as u32)?;
            Type::Vector { elem, dim }
        } else if rec.code == TypeCode::Function as u64 {
            let ret = lookup_type(type_of, rec.op(1)? as u32)?;
            let params = rec.operands[2..]
                .iter()
                .map(|&idx| lookup_type(type_of, idx as u32))
                .collect::<Result<Vec<_>>>()?;
            Type::Function { ret, params }
        } else {
            Type::Unexposed { tag: rec.code as u32 }
        };
        let id = program.types.intern(ty);
        type_of.insert(next_idx, id);
        next_idx += 1;
    }
    Ok(())
}

fn lookup_type(type_of: &FxHashMap<u32, TypeId>, idx: u32) -> Result<TypeId> {
    type_of.get(&idx).copied().ok_or(BitcodeError::UnknownOpcode(idx as u64))
}

fn register_value(program: &mut Program, state: &mut ModuleState, def: ValueDef, ty: TypeId) -> ValueId {
    let id = program.ids.alloc();
    program.ids.define(id, def);
    state.value_index.insert(id, state.base_ids.len() as u32);
    state.base_ids.push(id);
    state.value_type.insert(id, ty);
    id
}

fn parse_constants_block(block: &BlockHeader, program: &mut Program, state: &mut ModuleState) -> Result<()> {
    let mut current_ty: Option<TypeId> = None;
    for rec in &block.records {
        if rec.code == ConstantsCode::Settype as u64 {
            current_ty = Some(lookup_type(&state.type_of, rec.op(0)? as u32)?);
            continue;
        }
        let ty = current_ty.ok_or(BitcodeError::MalformedBlockHeader)?;
        let value = if rec.code == ConstantsCode::Null as u64 {
            if program.types.is_float(ty) {
                Constant::FP(0)
            } else {
                Constant::Int(0)
            }
        } else if rec.code == ConstantsCode::Undef as u64 {
            Constant::Undef
        } else if rec.code == ConstantsCode::Integer as u64 {
            Constant::Int(reader::decode_signed(rec.op(0)?) as u64)
        } else if rec.code == ConstantsCode::Float as u64 {
            Constant::FP(rec.op(0)?)
        } else {
            Constant::Unexposed(rec.code as u32)
        };
        let cid = program.consts.intern(ty, value);
        register_value(program, state, ValueDef::Constant(cid), ty);
    }
    Ok(())
}

/// Per §4.2 "Anomalous constants block": a CONSTANTS block nested
/// inside a FUNCTION block is rewritten up to module scope (so forward
/// references from any function see the same constant value list)
/// before the function body is parsed; the FUNCTION block returned here
/// has that sub-block removed.
fn migrate_function_constants(body: &BlockHeader, program: &mut Program, state: &mut ModuleState) -> Result<BlockHeader> {
    let mut sub_blocks = Vec::with_capacity(body.sub_blocks.len());
    for sub in &body.sub_blocks {
        if sub.id == BlockId::Constants as u32 {
            parse_constants_block(sub, program, state)?;
        } else {
            sub_blocks.push(sub.clone());
        }
    }
    Ok(BlockHeader { id: body.id, abbrev_width: body.abbrev_width, records: body.records.clone(), sub_blocks })
}

/// Which phi incoming value (identified by its position in block/slot)
/// still needs a forward reference patched in once every value in the
/// function has an anchor.
struct PendingPhiFixup {
    block: instrument_il::BlockId,
    inst_index: usize,
    incoming_index: usize,
    anchor: u32,
    raw_signed: i64,
}

fn has_result(code: FunctionCode) -> bool {
    matches!(
        code,
        FunctionCode::BinOp
            | FunctionCode::Cast
            | FunctionCode::Cmp2
            | FunctionCode::Phi
            | FunctionCode::Alloca
            | FunctionCode::Load
    )
}

fn parse_function(
    body: &BlockHeader,
    params: Vec<TypeId>,
    ret_type: TypeId,
    symbols: Option<&ValueSymbolTable>,
    program: &mut Program,
    state: &mut ModuleState,
) -> Result<instrument_il::FuncId> {
    let declare = body
        .records
        .first()
        .filter(|r| r.code == FunctionCode::DeclareBlocks as u64)
        .ok_or(BitcodeError::MissingDeclareBlocks)?;
    let block_count = declare.op(0)? as u32;

    let mut func = Function::new("main", params.clone(), ret_type);
    let mut block_ids = vec![func.entry];
    for _ in 1..block_count {
        block_ids.push(func.alloc_block());
    }

    let mut idmap = RelativeIdMap::new();
    for &id in &state.base_ids {
        idmap.define(id);
    }
    for &param_ty in &params {
        let id = program.ids.alloc();
        let param_index = idmap.anchor() - state.base_ids.len() as u32;
        program.ids.define(id, ValueDef::Parameter(param_index));
        idmap.define(id);
        state.value_type.insert(id, param_ty);
        func.param_ids.push(id);
    }

    let mut current_block = 0usize;
    let mut pending_fixups: Vec<PendingPhiFixup> = Vec::new();

    for rec in body.records.iter().skip(1) {
        let anchor = idmap.anchor();
        let code = FunctionCode::try_from(rec.code as u8).ok();
        let result_id = code.filter(|c| has_result(*c)).map(|_| {
            let id = program.ids.alloc();
            idmap.define(id);
            id
        });

        let slot = func.block(block_ids[current_block]).len();
        let (kind, value_ty, advances_block) = lower_record(
            rec,
            code,
            anchor,
            result_id,
            &block_ids,
            &idmap,
            symbols,
            program,
            state,
            &mut pending_fixups,
            block_ids[current_block],
            slot,
        )?;

        if let Some(id) = result_id {
            program.ids.define(id, ValueDef::Instruction(block_ids[current_block], slot));
            if let Some(ty) = value_ty {
                state.value_type.insert(id, ty);
            }
        }

        let block = func.block_mut(block_ids[current_block]);
        let inst = Instruction::new(kind, result_id, SourceSpan::None);
        block.push(inst);

        if advances_block {
            current_block += 1;
        }
    }

    // Resolve forward phi references now that every value in the
    // function has an anchor.
    for fixup in &pending_fixups {
        let resolved = idmap.resolve_phi(fixup.anchor, fixup.raw_signed).ok_or(BitcodeError::UnresolvedId(fixup.anchor, fixup.raw_signed))?;
        let block = func.block_mut(fixup.block);
        if let InstructionKind::Phi { incomings } = &mut block.instructions_mut()[fixup.inst_index].kind {
            incomings[fixup.incoming_index].0 = resolved;
        }
    }

    Ok(program.add_function(func))
}

#[allow(clippy::too_many_arguments)]
fn lower_record(
    rec: &Record,
    code: Option<FunctionCode>,
    anchor: u32,
    result_id: Option<ValueId>,
    block_ids: &[instrument_il::BlockId],
    idmap: &RelativeIdMap,
    symbols: Option<&ValueSymbolTable>,
    program: &mut Program,
    state: &mut ModuleState,
    pending_fixups: &mut Vec<PendingPhiFixup>,
    current_block: instrument_il::BlockId,
    current_block_len: usize,
) -> Result<(InstructionKind, Option<TypeId>, bool)> {
    let Some(code) = code else {
        let operands = rec
            .operands
            .iter()
            .filter_map(|&d| idmap.resolve(anchor, d).ok())
            .collect::<SmallVec<[ValueId; 4]>>();
        return Ok((InstructionKind::Unexposed { opcode: rec.code as u32, callee: None, operands }, None, false));
    };

    match code {
        FunctionCode::DeclareBlocks => unreachable!("DeclareBlocks is consumed before the main loop"),
        FunctionCode::BinOp => {
            let lhs = idmap.resolve(anchor, rec.op(0)?)?;
            let rhs = idmap.resolve(anchor, rec.op(1)?)?;
            let sub = BitcodeBinOp::try_from(rec.op(2)? as u8).map_err(|_| BitcodeError::UnknownOpcode(rec.op(2)?))?;
            let ty = state.value_type.get(&lhs).copied();
            let (op, signed) = match sub {
                BitcodeBinOp::Add => (BinOpKind::Add, false),
                BitcodeBinOp::Sub => (BinOpKind::Sub, false),
                BitcodeBinOp::Mul => (BinOpKind::Mul, false),
                BitcodeBinOp::UDiv => (BinOpKind::Div, false),
                BitcodeBinOp::SDiv => (BinOpKind::Div, true),
                BitcodeBinOp::URem => (BinOpKind::Rem, false),
                BitcodeBinOp::SRem => (BinOpKind::Rem, true),
                BitcodeBinOp::Shl => (BinOpKind::Shl, false),
                BitcodeBinOp::LShr | BitcodeBinOp::AShr => (BinOpKind::Shr, false),
                BitcodeBinOp::And => (BinOpKind::BitAnd, false),
                BitcodeBinOp::Or => (BinOpKind::BitOr, false),
                BitcodeBinOp::Xor => (BinOpKind::BitXor, false),
            };
            let ty = ty.map(|t| signed_variant(&mut program.types, t, signed));
            Ok((InstructionKind::BinOp { op, lhs, rhs }, ty, false))
        }
        FunctionCode::Cast => {
            let operand = idmap.resolve(anchor, rec.op(0)?)?;
            let dest_type = lookup_type(&state.type_of, rec.op(1)? as u32)?;
            let sub = BitcodeCastOp::try_from(rec.op(2)? as u8).map_err(|_| BitcodeError::UnknownOpcode(rec.op(2)?))?;
            let op = match sub {
                BitcodeCastOp::Trunc | BitcodeCastOp::FpTrunc => CastKind::Trunc,
                BitcodeCastOp::BitCast => CastKind::BitCast,
                BitcodeCastOp::FpToUi | BitcodeCastOp::FpToSi => CastKind::FloatToInt,
                BitcodeCastOp::UiToFp | BitcodeCastOp::SiToFp => CastKind::IntToFloat,
                BitcodeCastOp::ZExt | BitcodeCastOp::SExt | BitcodeCastOp::FpExt => CastKind::BitCast,
            };
            Ok((InstructionKind::Cast { op, operand, dest_type }, Some(dest_type), false))
        }
        FunctionCode::Cmp2 => {
            let lhs = idmap.resolve(anchor, rec.op(0)?)?;
            let rhs = idmap.resolve(anchor, rec.op(1)?)?;
            let pred = BitcodePredicate::try_from(rec.op(2)? as u8).map_err(|_| BitcodeError::UnknownOpcode(rec.op(2)?))?;
            let (op, signed) = match pred {
                BitcodePredicate::FOeq | BitcodePredicate::IEq => (CmpKind::Eq, false),
                BitcodePredicate::FOne | BitcodePredicate::INe => (CmpKind::Ne, false),
                BitcodePredicate::FOlt => (CmpKind::Lt, false),
                BitcodePredicate::IUlt => (CmpKind::Lt, false),
                BitcodePredicate::ISlt => (CmpKind::Lt, true),
                BitcodePredicate::FOle => (CmpKind::Le, false),
                BitcodePredicate::IUle => (CmpKind::Le, false),
                BitcodePredicate::ISle => (CmpKind::Le, true),
                BitcodePredicate::FOgt => (CmpKind::Gt, false),
                BitcodePredicate::IUgt => (CmpKind::Gt, false),
                BitcodePredicate::ISgt => (CmpKind::Gt, true),
                BitcodePredicate::FOge => (CmpKind::Ge, false),
                BitcodePredicate::IUge => (CmpKind::Ge, false),
                BitcodePredicate::ISge => (CmpKind::Ge, true),
            };
            let bool_ty = program.types.intern(Type::Bool);
            Ok((InstructionKind::Cmp { op, lhs, rhs, signed }, Some(bool_ty), false))
        }
        FunctionCode::Ret => {
            let value = if rec.operands.is_empty() { None } else { Some(idmap.resolve(anchor, rec.op(0)?)?) };
            Ok((InstructionKind::Return { value }, None, true))
        }
        FunctionCode::Br => {
            if rec.operands.len() == 1 {
                let target = *block_ids.get(rec.op(0)? as usize).ok_or(BitcodeError::MalformedBlockHeader)?;
                Ok((InstructionKind::Branch { target }, None, true))
            } else {
                let true_target = *block_ids.get(rec.op(0)? as usize).ok_or(BitcodeError::MalformedBlockHeader)?;
                let false_target = *block_ids.get(rec.op(1)? as usize).ok_or(BitcodeError::MalformedBlockHeader)?;
                let cond = idmap.resolve(anchor, rec.op(2)?)?;
                Ok((InstructionKind::BranchConditional { cond, true_target, false_target, merge: None }, None, true))
            }
        }
        FunctionCode::Switch => {
            let selector = idmap.resolve(anchor, rec.op(0)?)?;
            let default = *block_ids.get(rec.op(1)? as usize).ok_or(BitcodeError::MalformedBlockHeader)?;
            let mut cases = SmallVec::new();
            let mut i = 2;
            while i + 1 < rec.operands.len() {
                let value = reader::decode_signed(rec.operands[i]);
                let target = *block_ids.get(rec.operands[i + 1] as usize).ok_or(BitcodeError::MalformedBlockHeader)?;
                cases.push((value, target));
                i += 2;
            }
            Ok((InstructionKind::Switch { selector, default, cases }, None, true))
        }
        FunctionCode::Unreachable => Ok((InstructionKind::Unreachable, None, true)),
        FunctionCode::Phi => {
            let ty = lookup_type(&state.type_of, rec.op(0)? as u32)?;
            let mut incomings = SmallVec::new();
            let mut i = 1;
            let inst_index_placeholder = current_block_len;
            while i + 1 < rec.operands.len() {
                let raw_signed = reader::decode_signed(rec.operands[i]);
                let pred_bb = rec.operands[i + 1] as usize;
                let pred = *block_ids.get(pred_bb).ok_or(BitcodeError::MalformedBlockHeader)?;
                let resolved = idmap.resolve_phi(anchor, raw_signed);
                let incoming_index = incomings.len();
                incomings.push((resolved.unwrap_or(ValueId(u32::MAX)), pred));
                if resolved.is_none() {
                    pending_fixups.push(PendingPhiFixup {
                        block: current_block,
                        inst_index: inst_index_placeholder,
                        incoming_index,
                        anchor,
                        raw_signed,
                    });
                }
                i += 2;
            }
            Ok((InstructionKind::Phi { incomings }, Some(ty), false))
        }
        FunctionCode::Alloca => {
            let ty = lookup_type(&state.type_of, rec.op(0)? as u32)?;
            let ptr_ty = program.types.intern(Type::Pointer { space: 0, pointee: ty });
            Ok((InstructionKind::Alloca { ty }, Some(ptr_ty), false))
        }
        FunctionCode::Load => {
            let ptr = idmap.resolve(anchor, rec.op(0)?)?;
            let pointee = state.value_type.get(&ptr).and_then(|t| match program.types.get(*t) {
                Type::Pointer { pointee, .. } => Some(*pointee),
                _ => None,
            });
            Ok((InstructionKind::Load { ptr }, pointee, false))
        }
        FunctionCode::Store => {
            let ptr = idmap.resolve(anchor, rec.op(0)?)?;
            let value = idmap.resolve(anchor, rec.op(1)?)?;
            Ok((InstructionKind::Store { ptr, value }, None, false))
        }
        FunctionCode::Call => {
            let callee = idmap.resolve(anchor, rec.op(3)?)?;
            let args: Result<Vec<ValueId>> = rec.operands[4..].iter().map(|&d| idmap.resolve(anchor, d)).collect();
            let args = args?;
            // The callee's real mangled name only exists in the value
            // symbol table; a module without one (or a declaration the
            // table doesn't name) falls back to a positional stand-in,
            // which never matches a `dx.op.*` prefix and so is always
            // treated as `Unexposed` rather than misidentified.
            let value_index = state.value_index.get(&callee).copied();
            let name = value_index
                .and_then(|idx| symbols.and_then(|s| s.name_of(idx)))
                .map(str::to_string)
                .unwrap_or_else(|| format!("callee.{}", value_index.unwrap_or(u32::MAX)));
            lower_call(&name, args, result_id, program, state)
        }
    }
}

fn lower_call(
    name: &str,
    args: Vec<ValueId>,
    _result_id: Option<ValueId>,
    program: &mut Program,
    state: &ModuleState,
) -> Result<(InstructionKind, Option<TypeId>, bool)> {
    match intrinsic::recognize(name) {
        Some(ResourceOp::LoadBuffer) => {
            let resource = *args.first().ok_or(BitcodeError::MalformedBlockHeader)?;
            let index = *args.get(1).ok_or(BitcodeError::MalformedBlockHeader)?;
            Ok((InstructionKind::LoadBuffer { resource, index }, None, false))
        }
        Some(ResourceOp::StoreBuffer) => {
            let resource = *args.first().ok_or(BitcodeError::MalformedBlockHeader)?;
            let index = *args.get(1).ok_or(BitcodeError::MalformedBlockHeader)?;
            let value = *args.get(2).ok_or(BitcodeError::MalformedBlockHeader)?;
            Ok((InstructionKind::StoreBuffer { resource, index, value }, None, false))
        }
        Some(ResourceOp::LoadTexture) => {
            let resource = *args.first().ok_or(BitcodeError::MalformedBlockHeader)?;
            let coord = *args.get(1).ok_or(BitcodeError::MalformedBlockHeader)?;
            Ok((InstructionKind::LoadTexture { resource, coord }, None, false))
        }
        Some(ResourceOp::StoreTexture) => {
            let resource = *args.first().ok_or(BitcodeError::MalformedBlockHeader)?;
            let coord = *args.get(1).ok_or(BitcodeError::MalformedBlockHeader)?;
            let value = *args.get(2).ok_or(BitcodeError::MalformedBlockHeader)?;
            Ok((InstructionKind::StoreTexture { resource, coord, value }, None, false))
        }
        Some(ResourceOp::ResourceSize) => {
            let resource = *args.first().ok_or(BitcodeError::MalformedBlockHeader)?;
            Ok((InstructionKind::ResourceSize { resource }, None, false))
        }
        Some(ResourceOp::ResourceToken) => {
            let resource = *args.first().ok_or(BitcodeError::MalformedBlockHeader)?;
            Ok((InstructionKind::ResourceToken { resource }, None, false))
        }
        None => {
            let _ = state;
            Ok((
                InstructionKind::Unexposed {
                    opcode: FunctionCode::Call as u32,
                    callee: Some(name.to_string()),
                    operands: args.into(),
                },
                None,
                false,
            ))
        }
    }
}

/// Re-intern the `signed` flag of an `Int` type; no-op for every other
/// type. Lets `BinOp`/`Cmp` lowering pick the same underlying width but
/// the sign the instruction's own opcode implies, since LLVM's type
/// table carries no signedness of its own.
fn signed_variant(types: &mut instrument_il::TypeMap, ty: TypeId, signed: bool) -> TypeId {
    match types.get(ty).clone() {
        Type::Int { bit_width, .. } => types.intern(Type::Int { bit_width, signed }),
        _ => ty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::ValueSymtabCode;
    use crate::reader::encode_signed;
    use crate::writer::BitWriter;

    #[test]
    fn parses_a_straight_line_function_with_a_binop_and_return() {
        let mut w = BitWriter::new();
        w.enter_subblock(BlockId::Module as u32, 4);

        w.enter_subblock(BlockId::Type as u32, 5);
        w.write_unabbrev_record(TypeCode::NumEntry as u64, &[2]);
        w.write_unabbrev_record(TypeCode::Integer as u64, &[32]);
        w.write_unabbrev_record(TypeCode::Function as u64, &[0, 0, 0]);
        w.end_block();

        w.write_unabbrev_record(ModuleCode::Function as u64, &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        w.enter_subblock(BlockId::Function as u32, 6);
        w.write_unabbrev_record(FunctionCode::DeclareBlocks as u64, &[1]);
        w.write_unabbrev_record(FunctionCode::BinOp as u64, &[1, 1, BitcodeBinOp::Add as u64]);
        w.write_unabbrev_record(FunctionCode::Ret as u64, &[1]);
        w.end_block();

        w.end_block();
        let words = w.into_words();

        let parsed = parse_module(&words).expect("module parses");
        let func = parsed.program.function(parsed.entry_func);
        assert_eq!(func.blocks().len(), 1);
        let insts = func.blocks()[0].instructions();
        assert_eq!(insts.len(), 2);
        assert!(matches!(insts[0].kind, InstructionKind::BinOp { op: BinOpKind::Add, .. }));
        match &insts[1].kind {
            InstructionKind::Return { value: Some(v) } => {
                assert_eq!(*v, insts[0].result.unwrap());
            }
            other => panic!("expected a value-returning Ret, got {other:?}"),
        }
    }

    #[test]
    fn parses_conditional_branches_with_a_merging_phi() {
        let mut w = BitWriter::new();
        w.enter_subblock(BlockId::Module as u32, 4);

        w.enter_subblock(BlockId::Type as u32, 5);
        w.write_unabbrev_record(TypeCode::NumEntry as u64, &[2]);
        w.write_unabbrev_record(TypeCode::Integer as u64, &[32]);
        w.write_unabbrev_record(TypeCode::Function as u64, &[0, 0, 0]);
        w.end_block();

        w.write_unabbrev_record(ModuleCode::Function as u64, &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        w.enter_subblock(BlockId::Function as u32, 6);
        w.write_unabbrev_record(FunctionCode::DeclareBlocks as u64, &[3]);
        // Block 0 (entry): branch on the param to block 1 or block 2.
        w.write_unabbrev_record(FunctionCode::Br as u64, &[1, 2, 1]);
        // Block 1: unconditional branch to block 2, carrying the param
        // itself as its phi contribution.
        w.write_unabbrev_record(FunctionCode::Br as u64, &[2]);
        // Block 2: phi merging block 0's param (anchor 2, value at idx 1,
        // so delta 1) and block 1's param (anchor 2, delta 1) — nothing
        // new is defined between the two branches and the phi itself.
        w.write_unabbrev_record(FunctionCode::Phi as u64, &[0, encode_signed(1), 0, encode_signed(1), 1]);
        w.write_unabbrev_record(FunctionCode::Ret as u64, &[]);
        w.end_block();

        w.end_block();
        let words = w.into_words();

        let parsed = parse_module(&words).expect("module parses");
        let func = parsed.program.function(parsed.entry_func);
        assert_eq!(func.blocks().len(), 3);
        assert!(matches!(func.blocks()[0].terminator().unwrap().kind, InstructionKind::BranchConditional { .. }));
        assert!(matches!(func.blocks()[1].terminator().unwrap().kind, InstructionKind::Branch { .. }));
        let phi = &func.blocks()[2].instructions()[0];
        match &phi.kind {
            InstructionKind::Phi { incomings } => {
                assert_eq!(incomings.len(), 2);
                assert_eq!(incomings[0].1, func.blocks()[0].id);
                assert_eq!(incomings[1].1, func.blocks()[1].id);
            }
            other => panic!("expected a Phi, got {other:?}"),
        }
    }

    #[test]
    fn recognizes_a_buffer_load_call_by_its_value_symtab_name() {
        let mut w = BitWriter::new();
        w.enter_subblock(BlockId::Module as u32, 4);

        w.enter_subblock(BlockId::Type as u32, 5);
        w.write_unabbrev_record(TypeCode::NumEntry as u64, &[2]);
        w.write_unabbrev_record(TypeCode::Integer as u64, &[32]);
        w.write_unabbrev_record(TypeCode::Function as u64, &[0, 0, 0]);
        w.write_unabbrev_record(TypeCode::Function as u64, &[0, 0]);
        w.end_block();

        w.enter_subblock(BlockId::ValueSymtab as u32, 4);
        let name = "dx.op.bufferLoad.f32";
        let mut entry = vec![1u64];
        entry.extend(name.chars().map(|c| c as u64));
        w.write_unabbrev_record(ValueSymtabCode::Entry as u64, &entry);
        w.end_block();

        // decl0: this module's own function (type 1, one i32 param).
        w.write_unabbrev_record(ModuleCode::Function as u64, &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        // decl1: the bufferLoad intrinsic, declared only (no body).
        w.write_unabbrev_record(ModuleCode::Function as u64, &[2, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        w.enter_subblock(BlockId::Function as u32, 6);
        w.write_unabbrev_record(FunctionCode::DeclareBlocks as u64, &[1]);
        w.write_unabbrev_record(FunctionCode::Call as u64, &[0, 0, 0, 2, 1, 1]);
        w.write_unabbrev_record(FunctionCode::Ret as u64, &[]);
        w.end_block();

        w.end_block();
        let words = w.into_words();

        let parsed = parse_module(&words).expect("module parses");
        let func = parsed.program.function(parsed.entry_func);
        let insts = func.blocks()[0].instructions();
        match &insts[0].kind {
            InstructionKind::LoadBuffer { resource, index } => assert_eq!(resource, index),
            other => panic!("expected a recognized LoadBuffer call, got {other:?}"),
        }
    }

    #[test]
    fn a_declaration_with_no_symbol_table_entry_falls_back_to_a_positional_name() {
        let mut w = BitWriter::new();
        w.enter_subblock(BlockId::Module as u32, 4);

        w.enter_subblock(BlockId::Type as u32, 5);
        w.write_unabbrev_record(TypeCode::NumEntry as u64, &[3]);
        w.write_unabbrev_record(TypeCode::Integer as u64, &[32]);
        w.write_unabbrev_record(TypeCode::Function as u64, &[0, 0, 0]);
        w.write_unabbrev_record(TypeCode::Function as u64, &[0, 0]);
        w.end_block();

        // decl0: this module's own function (type 1, one i32 param).
        w.write_unabbrev_record(ModuleCode::Function as u64, &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        // decl1: some other declared function, with no value-symtab block
        // at all to name it.
        w.write_unabbrev_record(ModuleCode::Function as u64, &[2, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        w.enter_subblock(BlockId::Function as u32, 6);
        w.write_unabbrev_record(FunctionCode::DeclareBlocks as u64, &[1]);
        w.write_unabbrev_record(FunctionCode::Call as u64, &[0, 0, 0, 2, 1]);
        w.write_unabbrev_record(FunctionCode::Ret as u64, &[]);
        w.end_block();

        w.end_block();
        let words = w.into_words();

        let parsed = parse_module(&words).expect("module parses");
        let func = parsed.program.function(parsed.entry_func);
        match &func.blocks()[0].instructions()[0].kind {
            InstructionKind::Unexposed { callee: Some(name), .. } => assert!(name.starts_with("callee.")),
            other => panic!("expected an Unexposed call with a positional fallback name, got {other:?}"),
        }
    }
}
