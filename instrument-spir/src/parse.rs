//! `parse_module` (§4.3 "Parse"): a single linear pass producing IL.
//! Types are interned first because they precede use, matching the
//! ordering rule `ast::parse_types` already leans on;
//! structured merge blocks are captured on the IL terminator rather than
//! discarded, resolving Design Note 9's first open question (DESIGN.md).
//!
//! Scope: this pass recognizes one function per module (the common case
//! for an instrumented compute/graphics entry point) and a deliberately
//! bounded opcode set — arithmetic/compare/memory/control-flow enough to
//! exercise every IL construct C4's `WritingNegativeValue` feature needs.
//! Anything else round-trips as `InstructionKind::Unexposed`.

use fxhash::FxHashMap;
use instrument_il::{
    BinOpKind, BlockId, CmpKind, FuncId, Function, Instruction, InstructionKind, Program,
    SourceSpan, Type, TypeId, ValueDef, ValueId,
};
use spirv_headers::Op;

use crate::header::ModuleHeader;
use crate::raw::{iter_raw, RawInstruction};
use crate::sections::{scan_sections, SectionId, SectionMap};
use crate::{Result, SpirError};

pub struct ParsedModule {
    pub header: ModuleHeader,
    pub sections: SectionMap,
    /// The post-header word stream, kept so recompile can slice out
    /// trivially-copyable source spans by absolute word offset.
    pub words: Vec<u32>,
    pub program: Program,
    pub entry_func: FuncId,
    /// SPIR-V numeric id -> IL value, for every id the parse resolved
    /// (types, constants, globals, and in-function results).
    pub value_of: FxHashMap<u32, ValueId>,
    pub type_of: FxHashMap<u32, TypeId>,
    pub next_numeric_id: u32,
}

pub fn parse_module(words: &[u32]) -> Result<ParsedModule> {
    let header = ModuleHeader::parse(words)?;
    let body = words[ModuleHeader::WORD_COUNT..].to_vec();
    let sections = scan_sections(&body)?;

    let mut program = Program::new(0);
    let mut type_of: FxHashMap<u32, TypeId> = FxHashMap::default();
    let mut value_of: FxHashMap<u32, ValueId> = FxHashMap::default();

    parse_declarations(&body, &sections, &mut program, &mut type_of, &mut value_of)?;

    let func_offset = sections.span(SectionId::Function).map(|(a, _)| a).unwrap_or(body.len());
    let entry_func = parse_function(&body, func_offset, &mut program, &mut type_of, &mut value_of)?;

    Ok(ParsedModule {
        next_numeric_id: header.bound,
        header,
        sections,
        words: body,
        program,
        entry_func,
        value_of,
        type_of,
    })
}

fn parse_declarations(
    body: &[u32],
    sections: &SectionMap,
    program: &mut Program,
    type_of: &mut FxHashMap<u32, TypeId>,
    value_of: &mut FxHashMap<u32, ValueId>,
) -> Result<()> {
    let Some((start, end)) = sections.span(SectionId::Declarations) else { return Ok(()) };
    for item in iter_raw(body, start) {
        let (offset, inst) = item?;
        if offset >= end {
            break;
        }
        lower_declaration(program, type_of, value_of, &inst)?;
    }
    Ok(())
}

fn lower_declaration(
    program: &mut Program,
    type_of: &mut FxHashMap<u32, TypeId>,
    value_of: &mut FxHashMap<u32, ValueId>,
    inst: &RawInstruction,
) -> Result<()> {
    let ops = inst.operands;
    let op = inst.opcode;

    let define_value = |program: &mut Program, def: ValueDef| -> ValueId {
        let vid = program.ids.alloc();
        program.ids.define(vid, def);
        vid
    };

    if op == Op::TypeVoid as u16 {
        type_of.insert(ops[0], program.types.intern(Type::Void));
    } else if op == Op::TypeBool as u16 {
        type_of.insert(ops[0], program.types.intern(Type::Bool));
    } else if op == Op::TypeInt as u16 {
        let signed = ops[2] != 0;
        type_of.insert(ops[0], program.types.intern(Type::Int { bit_width: ops[1], signed }));
    } else if op == Op::TypeFloat as u16 {
        type_of.insert(ops[0], program.types.intern(Type::FP { bit_width: ops[1] }));
    } else if op == Op::TypeVector as u16 {
        let elem = *type_of.get(&ops[1]).ok_or(SpirError::UnknownId(ops[1]))?;
        type_of.insert(ops[0], program.types.intern(Type::Vector { elem, dim: ops[2] }));
    } else if op == Op::TypePointer as u16 {
        let pointee = *type_of.get(&ops[2]).ok_or(SpirError::UnknownId(ops[2]))?;
        type_of.insert(ops[0], program.types.intern(Type::Pointer { space: ops[1], pointee }));
    } else if op == Op::Constant as u16 {
        let ty = *type_of.get(&ops[0]).ok_or(SpirError::UnknownId(ops[0]))?;
        let bits = *ops.get(2).unwrap_or(&0) as u64;
        let value = match program.types.get(ty) {
            Type::FP { .. } => instrument_il::Constant::FP(bits),
            _ => instrument_il::Constant::Int(bits),
        };
        let cid = program.consts.intern(ty, value);
        let vid = define_value(program, ValueDef::Constant(cid));
        value_of.insert(ops[1], vid);
    } else if op == Op::ConstantTrue as u16 || op == Op::ConstantFalse as u16 {
        let ty = *type_of.get(&ops[0]).ok_or(SpirError::UnknownId(ops[0]))?;
        let cid = program.consts.intern(ty, instrument_il::Constant::Bool(op == Op::ConstantTrue as u16));
        let vid = define_value(program, ValueDef::Constant(cid));
        value_of.insert(ops[1], vid);
    } else if op == Op::Variable as u16 {
        let ty = *type_of.get(&ops[0]).ok_or(SpirError::UnknownId(ops[0]))?;
        let gid = program.add_global(String::new(), ty);
        let vid = define_value(program, ValueDef::Global(gid));
        value_of.insert(ops[1], vid);
    }
    // Other declaration-section opcodes (matrices, arrays, structs,
    // images, samplers) round-trip untouched via the section's verbatim
    // span on recompile; nothing this crate lowers references them by id.
    Ok(())
}

/// First pass over a function's body: find every `OpLabel` in order and
/// allocate its IL block, so forward branches (including the merge
/// target named by a not-yet-reached `OpSelectionMerge`) resolve.
fn prescan_labels(func_words: &[u32], func: &mut Function) -> Result<FxHashMap<u32, BlockId>> {
    let mut labels = FxHashMap::default();
    let mut first = true;
    for item in iter_raw(func_words, 0) {
        let (_, inst) = item?;
        if inst.opcode == Op::Label as u16 {
            let block = if first {
                first = false;
                func.entry
            } else {
                func.alloc_block()
            };
            labels.insert(inst.operands[0], block);
        }
    }
    Ok(labels)
}

fn parse_function(
    body: &[u32],
    func_offset: usize,
    program: &mut Program,
    type_of: &mut FxHashMap<u32, TypeId>,
    value_of: &mut FxHashMap<u32, ValueId>,
) -> Result<FuncId> {
    let func_words = &body[func_offset..];
    let mut raw = iter_raw(func_words, 0);
    let (_, header_inst) = raw.next().ok_or(SpirError::IncompleteInstruction(func_offset))??;
    if header_inst.opcode != Op::Function as u16 {
        return Err(SpirError::UnknownId(header_inst.operands.first().copied().unwrap_or(0)));
    }
    let ret_type = *type_of.get(&header_inst.operands[0]).ok_or(SpirError::UnknownId(header_inst.operands[0]))?;
    let func_numeric_id = header_inst.operands[1];
    let header_len = header_inst.word_count as usize;

    let mut func = Function::new(format!("fn_{func_numeric_id}"), vec![], ret_type);
    let label_blocks = prescan_labels(&func_words[header_len..], &mut func)?;

    let mut current_block = func.entry;
    let mut first_label_seen = false;
    let mut pending_merge_numeric: Option<u32> = None;

    for item in iter_raw(func_words, header_len) {
        let (offset, inst) = item?;
        let absolute = func_offset + offset;
        let op = inst.opcode;
        let ops = inst.operands;

        if op == Op::FunctionEnd as u16 {
            break;
        }
        if op == Op::Label as u16 {
            current_block = if !first_label_seen {
                first_label_seen = true;
                func.entry
            } else {
                *label_blocks.get(&ops[0]).expect("prescanned label")
            };
            continue;
        }
        if op == Op::FunctionParameter as u16 {
            continue;
        }

        macro_rules! push_result {
            ($kind:expr, $result_numeric:expr) => {{
                let vid = program.ids.alloc();
                let index = func.block(current_block).len();
                func.block_mut(current_block).push(Instruction::new($kind, Some(vid), SourceSpan::Trivial(absolute as u32)));
                program.ids.define(vid, ValueDef::Instruction(current_block, index));
                value_of.insert($result_numeric, vid);
            }};
        }
        macro_rules! push_void {
            ($kind:expr) => {{
                func.block_mut(current_block).push(Instruction::new($kind, None, SourceSpan::Trivial(absolute as u32)));
            }};
        }
        let val = |numeric: u32, value_of: &FxHashMap<u32, ValueId>| -> Result<ValueId> {
            value_of.get(&numeric).copied().ok_or(SpirError::UnknownId(numeric))
        };

        if op == Op::IAdd as u16 || op == Op::FAdd as u16 {
            let lhs = val(ops[2], value_of)?;
            let rhs = val(ops[3], value_of)?;
            push_result!(InstructionKind::BinOp { op: BinOpKind::Add, lhs, rhs }, ops[1]);
        } else if op == Op::ISub as u16 || op == Op::FSub as u16 {
            let lhs = val(ops[2], value_of)?;
            let rhs = val(ops[3], value_of)?;
            push_result!(InstructionKind::BinOp { op: BinOpKind::Sub, lhs, rhs }, ops[1]);
        } else if op == Op::IMul as u16 || op == Op::FMul as u16 {
            let lhs = val(ops[2], value_of)?;
            let rhs = val(ops[3], value_of)?;
            push_result!(InstructionKind::BinOp { op: BinOpKind::Mul, lhs, rhs }, ops[1]);
        } else if op == Op::SLessThan as u16 || op == Op::ULessThan as u16 || op == Op::FOrdLessThan as u16 {
            let signed = op == Op::SLessThan as u16;
            let lhs = val(ops[2], value_of)?;
            let rhs = val(ops[3], value_of)?;
            push_result!(InstructionKind::Cmp { op: CmpKind::Lt, lhs, rhs, signed }, ops[1]);
        } else if op == Op::IEqual as u16 || op == Op::FOrdEqual as u16 || op == Op::LogicalEqual as u16 {
            let lhs = val(ops[2], value_of)?;
            let rhs = val(ops[3], value_of)?;
            push_result!(InstructionKind::Cmp { op: CmpKind::Eq, lhs, rhs, signed: false }, ops[1]);
        } else if op == Op::Load as u16 {
            let ptr = val(ops[2], value_of)?;
            push_result!(InstructionKind::Load { ptr }, ops[1]);
        } else if op == Op::Store as u16 {
            let ptr = val(ops[0], value_of)?;
            let value = val(ops[1], value_of)?;
            push_void!(InstructionKind::Store { ptr, value });
        } else if op == Op::SelectionMerge as u16 || op == Op::LoopMerge as u16 {
            pending_merge_numeric = Some(ops[0]);
        } else if op == Op::Branch as u16 {
            let target = *label_blocks.get(&ops[0]).ok_or(SpirError::UnknownId(ops[0]))?;
            push_void!(InstructionKind::Branch { target });
        } else if op == Op::BranchConditional as u16 {
            let cond = val(ops[0], value_of)?;
            let true_target = *label_blocks.get(&ops[1]).ok_or(SpirError::UnknownId(ops[1]))?;
            let false_target = *label_blocks.get(&ops[2]).ok_or(SpirError::UnknownId(ops[2]))?;
            let merge = pending_merge_numeric.take().and_then(|m| label_blocks.get(&m).copied());
            push_void!(InstructionKind::BranchConditional { cond, true_target, false_target, merge });
        } else if op == Op::Return as u16 {
            push_void!(InstructionKind::Return { value: None });
        } else if op == Op::ReturnValue as u16 {
            let value = val(ops[0], value_of)?;
            push_void!(InstructionKind::Return { value: Some(value) });
        } else if op == Op::Unreachable as u16 {
            push_void!(InstructionKind::Unreachable);
        } else {
            let operands: smallvec::SmallVec<[ValueId; 4]> =
                ops.iter().filter_map(|&o| value_of.get(&o).copied()).collect();
            push_void!(InstructionKind::Unexposed { opcode: op as u32, callee: None, operands });
        }
    }

    Ok(program.add_function(func))
}
