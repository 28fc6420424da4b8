//! `Function`: an owned list of `BasicBlock`s (§3).

use thiserror::Error;

use crate::block::BasicBlock;
use crate::dom::Dominators;
use crate::ids::{BlockId, TypeId, ValueDef, ValueId};
use crate::identifier::IdentifierMap;
use crate::instruction::InstructionKind;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum VerifyError {
    #[error("block {0:?} does not end in a terminator")]
    MissingTerminator(BlockId),
    #[error("block {0:?} has a non-terminator instruction after its terminator")]
    InstructionAfterTerminator(BlockId),
    #[error("phi in block {0:?} names {1:?} as a predecessor, which is not one")]
    PhiPredecessorMismatch(BlockId, BlockId),
    #[error("operand {0:?} used in block {1:?} does not dominate its use")]
    OperandNotDominating(ValueId, BlockId),
    #[error("terminator in block {0:?} targets unknown block {1:?}")]
    UnknownSuccessor(BlockId, BlockId),
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<TypeId>,
    /// The `ValueId` each entry of `params` was allocated under, parallel
    /// by index. Empty until a parser (or builder) populates it — not
    /// every caller of `Function::new` needs parameter values addressable
    /// (e.g. the reorder tests build functions with no parameters at all).
    pub param_ids: Vec<ValueId>,
    pub ret_type: TypeId,
    pub entry: BlockId,
    blocks: Vec<BasicBlock>,
    next_block: u32,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<TypeId>, ret_type: TypeId) -> Self {
        let entry = BlockId(0);
        Function {
            name: name.into(),
            param_ids: Vec::with_capacity(params.len()),
            params,
            ret_type,
            entry,
            blocks: vec![BasicBlock::new(entry)],
            next_block: 1,
        }
    }

    pub fn alloc_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.push(BasicBlock::new(id));
        id
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [BasicBlock] {
        &mut self.blocks
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks.iter().find(|b| b.id == id).expect("unknown block id")
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks.iter_mut().find(|b| b.id == id).expect("unknown block id")
    }

    pub fn push_block(&mut self, block: BasicBlock) {
        self.next_block = self.next_block.max(block.id.0 + 1);
        self.blocks.push(block);
    }

    /// Reorder the function's physical block list, e.g. after
    /// `reorder::reorder_by_dominant_blocks` computes a valid order.
    pub fn reorder_blocks(&mut self, order: &[BlockId]) {
        let mut by_id: std::collections::HashMap<BlockId, BasicBlock> =
            std::mem::take(&mut self.blocks)
                .into_iter()
                .map(|b| (b.id, b))
                .collect();
        self.blocks = order.iter().map(|id| by_id.remove(id).expect("reorder: unknown block")).collect();
    }

    pub fn successors_of(&self, id: BlockId) -> Vec<BlockId> {
        self.block(id)
            .terminator()
            .map(|t| t.successors().into_vec())
            .unwrap_or_default()
    }

    pub fn predecessors_of(&self, id: BlockId) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| self.successors_of(b.id).contains(&id))
            .map(|b| b.id)
            .collect()
    }

    /// Checks the SSA invariants of §3/§8. `ids` resolves a `ValueId` to
    /// what defines it, so the caller (a `Program`) can distinguish
    /// constants/parameters/globals from in-function instructions.
    pub fn verify_ssa(&self, ids: &IdentifierMap) -> Result<(), VerifyError> {
        for block in &self.blocks {
            let insts = block.instructions();
            for (i, inst) in insts.iter().enumerate() {
                let is_last = i + 1 == insts.len();
                if inst.is_terminator() && !is_last {
                    return Err(VerifyError::InstructionAfterTerminator(block.id));
                }
            }
            match block.terminator() {
                None => return Err(VerifyError::MissingTerminator(block.id)),
                Some(term) => {
                    for succ in term.successors() {
                        if !self.blocks.iter().any(|b| b.id == succ) {
                            return Err(VerifyError::UnknownSuccessor(block.id, succ));
                        }
                    }
                }
            }
        }

        for block in &self.blocks {
            let preds = self.predecessors_of(block.id);
            for inst in block.instructions() {
                if let InstructionKind::Phi { incomings } = &inst.kind {
                    for (_, pred) in incomings {
                        if !preds.contains(pred) {
                            return Err(VerifyError::PhiPredecessorMismatch(block.id, *pred));
                        }
                    }
                }
            }
        }

        let dom = Dominators::compute(self.entry, |b| self.successors_of(b));
        for block in &self.blocks {
            if !dom.is_reachable(block.id) {
                continue;
            }
            for inst in block.instructions() {
                // Phi operands are validated above via predecessor
                // membership, not dominance (a phi value need only be
                // defined somewhere along the named predecessor edge).
                if inst.is_phi() {
                    continue;
                }
                for operand in inst.operand_values() {
                    if let ValueDef::Instruction(def_block, def_index) = ids.get(operand) {
                        let same_block_earlier =
                            def_block == block.id && self.index_of(block, inst) > Some(def_index);
                        let dominates = dom.dominates(def_block, block.id) && def_block != block.id;
                        if !(same_block_earlier || dominates) {
                            return Err(VerifyError::OperandNotDominating(operand, block.id));
                        }
                    }
                    // Parameter / Global / Constant operands are always valid.
                }
            }
        }

        Ok(())
    }

    fn index_of(&self, block: &BasicBlock, inst: &crate::instruction::Instruction) -> Option<usize> {
        block
            .instructions()
            .iter()
            .position(|i| std::ptr::eq(i, inst))
    }
}
