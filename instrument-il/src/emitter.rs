//! `Emitter`: the only sanctioned mutation interface onto a `Function`
//! (Design Note 4 / §4.1). Features never touch `BasicBlock`/`Function`
//! push/insert/replace directly — they go through an `Emitter` cursor so
//! that result-value allocation, source-span marking, and block-splitting
//! stay centralized in one place instead of re-implemented per feature.

use smallvec::SmallVec;

use crate::block::{BasicBlock, BasicBlockFlags};
use crate::function::Function;
use crate::ids::{BlockId, ValueDef, ValueId};
use crate::identifier::IdentifierMap;
use crate::instruction::{Instruction, InstructionKind, SourceSpan};

/// A cursor into one block of one function, plus the `IdentifierMap` it
/// allocates result values from. Borrows both mutably, so only one
/// `Emitter` can be live against a given function at a time.
pub struct Emitter<'p> {
    func: &'p mut Function,
    ids: &'p mut IdentifierMap,
    block: BlockId,
    /// Insertion point: an index into the current block's instruction
    /// list. `append` always targets `len()`; `insert_before`/`split`
    /// move it explicitly.
    at: usize,
}

impl<'p> Emitter<'p> {
    pub fn at_end_of(func: &'p mut Function, ids: &'p mut IdentifierMap, block: BlockId) -> Self {
        let at = func.block(block).len();
        Emitter { func, ids, block, at }
    }

    pub fn at_index(func: &'p mut Function, ids: &'p mut IdentifierMap, block: BlockId, at: usize) -> Self {
        Emitter { func, ids, block, at }
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Append an instruction that produces a value; allocates and defines
    /// a fresh `ValueId`, marks it `SourceSpan::None` (injected, not
    /// derived from any original record), and returns the new value.
    pub fn emit(&mut self, kind: InstructionKind) -> ValueId {
        let result = self.ids.alloc();
        self.push_at_cursor(Instruction::new(kind, Some(result), SourceSpan::None));
        self.ids.define(result, ValueDef::Instruction(self.block, self.at - 1));
        result
    }

    /// Append an instruction with no result (a store, an export, a
    /// terminator).
    pub fn emit_void(&mut self, kind: InstructionKind) {
        self.push_at_cursor(Instruction::new(kind, None, SourceSpan::None));
    }

    fn push_at_cursor(&mut self, inst: Instruction) {
        let block = self.func.block_mut(self.block);
        if self.at >= block.len() {
            block.push(inst);
            self.at = block.len();
        } else {
            block.insert(self.at, inst);
            self.at += 1;
        }
    }

    /// Replace the instruction at `index` in the current block in place,
    /// marking its source span as needing re-synthesis if it had
    /// previously been trivially copyable (§3 "Source span").
    pub fn replace(&mut self, index: usize, kind: InstructionKind) {
        let block = self.func.block_mut(self.block);
        let old = block.instructions()[index].clone();
        let inst = Instruction::new(kind, old.result, old.source.modify());
        block.replace(index, inst);
    }

    /// Split the current block at `at`: everything from `at` onward moves
    /// into a newly allocated block, which is returned. Used by the
    /// guarded-store pattern (§4.4): a feature splits the block housing a
    /// store, inserts a bounds check ahead of the split point, and
    /// branches to either the new tail block or an injected failure block.
    ///
    /// The new tail block inherits none of the original's `MERGE`/
    /// `CONTINUE` flags (those describe the *original* block's role in
    /// structured control flow, which now belongs to whichever half still
    /// ends where the flag's construct expects); it is marked `INJECTED`.
    pub fn split(&mut self) -> BlockId {
        let new_id = self.func.alloc_block();
        let tail = self.func.block_mut(self.block).split_off(self.at);
        let new_block = self.func.block_mut(new_id);
        new_block.flags |= BasicBlockFlags::INJECTED;
        for inst in tail {
            new_block.push(inst);
        }
        self.renumber_moved_instructions(new_id);
        new_id
    }

    /// After `split` moves instructions physically, any `ValueDef`
    /// pointing at the old `(block, index)` pair for a moved instruction
    /// must be repointed at its new home.
    fn renumber_moved_instructions(&mut self, new_block: BlockId) {
        let len = self.func.block(new_block).len();
        let results: SmallVec<[(usize, ValueId); 8]> = self
            .func
            .block(new_block)
            .instructions()
            .iter()
            .enumerate()
            .filter_map(|(i, inst)| inst.result.map(|r| (i, r)))
            .collect();
        debug_assert!(results.len() <= len);
        for (index, value) in results {
            self.ids.define(value, ValueDef::Instruction(new_block, index));
        }
    }

    /// Allocate a fresh, empty block in the same function without
    /// touching the cursor's current position — used to build the target
    /// of an injected branch before wiring it up.
    pub fn new_block(&mut self) -> BlockId {
        self.func.alloc_block()
    }

    /// Move the cursor to the end of a (typically just-allocated) block.
    pub fn move_to_end_of(&mut self, block: BlockId) {
        self.block = block;
        self.at = self.func.block(block).len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TypeId;
    use crate::instruction::BinOpKind;

    fn new_function() -> (Function, IdentifierMap) {
        let f = Function::new("main", vec![], TypeId(0));
        (f, IdentifierMap::new())
    }

    #[test]
    fn emit_allocates_and_defines_result() {
        let (mut f, mut ids) = new_function();
        let entry = f.entry;
        let a = ids.alloc();
        let b = ids.alloc();
        let mut em = Emitter::at_end_of(&mut f, &mut ids, entry);
        let sum = em.emit(InstructionKind::BinOp { op: BinOpKind::Add, lhs: a, rhs: b });
        assert_eq!(ids.get(sum), ValueDef::Instruction(entry, 0));
    }

    #[test]
    fn split_moves_tail_and_renumbers_results() {
        let (mut f, mut ids) = new_function();
        let entry = f.entry;
        let a = ids.alloc();
        {
            let mut em = Emitter::at_end_of(&mut f, &mut ids, entry);
            em.emit(InstructionKind::BinOp { op: BinOpKind::Add, lhs: a, rhs: a });
            em.emit(InstructionKind::BinOp { op: BinOpKind::Sub, lhs: a, rhs: a });
        }
        let second_result = {
            let block = f.block(entry);
            block.instructions()[1].result.unwrap()
        };
        let new_block = {
            let mut em = Emitter::at_index(&mut f, &mut ids, entry, 1);
            em.split()
        };
        assert_eq!(f.block(entry).len(), 1);
        assert_eq!(f.block(new_block).len(), 1);
        assert_eq!(ids.get(second_result), ValueDef::Instruction(new_block, 0));
    }
}
