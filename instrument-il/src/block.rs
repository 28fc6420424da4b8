//! `BasicBlock`: an ordered list of instructions ending in a terminator
//! (§3). Predecessor/successor edges are never stored as back-pointers
//! (Design Note 2) — a block's predecessors are derived on demand from
//! every other block's terminator successors.

use bitflags::bitflags;

use crate::ids::BlockId;
use crate::instruction::Instruction;

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct BasicBlockFlags: u32 {
        /// This block is a structured-control-flow merge target.
        const MERGE = 0b0001;
        /// This block is a structured loop's continue target.
        const CONTINUE = 0b0010;
        /// Added by instrumentation (the `fail` or `resume` half of a
        /// guarded rewrite), not present in the original bytecode.
        const INJECTED = 0b0100;
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub flags: BasicBlockFlags,
    instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        BasicBlock { id, flags: BasicBlockFlags::empty(), instructions: Vec::new() }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn instructions_mut(&mut self) -> &mut [Instruction] {
        &mut self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    /// Append an instruction. If the block already has a terminator,
    /// pushing past it is a caller bug (the Emitter is the only
    /// sanctioned mutation path and never does this).
    pub fn push(&mut self, inst: Instruction) {
        debug_assert!(
            self.terminator().is_none(),
            "pushed an instruction after a block terminator"
        );
        self.instructions.push(inst);
    }

    pub fn insert(&mut self, index: usize, inst: Instruction) {
        self.instructions.insert(index, inst);
    }

    pub fn replace(&mut self, index: usize, inst: Instruction) -> Instruction {
        std::mem::replace(&mut self.instructions[index], inst)
    }

    pub fn remove(&mut self, index: usize) -> Instruction {
        self.instructions.remove(index)
    }

    /// Split this block's tail (from `at` onward) into a new block's
    /// instruction list, leaving `self` holding everything before `at`.
    /// Used by `Emitter::split`.
    pub fn split_off(&mut self, at: usize) -> Vec<Instruction> {
        self.instructions.split_off(at)
    }
}
