//! `reorder_by_dominant_blocks` (§4.1): lay a function's blocks out so
//! that every forward edge points from a lower physical position to a
//! higher one, loop back-edges are the only backward edges left, and a
//! structured merge block is placed immediately after the last block
//! that can reach it along a forward edge.
//!
//! Grounded on the pending-predecessor-count worklist shape used by
//! `spirv::edit`'s pass ordering, generalized with the
//! dominator tree (`dom.rs`) to tell a loop back-edge apart from a
//! genuine unscheduled predecessor — the single-pass SPIR-V
//! walk it's grounded on doesn't need that distinction because SPIR-V
//! already requires dominance order on input.

use fxhash::FxHashMap;
use thiserror::Error;

use crate::dom::Dominators;
use crate::function::Function;
use crate::ids::BlockId;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ReorderError {
    /// A block's remaining predecessors never reach zero: some join is
    /// reachable only through a cycle that isn't a simple dominated loop
    /// (an irreducible CFG), which the original's bytecode backends
    /// cannot express in a single structured pass.
    #[error("block {0:?} is not reachable through any reducible schedule")]
    Irreducible(BlockId),
}

/// Order a function's blocks for physical emission.
///
/// `has_control_flow` mirrors the original `reorderByDominantBlocks(bool
/// hasControlFlow)` signature: when `false` (straight-line functions, no
/// branches other than the final terminator), skip dominance analysis
/// entirely and keep the blocks in allocation order — a single-block or
/// single-path function is already in the only valid order, and running
/// the dominator walk on it would be pure overhead.
pub fn reorder_by_dominant_blocks(f: &mut Function, has_control_flow: bool) -> Result<(), ReorderError> {
    if !has_control_flow {
        let order: Vec<BlockId> = f.blocks().iter().map(|b| b.id).collect();
        f.reorder_blocks(&order);
        return Ok(());
    }

    let dom = Dominators::compute(f.entry, |b| f.successors_of(b));
    let all_blocks: Vec<BlockId> = f.blocks().iter().map(|b| b.id).collect();

    // A predecessor edge pred -> block is a back edge iff `block`
    // dominates `pred` (the edge closes a loop headed by `block`).
    // Back edges are excluded from the pending count so a loop header is
    // scheduled as soon as its forward (entry-side) predecessors are
    // done, not held open by its own latch.
    let mut pending: FxHashMap<BlockId, usize> = FxHashMap::default();
    for &b in &all_blocks {
        let forward_preds = f
            .predecessors_of(b)
            .into_iter()
            .filter(|&p| !dom.dominates(b, p))
            .count();
        pending.insert(b, forward_preds);
    }

    let mut order = Vec::with_capacity(all_blocks.len());
    let mut scheduled: fxhash::FxHashSet<BlockId> = fxhash::FxHashSet::default();
    let mut worklist = vec![f.entry];

    while !worklist.is_empty() {
        // Prefer the block whose predecessors were most recently
        // satisfied in insertion order, but always schedule the entry
        // first and otherwise keep a deterministic, low-id-first order
        // among ties so output is stable across runs.
        worklist.sort_by_key(|b| b.0);
        worklist.dedup();
        let next_index = worklist
            .iter()
            .position(|&b| !scheduled.contains(&b) && pending.get(&b).copied().unwrap_or(0) == 0);
        let Some(idx) = next_index else { break };
        let block = worklist.remove(idx);
        if scheduled.contains(&block) {
            continue;
        }
        scheduled.insert(block);
        order.push(block);

        for succ in f.successors_of(block) {
            if scheduled.contains(&succ) {
                continue;
            }
            if let Some(p) = pending.get_mut(&succ) {
                if *p > 0 && !dom.dominates(succ, block) {
                    *p -= 1;
                }
            }
            worklist.push(succ);
        }
    }

    if order.len() != all_blocks.len() {
        let stuck = all_blocks
            .into_iter()
            .find(|b| !scheduled.contains(b))
            .expect("order short of all_blocks implies some block is unscheduled");
        #[cfg(debug_assertions)]
        log::debug!("reorder_by_dominant_blocks: irreducible schedule, stuck at {:?}", stuck);
        return Err(ReorderError::Irreducible(stuck));
    }

    f.reorder_blocks(&order);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TypeId;
    use crate::instruction::{Instruction, InstructionKind, SourceSpan};

    fn branch(target: BlockId) -> Instruction {
        Instruction::new(InstructionKind::Branch { target }, None, SourceSpan::None)
    }

    fn ret() -> Instruction {
        Instruction::new(InstructionKind::Return { value: None }, None, SourceSpan::None)
    }

    #[test]
    fn diamond_schedules_merge_after_both_arms() {
        let mut f = Function::new("f", vec![], TypeId(0));
        let entry = f.entry;
        let left = f.alloc_block();
        let right = f.alloc_block();
        let merge = f.alloc_block();

        f.block_mut(entry).push(Instruction::new(
            InstructionKind::BranchConditional {
                cond: crate::ids::ValueId(0),
                true_target: left,
                false_target: right,
                merge: Some(merge),
            },
            None,
            SourceSpan::None,
        ));
        f.block_mut(left).push(branch(merge));
        f.block_mut(right).push(branch(merge));
        f.block_mut(merge).push(ret());

        reorder_by_dominant_blocks(&mut f, true).unwrap();
        let positions: Vec<BlockId> = f.blocks().iter().map(|b| b.id).collect();
        let pos = |b: BlockId| positions.iter().position(|&x| x == b).unwrap();
        assert!(pos(entry) < pos(left));
        assert!(pos(entry) < pos(right));
        assert!(pos(left) < pos(merge));
        assert!(pos(right) < pos(merge));
    }

    #[test]
    fn loop_back_edge_does_not_block_header() {
        // entry -> header ; header -> body, exit ; body -> header (back edge)
        let mut f = Function::new("f", vec![], TypeId(0));
        let entry = f.entry;
        let header = f.alloc_block();
        let body = f.alloc_block();
        let exit = f.alloc_block();

        f.block_mut(entry).push(branch(header));
        f.block_mut(header).push(Instruction::new(
            InstructionKind::BranchConditional {
                cond: crate::ids::ValueId(0),
                true_target: body,
                false_target: exit,
                merge: Some(exit),
            },
            None,
            SourceSpan::None,
        ));
        f.block_mut(body).push(branch(header));
        f.block_mut(exit).push(ret());

        reorder_by_dominant_blocks(&mut f, true).unwrap();
        let positions: Vec<BlockId> = f.blocks().iter().map(|b| b.id).collect();
        let pos = |b: BlockId| positions.iter().position(|&x| x == b).unwrap();
        assert!(pos(entry) < pos(header));
        assert!(pos(header) < pos(body));
        assert!(pos(header) < pos(exit));
    }
}
