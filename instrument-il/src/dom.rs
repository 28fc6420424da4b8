//! Dominator-tree computation used by `Function::verify_ssa` to check the
//! IL invariant of §3/§8: every non-terminator operand is a constant,
//! parameter, or an instruction whose defining block dominates its use.
//!
//! Standard iterative (Cooper/Harvey/Kennedy) algorithm over reverse
//! postorder; small and simple rather than a sparse/tree-based variant,
//! matching the scale of a single shader function.

use fxhash::FxHashMap;

use crate::ids::BlockId;

pub struct Dominators {
    /// Immediate dominator per block, keyed by reverse-postorder index.
    idom: Vec<usize>,
    rpo: Vec<BlockId>,
    index_of: FxHashMap<BlockId, usize>,
}

impl Dominators {
    pub fn compute(entry: BlockId, successors: impl Fn(BlockId) -> Vec<BlockId>) -> Dominators {
        let rpo = reverse_postorder(entry, &successors);
        let mut index_of = FxHashMap::default();
        for (i, &b) in rpo.iter().enumerate() {
            index_of.insert(b, i);
        }

        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); rpo.len()];
        for (i, &b) in rpo.iter().enumerate() {
            for s in successors(b) {
                if let Some(&si) = index_of.get(&s) {
                    preds[si].push(i);
                }
            }
        }

        let undefined = usize::MAX;
        let mut idom = vec![undefined; rpo.len()];
        idom[0] = 0;
        let mut changed = true;
        while changed {
            changed = false;
            for i in 1..rpo.len() {
                let mut new_idom = undefined;
                for &p in &preds[i] {
                    if idom[p] == undefined {
                        continue;
                    }
                    new_idom = match new_idom {
                        undef if undef == undefined => p,
                        other => intersect(&idom, other, p),
                    };
                }
                if new_idom != undefined && idom[i] != new_idom {
                    idom[i] = new_idom;
                    changed = true;
                }
            }
        }

        Dominators { idom, rpo, index_of }
    }

    /// Does `a` dominate `b`? Unreachable blocks (absent from the
    /// reverse-postorder walk) dominate nothing and are dominated by
    /// nothing.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let (Some(&ai), Some(&bi)) = (self.index_of.get(&a), self.index_of.get(&b)) else {
            return false;
        };
        let mut cur = bi;
        loop {
            if cur == ai {
                return true;
            }
            if cur == 0 {
                return ai == 0;
            }
            cur = self.idom[cur];
        }
    }

    pub fn is_reachable(&self, b: BlockId) -> bool {
        self.index_of.contains_key(&b)
    }
}

fn intersect(idom: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            a = idom[a];
        }
        while b > a {
            b = idom[b];
        }
    }
    a
}

fn reverse_postorder(entry: BlockId, successors: &impl Fn(BlockId) -> Vec<BlockId>) -> Vec<BlockId> {
    let mut visited = fxhash::FxHashSet::default();
    let mut post = Vec::new();
    let mut stack = vec![(entry, false)];
    while let Some((b, expanded)) = stack.pop() {
        if expanded {
            post.push(b);
            continue;
        }
        if !visited.insert(b) {
            continue;
        }
        stack.push((b, true));
        for s in successors(b) {
            if !visited.contains(&s) {
                stack.push((s, false));
            }
        }
    }
    post.reverse();
    post
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_chain_dominates_in_order() {
        let b0 = BlockId(0);
        let b1 = BlockId(1);
        let b2 = BlockId(2);
        let succ = |b: BlockId| match b.0 {
            0 => vec![b1],
            1 => vec![b2],
            _ => vec![],
        };
        let dom = Dominators::compute(b0, succ);
        assert!(dom.dominates(b0, b1));
        assert!(dom.dominates(b0, b2));
        assert!(dom.dominates(b1, b2));
        assert!(!dom.dominates(b2, b0));
    }

    #[test]
    fn diamond_join_only_dominated_by_entry() {
        // b0 -> b1, b2 ; b1 -> b3 ; b2 -> b3
        let b0 = BlockId(0);
        let b1 = BlockId(1);
        let b2 = BlockId(2);
        let b3 = BlockId(3);
        let succ = |b: BlockId| match b.0 {
            0 => vec![b1, b2],
            1 => vec![b3],
            2 => vec![b3],
            _ => vec![],
        };
        let dom = Dominators::compute(b0, succ);
        assert!(dom.dominates(b0, b3));
        assert!(!dom.dominates(b1, b3));
        assert!(!dom.dominates(b2, b3));
    }
}
