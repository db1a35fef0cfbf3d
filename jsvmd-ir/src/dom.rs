//! Iterative dominator and post-dominator analysis.
//!
//! Plain intersect-to-fixpoint over block-id sets, seeded with the
//! all-blocks approximation. Small CFGs make the simple algorithm fine;
//! results stay addressable by block id for the region recognizer.

use std::collections::BTreeSet;

use crate::cfg::{BlockId, Cfg};

#[derive(Debug)]
pub struct DomInfo {
    pub dom: Vec<BTreeSet<BlockId>>,
    pub post_dom: Vec<BTreeSet<BlockId>>,
    pub idom: Vec<Option<BlockId>>,
    pub ipost_dom: Vec<Option<BlockId>>,
}

impl DomInfo {
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.dom[b].contains(&a)
    }

    pub fn post_dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.post_dom[b].contains(&a)
    }
}

pub fn analyze(cfg: &Cfg) -> DomInfo {
    let n = cfg.blocks.len();
    if n == 0 {
        return DomInfo {
            dom: vec![],
            post_dom: vec![],
            idom: vec![],
            ipost_dom: vec![],
        };
    }

    let all: BTreeSet<BlockId> = (0..n).collect();

    // Forward: Dom(entry) = {entry}; Dom(n) = {n} ∪ ⋂ Dom(preds).
    let mut dom: Vec<BTreeSet<BlockId>> = vec![all.clone(); n];
    dom[cfg.entry] = [cfg.entry].into_iter().collect();
    let mut changed = true;
    while changed {
        changed = false;
        for b in 0..n {
            if b == cfg.entry {
                continue;
            }
            let mut new: Option<BTreeSet<BlockId>> = None;
            for &p in &cfg.blocks[b].preds {
                new = Some(match new {
                    None => dom[p].clone(),
                    Some(acc) => acc.intersection(&dom[p]).copied().collect(),
                });
            }
            let mut new = new.unwrap_or_default();
            new.insert(b);
            if new != dom[b] {
                dom[b] = new;
                changed = true;
            }
        }
    }

    // Backward mirror, seeded with the exit blocks.
    let mut post_dom: Vec<BTreeSet<BlockId>> = vec![all; n];
    for &e in &cfg.exits {
        post_dom[e] = [e].into_iter().collect();
    }
    let mut changed = true;
    while changed {
        changed = false;
        for b in (0..n).rev() {
            if cfg.exits.contains(&b) {
                continue;
            }
            let mut new: Option<BTreeSet<BlockId>> = None;
            for &s in &cfg.blocks[b].succs {
                new = Some(match new {
                    None => post_dom[s].clone(),
                    Some(acc) => acc.intersection(&post_dom[s]).copied().collect(),
                });
            }
            let mut new = new.unwrap_or_default();
            new.insert(b);
            if new != post_dom[b] {
                post_dom[b] = new;
                changed = true;
            }
        }
    }

    let idom = (0..n).map(|b| immediate(&dom, b)).collect();
    let ipost_dom = (0..n).map(|b| immediate(&post_dom, b)).collect();

    DomInfo {
        dom,
        post_dom,
        idom,
        ipost_dom,
    }
}

/// The strict (post-)dominator closest to `b`: the candidate whose own set
/// contains every other candidate.
fn immediate(sets: &[BTreeSet<BlockId>], b: BlockId) -> Option<BlockId> {
    let candidates: Vec<BlockId> = sets[b].iter().copied().filter(|&d| d != b).collect();
    candidates
        .iter()
        .copied()
        .find(|&c| candidates.iter().all(|&other| sets[c].contains(&other)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Arg, ArgValue, Instruction};
    use jsvmd_isa::{ArgKind, Op};

    fn insn(addr: u32, op: Op) -> Instruction {
        Instruction::new(addr, 0, Some(op))
    }

    fn jump(addr: u32, op: Op, target: u32) -> Instruction {
        let mut i = Instruction::new(addr, 0, Some(op));
        i.args.push(Arg {
            kind: ArgKind::Address,
            value: ArgValue::U32(target),
        });
        i
    }

    /// Diamond: b0 -> {b1, b2} -> b3.
    fn diamond() -> Cfg {
        let insns = vec![
            insn(0, Op::PushBool),
            jump(1, Op::JumpIfFalse, 20),
            insn(10, Op::PushInt),
            jump(11, Op::Jump, 30),
            insn(20, Op::PushInt),
            insn(30, Op::Return),
        ];
        Cfg::build(&insns)
    }

    #[test]
    fn entry_dominates_itself_only() {
        let cfg = diamond();
        let info = analyze(&cfg);
        assert_eq!(info.dom[cfg.entry].len(), 1);
        assert!(info.dom[cfg.entry].contains(&cfg.entry));
    }

    #[test]
    fn every_block_dominates_itself() {
        let cfg = diamond();
        let info = analyze(&cfg);
        for b in 0..cfg.blocks.len() {
            assert!(info.dom[b].contains(&b));
        }
    }

    #[test]
    fn merge_block_post_dominates_condition() {
        let cfg = diamond();
        let info = analyze(&cfg);
        // Block containing the return (addr 30) post-dominates block 0.
        let merge = cfg.block_of(5).unwrap();
        assert!(info.post_dominates(merge, 0));
        assert_eq!(info.ipost_dom[0], Some(merge));
    }

    #[test]
    fn branches_are_dominated_by_condition() {
        let cfg = diamond();
        let info = analyze(&cfg);
        let then_block = cfg.block_of(2).unwrap();
        let else_block = cfg.block_of(4).unwrap();
        assert!(info.dominates(0, then_block));
        assert!(info.dominates(0, else_block));
        assert_eq!(info.idom[then_block], Some(0));
        assert_eq!(info.idom[else_block], Some(0));
    }
}
