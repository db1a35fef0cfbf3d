//! Basic-block partitioning and control-flow edges.

use std::collections::{BTreeMap, BTreeSet};

use jsvmd_isa::Op;

use crate::instruction::Instruction;

/// Index of a basic block within the CFG.
pub type BlockId = usize;

/// A maximal straight-line instruction run. Index range is half-open:
/// `[start_idx, end_idx)` into the instruction array.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub start_idx: usize,
    pub end_idx: usize,
    pub succs: Vec<BlockId>,
    pub preds: Vec<BlockId>,
    /// Ends with `JUMP_IF_TRUE` / `JUMP_IF_FALSE`.
    pub is_conditional: bool,
    /// Successor taken when the condition is truthy.
    pub true_successor: Option<BlockId>,
    /// Successor taken when the condition is falsy.
    pub false_successor: Option<BlockId>,
}

/// Control-flow graph for one function body.
#[derive(Debug)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub exits: Vec<BlockId>,
    addr_to_idx: BTreeMap<u32, usize>,
    idx_to_block: Vec<BlockId>,
}

impl Cfg {
    /// Instruction index for an address, when the address is a valid
    /// instruction boundary.
    pub fn index_of_addr(&self, addr: u32) -> Option<usize> {
        self.addr_to_idx.get(&addr).copied()
    }

    /// Which block contains the instruction at `idx`.
    pub fn block_of(&self, idx: usize) -> Option<BlockId> {
        self.idx_to_block.get(idx).copied()
    }

    pub fn build(instructions: &[Instruction]) -> Cfg {
        let mut addr_to_idx = BTreeMap::new();
        for (i, insn) in instructions.iter().enumerate() {
            addr_to_idx.insert(insn.addr, i);
        }

        if instructions.is_empty() {
            return Cfg {
                blocks: vec![],
                entry: 0,
                exits: vec![],
                addr_to_idx,
                idx_to_block: vec![],
            };
        }

        // Leaders: index 0, every jump target, and the instruction after
        // any jump or RETURN.
        let mut leaders = BTreeSet::new();
        leaders.insert(0usize);
        for (i, insn) in instructions.iter().enumerate() {
            if let Some(target) = insn.jump_target() {
                match addr_to_idx.get(&target) {
                    Some(&t) => {
                        leaders.insert(t);
                    }
                    None => {
                        log::warn!(
                            "jump at {:#06x} targets unknown address {target:#06x}",
                            insn.addr
                        );
                    }
                }
            }
            if insn.is_jump() || insn.is(Op::Return) {
                if i + 1 < instructions.len() {
                    leaders.insert(i + 1);
                }
            }
        }

        let leader_vec: Vec<usize> = leaders.into_iter().collect();
        let mut blocks = Vec::with_capacity(leader_vec.len());
        let mut idx_to_block = vec![0; instructions.len()];

        for (bi, &start_idx) in leader_vec.iter().enumerate() {
            let end_idx = leader_vec
                .get(bi + 1)
                .copied()
                .unwrap_or(instructions.len());
            for slot in idx_to_block.iter_mut().take(end_idx).skip(start_idx) {
                *slot = bi;
            }
            let last = &instructions[end_idx - 1];
            blocks.push(BasicBlock {
                id: bi,
                start_idx,
                end_idx,
                succs: vec![],
                preds: vec![],
                is_conditional: last.is_conditional_jump(),
                true_successor: None,
                false_successor: None,
            });
        }

        // Edges.
        let mut exits = Vec::new();
        for bi in 0..blocks.len() {
            let last_idx = blocks[bi].end_idx - 1;
            let last = &instructions[last_idx];
            let fallthrough = (bi + 1 < blocks.len()).then_some(bi + 1);
            let target_block = last
                .jump_target()
                .and_then(|t| addr_to_idx.get(&t).copied())
                .map(|idx| idx_to_block[idx]);

            match last.op {
                Some(Op::Return) => exits.push(bi),
                Some(Op::Jump) => {
                    if let Some(t) = target_block {
                        blocks[bi].succs.push(t);
                    }
                }
                Some(Op::JumpIfTrue) => {
                    if let Some(t) = target_block {
                        blocks[bi].succs.push(t);
                        blocks[bi].true_successor = Some(t);
                    }
                    if let Some(ft) = fallthrough {
                        blocks[bi].succs.push(ft);
                        blocks[bi].false_successor = Some(ft);
                    }
                }
                Some(Op::JumpIfFalse) => {
                    if let Some(t) = target_block {
                        blocks[bi].succs.push(t);
                        blocks[bi].false_successor = Some(t);
                    }
                    if let Some(ft) = fallthrough {
                        blocks[bi].succs.push(ft);
                        blocks[bi].true_successor = Some(ft);
                    }
                }
                _ => {
                    if let Some(ft) = fallthrough {
                        blocks[bi].succs.push(ft);
                    } else {
                        exits.push(bi);
                    }
                }
            }
        }

        for bi in 0..blocks.len() {
            let succs = blocks[bi].succs.clone();
            for s in succs {
                if !blocks[s].preds.contains(&bi) {
                    blocks[s].preds.push(bi);
                }
            }
        }

        Cfg {
            blocks,
            entry: 0,
            exits,
            addr_to_idx,
            idx_to_block,
        }
    }
}
