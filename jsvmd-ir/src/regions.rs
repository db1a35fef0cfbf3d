//! Structured-region recovery from the CFG.
//!
//! Recognizes the five shapes the obfuscator's compiler emits: loops (the
//! V1 post-test and V2 pre-test patterns), if / if-else conditionals,
//! ternary expressions, short-circuit logical chains, and try/catch
//! regions. Regions are derived views keyed by instruction index; they do
//! not own blocks.

use std::collections::{HashMap, HashSet, VecDeque};

use jsvmd_isa::{ArgKind, Op};

use crate::cfg::{BlockId, Cfg};
use crate::dom::DomInfo;
use crate::instruction::Instruction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPattern {
    /// Initial forward `JUMP` to the condition, conditional back-edge.
    V1PostTest,
    /// Forward conditional exit, unconditional back-jump.
    V2PreTest,
}

#[derive(Debug, Clone)]
pub struct LoopRegion {
    pub pattern: LoopPattern,
    /// The leading unconditional jump (V1 only).
    pub init_jump_idx: Option<usize>,
    pub cond_start: usize,
    /// Last index of the condition region; equals `cond_jump_idx`.
    pub cond_end: usize,
    pub cond_jump_idx: usize,
    pub body_start: usize,
    /// Exclusive end of the body.
    pub body_end: usize,
    /// The unconditional back-jump (V2 only).
    pub back_jump_idx: Option<usize>,
    /// First index after the loop.
    pub exit_idx: usize,
    /// The conditional jump is `JUMP_IF_TRUE`.
    pub is_true: bool,
}

impl LoopRegion {
    /// The index where the lifter takes over: the init jump for V1, the
    /// start of the condition region for V2.
    pub fn entry_idx(&self) -> usize {
        match self.pattern {
            LoopPattern::V1PostTest => self.init_jump_idx.expect("V1 loop has init jump"),
            LoopPattern::V2PreTest => self.cond_start,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IfElseRegion {
    pub cond_block: BlockId,
    pub cond_jump_idx: usize,
    pub true_blocks: Vec<BlockId>,
    pub false_blocks: Vec<BlockId>,
    pub merge_block: BlockId,
    /// Both branches are single pure-expression blocks; the region reduces
    /// to one pushed `(cond ? a : b)` value.
    pub ternary: bool,
}

#[derive(Debug, Clone)]
pub struct LogicalRegion {
    /// `"&&"` or `"||"`.
    pub operator: &'static str,
    pub duplicate_idx: usize,
    pub jump_idx: usize,
    pub pop_idx: usize,
    pub right_start: usize,
    /// Exclusive; equals `target_idx`.
    pub right_end: usize,
    pub target_idx: usize,
}

#[derive(Debug, Clone)]
pub struct TryCatchRegion {
    pub try_push_idx: usize,
    pub try_start: usize,
    /// Index of the matching `TRY_POP` (exclusive end of the try body).
    pub try_end: usize,
    pub catch_addr: u32,
    pub catch_start: usize,
    /// Exclusive end of the catch body.
    pub catch_end: usize,
    pub finally_start: Option<usize>,
    pub finally_end: Option<usize>,
    pub after_addr: Option<u32>,
    /// First index after the whole region.
    pub continue_idx: usize,
}

/// All recognized regions for one function body, with lookup maps keyed by
/// the instruction index where the lifter must act.
#[derive(Debug, Default)]
pub struct Regions {
    pub loops: Vec<LoopRegion>,
    pub conditionals: Vec<IfElseRegion>,
    pub logicals: Vec<LogicalRegion>,
    pub trys: Vec<TryCatchRegion>,

    loop_by_entry: HashMap<usize, usize>,
    loop_cond_jumps: HashSet<usize>,
    cond_by_jump: HashMap<usize, usize>,
    logical_by_dup: HashMap<usize, usize>,
    try_by_push: HashMap<usize, usize>,
}

impl Regions {
    pub fn loop_at_entry(&self, idx: usize) -> Option<&LoopRegion> {
        self.loop_by_entry.get(&idx).map(|&i| &self.loops[i])
    }

    pub fn is_loop_cond_jump(&self, idx: usize) -> bool {
        self.loop_cond_jumps.contains(&idx)
    }

    pub fn conditional_at_jump(&self, idx: usize) -> Option<&IfElseRegion> {
        self.cond_by_jump.get(&idx).map(|&i| &self.conditionals[i])
    }

    pub fn logical_at(&self, idx: usize) -> Option<&LogicalRegion> {
        self.logical_by_dup.get(&idx).map(|&i| &self.logicals[i])
    }

    pub fn try_at(&self, idx: usize) -> Option<&TryCatchRegion> {
        self.try_by_push.get(&idx).map(|&i| &self.trys[i])
    }
}

pub fn recognize(instructions: &[Instruction], cfg: &Cfg, dom: &DomInfo) -> Regions {
    let mut regions = Regions::default();
    find_loops(instructions, cfg, &mut regions);
    find_conditionals(instructions, cfg, dom, &mut regions);
    find_logicals(instructions, cfg, &mut regions);
    find_trys(instructions, cfg, &mut regions);
    regions
}

/// Loop detection. One pass, ascending; an instruction already consumed by
/// a region is skipped, so no instruction lands in two loops.
fn find_loops(instructions: &[Instruction], cfg: &Cfg, regions: &mut Regions) {
    let mut used: HashSet<usize> = HashSet::new();

    for i in 0..instructions.len() {
        if used.contains(&i) {
            continue;
        }
        let insn = &instructions[i];

        // V1 post-test: forward JUMP to the condition region, then a
        // conditional whose target is at or before the initial jump.
        if insn.is(Op::Jump) {
            let Some(target) = insn.jump_target() else {
                continue;
            };
            if target <= insn.addr {
                continue;
            }
            let Some(cond_start) = cfg.index_of_addr(target) else {
                continue;
            };
            let cond_jump = (cond_start..instructions.len())
                .find(|&j| instructions[j].is_conditional_jump());
            let Some(j) = cond_jump else {
                continue;
            };
            if used.contains(&j) {
                continue;
            }
            let Some(back) = instructions[j].jump_target() else {
                continue;
            };
            // Back-edge lands on the body start (right after the init jump)
            // or earlier.
            let Some(back_idx) = cfg.index_of_addr(back) else {
                continue;
            };
            if back_idx > i + 1 {
                continue;
            }
            used.insert(i);
            used.insert(j);
            regions.loop_cond_jumps.insert(j);
            regions.loop_by_entry.insert(i, regions.loops.len());
            regions.loops.push(LoopRegion {
                pattern: LoopPattern::V1PostTest,
                init_jump_idx: Some(i),
                cond_start,
                cond_end: j,
                cond_jump_idx: j,
                body_start: i + 1,
                body_end: cond_start,
                back_jump_idx: None,
                exit_idx: j + 1,
                is_true: instructions[j].is(Op::JumpIfTrue),
            });
            continue;
        }

        // V2 pre-test: forward conditional exit, body, unconditional jump
        // back to (or before) the condition.
        if insn.is_conditional_jump() {
            let Some(exit_addr) = insn.jump_target() else {
                continue;
            };
            if exit_addr <= insn.addr {
                continue;
            }
            let Some(exit_idx) = cfg.index_of_addr(exit_addr) else {
                continue;
            };
            if exit_idx == 0 {
                continue;
            }
            let back = exit_idx - 1;
            if back <= i || used.contains(&back) {
                continue;
            }
            if !instructions[back].is(Op::Jump) {
                continue;
            }
            let Some(back_target) = instructions[back].jump_target() else {
                continue;
            };
            if back_target > insn.addr {
                continue;
            }
            let Some(cond_start) = cfg.index_of_addr(back_target) else {
                continue;
            };
            if cond_start > i {
                continue;
            }
            used.insert(i);
            used.insert(back);
            regions.loop_cond_jumps.insert(i);
            regions.loop_by_entry.insert(cond_start, regions.loops.len());
            regions.loops.push(LoopRegion {
                pattern: LoopPattern::V2PreTest,
                init_jump_idx: None,
                cond_start,
                cond_end: i,
                cond_jump_idx: i,
                body_start: i + 1,
                body_end: back,
                back_jump_idx: Some(back),
                exit_idx,
                is_true: insn.is(Op::JumpIfTrue),
            });
        }
    }
}

/// If / if-else and ternary recognition from dominance structure.
fn find_conditionals(
    instructions: &[Instruction],
    cfg: &Cfg,
    dom: &DomInfo,
    regions: &mut Regions,
) {
    for block in &cfg.blocks {
        if !block.is_conditional {
            continue;
        }
        let cond_jump_idx = block.end_idx - 1;
        if regions.is_loop_cond_jump(cond_jump_idx) {
            continue;
        }
        let (Some(t), Some(f)) = (block.true_successor, block.false_successor) else {
            continue;
        };
        if !dom.dominates(block.id, t) || !dom.dominates(block.id, f) {
            continue;
        }
        let Some(merge) = dom.ipost_dom[block.id] else {
            log::warn!(
                "no merge block for conditional at {:#06x}; leaving unstructured",
                instructions[cond_jump_idx].addr
            );
            continue;
        };

        let true_blocks = collect_branch(cfg, t, merge);
        let false_blocks = collect_branch(cfg, f, merge);

        let ternary = true_blocks.len() == 1
            && false_blocks.len() == 1
            && is_pure_block(instructions, cfg, true_blocks[0])
            && is_pure_block(instructions, cfg, false_blocks[0]);

        regions
            .cond_by_jump
            .insert(cond_jump_idx, regions.conditionals.len());
        regions.conditionals.push(IfElseRegion {
            cond_block: block.id,
            cond_jump_idx,
            true_blocks,
            false_blocks,
            merge_block: merge,
            ternary,
        });
    }
}

/// Blocks strictly between a branch head and the merge block, in BFS order.
fn collect_branch(cfg: &Cfg, head: BlockId, merge: BlockId) -> Vec<BlockId> {
    if head == merge {
        return vec![];
    }
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([head]);
    let mut out = Vec::new();
    while let Some(b) = queue.pop_front() {
        if b == merge || !seen.insert(b) {
            continue;
        }
        out.push(b);
        for &s in &cfg.blocks[b].succs {
            queue.push_back(s);
        }
    }
    out
}

/// All non-terminal instructions are pure expression builders; a terminal
/// unconditional JUMP (to the merge) is stripped.
fn is_pure_block(instructions: &[Instruction], cfg: &Cfg, block: BlockId) -> bool {
    let b = &cfg.blocks[block];
    let mut end = b.end_idx;
    if end > b.start_idx && instructions[end - 1].is(Op::Jump) {
        end -= 1;
    }
    instructions[b.start_idx..end]
        .iter()
        .all(|i| i.op.is_some_and(Op::is_pure_expression) && !i.is_jump())
}

/// Short-circuit logical chains: `[DUP, JUMP_IF_*, POP]` with a forward
/// target and a pure-expression tail up to it.
fn find_logicals(instructions: &[Instruction], cfg: &Cfg, regions: &mut Regions) {
    for i in 0..instructions.len() {
        if !instructions[i].is(Op::Dup) {
            continue;
        }
        if i + 2 >= instructions.len() {
            continue;
        }
        let jump = &instructions[i + 1];
        if !jump.is_conditional_jump() || !instructions[i + 2].is(Op::Pop) {
            continue;
        }
        let Some(target) = jump.jump_target() else {
            continue;
        };
        if target <= jump.addr {
            continue;
        }
        let Some(target_idx) = cfg.index_of_addr(target) else {
            continue;
        };
        let tail = &instructions[i + 3..target_idx];
        if tail.is_empty()
            || !tail
                .iter()
                .all(|t| t.op.is_some_and(Op::is_pure_expression) && !t.is(Op::Jump))
        {
            continue;
        }
        let operator = if jump.is(Op::JumpIfFalse) { "&&" } else { "||" };
        regions
            .logical_by_dup
            .insert(i, regions.logicals.len());
        regions.logicals.push(LogicalRegion {
            operator,
            duplicate_idx: i,
            jump_idx: i + 1,
            pop_idx: i + 2,
            right_start: i + 3,
            right_end: target_idx,
            target_idx,
        });
    }
}

/// Try/catch pairing via a linear scan with an auxiliary stack. Regions are
/// assumed well nested.
fn find_trys(instructions: &[Instruction], cfg: &Cfg, regions: &mut Regions) {
    let mut stack: Vec<usize> = Vec::new();

    for i in 0..instructions.len() {
        if instructions[i].is(Op::TryPush) {
            stack.push(i);
            continue;
        }
        if !instructions[i].is(Op::TryPop) {
            continue;
        }
        let Some(push_idx) = stack.pop() else {
            log::warn!("TRY_POP at {:#06x} without open try", instructions[i].addr);
            continue;
        };
        let push = &instructions[push_idx];
        let Some(catch_addr) = push.arg_u32(ArgKind::CatchAddr) else {
            continue;
        };
        let finally_addr = push.arg_u32(ArgKind::FinallyAddr).filter(|&a| a != 0);

        // The JUMP right after TRY_POP records the after-try-catch address.
        let after_addr = instructions
            .get(i + 1)
            .filter(|n| n.is(Op::Jump))
            .and_then(|n| n.jump_target());

        let Some(catch_start) = cfg.index_of_addr(catch_addr) else {
            log::warn!("catch address {catch_addr:#06x} resolves to no instruction");
            continue;
        };
        let finally_start = finally_addr.and_then(|a| cfg.index_of_addr(a));

        // The catch body ends at the jump targeting the after address, or
        // at the finally region, or at end of stream.
        let fallback_end = finally_start.unwrap_or(instructions.len());
        let catch_end = match after_addr {
            Some(after) => (catch_start..instructions.len())
                .find(|&j| instructions[j].is(Op::Jump) && instructions[j].jump_target() == Some(after))
                .unwrap_or(fallback_end),
            None => fallback_end,
        };

        let continue_idx = after_addr
            .and_then(|a| cfg.index_of_addr(a))
            .unwrap_or(catch_end);
        let finally_end = finally_start.map(|_| continue_idx);

        regions
            .try_by_push
            .insert(push_idx, regions.trys.len());
        regions.trys.push(TryCatchRegion {
            try_push_idx: push_idx,
            try_start: push_idx + 1,
            try_end: i,
            catch_addr,
            catch_start,
            catch_end,
            finally_start,
            finally_end,
            after_addr,
            continue_idx,
        });
    }
}
