//! Lowering the linear order plus intervals to structured stack-machine
//! control flow.
//!
//! The emitter walks the final positions once, opening regions when their
//! chain head is reached and closing them at their own end. Branches
//! become depth-indexed ops: depth 0 is the innermost open region, a
//! forward branch targets a `Block`'s end, a backward branch targets a
//! `Loop`'s start.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ir::{BlockId, Function, TempId, Terminator};

use super::intervals::Interval;
use super::linearize::FinalOrder;

/// One structured control op. `Body` stands for a block's straight-line
/// operations, which live in the surrounding compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructuredOp {
    Block,
    Loop,
    End,
    Body(BlockId),
    Br { depth: u32 },
    /// Taken when the block's condition holds; the condition's sense is the
    /// terminator's `negated` flag.
    BrIf { cond: TempId, depth: u32 },
    /// `depths[i]` serves selector value `i`; out-of-range values take
    /// `default`.
    BrTable {
        selector: TempId,
        depths: Vec<u32>,
        default: u32,
    },
    Return,
    Throw,
    CallFinally { handler: BlockId },
    EhReturn,
}

/// Emitter output plus the side information tests and consumers key on.
#[derive(Debug)]
pub struct Emission {
    pub ops: Vec<StructuredOp>,
    /// Label-carrying blocks: every opened loop's header and every block
    /// interval's merge point.
    pub labeled: HashSet<BlockId>,
    /// Open-region stack depth at each linear position, after opens.
    pub depth_at: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
struct OpenRegion {
    start: u32,
    end: u32,
    is_loop: bool,
}

/// Invert conditionals whose likely-true arm is the lexical successor, so
/// every conditional falls through on false. Run once, before emission.
pub fn normalize_branches(func: &mut Function, order: &FinalOrder) {
    for (pos, block) in order.iter() {
        if let Terminator::CondJump {
            true_target,
            false_target,
            ..
        } = func.blocks[block].terminator
        {
            if true_target == false_target {
                continue;
            }
            if order.position(true_target) == Some(pos + 1) {
                func.blocks[block].terminator.invert();
            }
        }
    }
}

/// Depth of the innermost open region whose label is `target_pos`. A
/// backward branch must land on a `Loop` start, a forward branch on a
/// `Block` end.
fn branch_depth(open: &[OpenRegion], source_pos: u32, target_pos: u32) -> u32 {
    let backward = target_pos <= source_pos;
    for (depth, region) in open.iter().rev().enumerate() {
        let label_pos = if region.is_loop {
            region.start
        } else {
            region.end
        };
        if label_pos == target_pos && region.is_loop == backward {
            return depth as u32;
        }
    }
    panic!(
        "no open region labels position {target_pos} (branch from {source_pos}, \
         {} regions open)",
        open.len()
    );
}

/// Lower the ordered function to structured ops.
///
/// Conditionals must already be normalized (`normalize_branches`); this
/// walk only computes depths, never flips a condition's sense. A
/// conditional whose true arm falls through here is a fatal invariant
/// violation.
pub fn emit(func: &Function, order: &FinalOrder, intervals: &[Interval]) -> Emission {
    let count = order.sentinel();
    let pos_of = |target: BlockId| -> u32 {
        order
            .position(target)
            .unwrap_or_else(|| panic!("branch target {target:?} missing from the final order"))
    };

    let mut ops: Vec<StructuredOp> = Vec::new();
    let mut labeled: HashSet<BlockId> = HashSet::new();
    let mut depth_at: Vec<u32> = Vec::with_capacity(count as usize);
    let mut open: Vec<OpenRegion> = Vec::new();
    let mut next = 0usize;

    for (pos, block) in order.iter() {
        while open.last().is_some_and(|r| r.end == pos) {
            open.pop();
            ops.push(StructuredOp::End);
        }
        while next < intervals.len() && intervals[next].head_start == pos {
            let iv = &intervals[next];
            if iv.is_loop {
                ops.push(StructuredOp::Loop);
                // Back-edge target.
                labeled.insert(order.block_at(iv.start));
            } else {
                ops.push(StructuredOp::Block);
                // Forward-branch target; block ends never sit at the
                // sentinel, so this position is a real block.
                labeled.insert(order.block_at(iv.end));
            }
            open.push(OpenRegion {
                start: iv.start,
                end: iv.end,
                is_loop: iv.is_loop,
            });
            next += 1;
        }
        depth_at.push(open.len() as u32);

        ops.push(StructuredOp::Body(block));

        let branch_to = |target: BlockId| -> Option<u32> {
            let target_pos = pos_of(target);
            if target_pos == pos + 1 {
                return None;
            }
            Some(branch_depth(&open, pos, target_pos))
        };

        match func.blocks[block].terminator.clone() {
            Terminator::Jump { target } => {
                if let Some(depth) = branch_to(target) {
                    ops.push(StructuredOp::Br { depth });
                }
            }
            Terminator::CondJump {
                cond,
                true_target,
                false_target,
                ..
            } => {
                if true_target == false_target {
                    // Degenerate conditional; a plain jump.
                    if let Some(depth) = branch_to(true_target) {
                        ops.push(StructuredOp::Br { depth });
                    }
                } else {
                    if let Some(depth) = branch_to(true_target) {
                        ops.push(StructuredOp::BrIf { cond, depth });
                    } else {
                        // Normalization guarantees the true arm never falls
                        // through while the false arm branches.
                        panic!(
                            "conditional at position {pos} still falls through on true"
                        );
                    }
                    if let Some(depth) = branch_to(false_target) {
                        ops.push(StructuredOp::Br { depth });
                    }
                }
            }
            Terminator::Switch { selector, cases } => {
                let depths: Vec<u32> = cases
                    .iter()
                    .map(|case| branch_depth(&open, pos, pos_of(case.target)))
                    .collect();
                let (&default, table) = depths
                    .split_last()
                    .unwrap_or_else(|| panic!("empty switch at position {pos}"));
                ops.push(StructuredOp::BrTable {
                    selector,
                    depths: table.to_vec(),
                    default,
                });
            }
            Terminator::Return => ops.push(StructuredOp::Return),
            Terminator::Throw => ops.push(StructuredOp::Throw),
            Terminator::CallFinally {
                handler,
                continuation,
            } => {
                ops.push(StructuredOp::CallFinally { handler });
                if let Some(depth) = branch_to(continuation) {
                    ops.push(StructuredOp::Br { depth });
                }
            }
            Terminator::FinallyContinuation { target } => {
                if let Some(depth) = branch_to(target) {
                    ops.push(StructuredOp::Br { depth });
                }
            }
            Terminator::EhReturn { .. } => ops.push(StructuredOp::EhReturn),
        }
    }

    while open.pop().is_some() {
        ops.push(StructuredOp::End);
    }
    debug_assert_eq!(next, intervals.len(), "unopened intervals left over");

    Emission {
        ops,
        labeled,
        depth_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FlowGraph, FunctionBuilder};
    use crate::restructure::dfs::run_method_dfs;
    use crate::restructure::intervals::{build_intervals, resolve_chains, sort_intervals};
    use crate::restructure::linearize::linearize;
    use crate::restructure::loops::NaturalLoops;
    use StructuredOp::*;

    fn lower(func: &mut Function) -> Emission {
        let graph = FlowGraph::build(func, false);
        let dfs = run_method_dfs(func, &graph);
        let loops = NaturalLoops::analyze(func, &graph, &dfs.result);
        let order = linearize(&dfs.result, &loops);
        let mut intervals = build_intervals(func, &graph, &order, &loops);
        resolve_chains(&mut intervals);
        sort_intervals(&mut intervals);
        normalize_branches(func, &order);
        emit(func, &order, &intervals)
    }

    #[test]
    fn diamond_lowers_to_nested_blocks() {
        let mut b = FunctionBuilder::new("diamond");
        let then_bb = b.create_block();
        let else_bb = b.create_block();
        let join = b.create_block();
        let entry = b.current_block();
        let cond = b.temp();
        b.cond_jump(cond, then_bb, else_bb);
        b.switch_to_block(then_bb);
        b.jump(join);
        b.switch_to_block(else_bb);
        b.jump(join);
        b.switch_to_block(join);
        b.ret();
        let mut func = b.build();

        let emission = lower(&mut func);
        assert_eq!(
            emission.ops,
            vec![
                Block,
                Block,
                Body(entry),
                BrIf { cond, depth: 0 },
                Body(else_bb),
                Br { depth: 1 },
                End,
                Body(then_bb),
                End,
                Body(join),
                Return,
            ]
        );
        assert!(emission.labeled.contains(&then_bb));
        assert!(emission.labeled.contains(&join));
        assert!(!emission.ops.contains(&Loop));
    }

    #[test]
    fn while_loop_gets_a_backward_branch() {
        let mut b = FunctionBuilder::new("while_loop");
        let header = b.create_block();
        let body = b.create_block();
        let exit = b.create_block();
        let entry = b.current_block();
        b.jump(header);
        b.switch_to_block(header);
        let cond = b.temp();
        b.cond_jump(cond, body, exit);
        b.switch_to_block(body);
        b.jump(header);
        b.switch_to_block(exit);
        b.ret();
        let mut func = b.build();

        let emission = lower(&mut func);
        assert_eq!(
            emission.ops,
            vec![
                Body(entry),
                Loop,
                Block,
                Body(header),
                BrIf { cond, depth: 0 },
                Body(body),
                Br { depth: 1 },
                End,
                End,
                Body(exit),
                Return,
            ]
        );
        // The exit test was inverted so the loop body falls through.
        match &func.blocks[header].terminator {
            Terminator::CondJump {
                true_target,
                negated,
                ..
            } => {
                assert_eq!(*true_target, exit);
                assert!(*negated);
            }
            other => panic!("expected a conditional, got {other:?}"),
        }
    }

    #[test]
    fn switch_lowers_to_br_table_with_last_case_as_default() {
        let mut b = FunctionBuilder::new("switch4");
        let c0 = b.create_block();
        let c1 = b.create_block();
        let c2 = b.create_block();
        let c3 = b.create_block();
        let entry = b.current_block();
        let sel = b.temp();
        b.switch(sel, &[c0, c1, c2, c3]);
        for case in [c0, c1, c2, c3] {
            b.switch_to_block(case);
            b.ret();
        }
        let mut func = b.build();

        let emission = lower(&mut func);
        assert_eq!(emission.ops[..4], [Block, Block, Block, Block]);
        assert_eq!(emission.ops[4], Body(entry));
        // Cases are laid out in reverse: the first case is explored first,
        // finishes first, and so lands last in reverse postorder.
        assert_eq!(
            emission.ops[5],
            BrTable {
                selector: sel,
                depths: vec![3, 2, 1],
                default: 0,
            }
        );
        let ends = emission.ops.iter().filter(|op| **op == End).count();
        assert_eq!(ends, 4);
    }
}
