//! Normal-flow edge enumeration and CFG maps.
//!
//! "Normal flow" excludes EH edges: the handler edge of a call-finally, and
//! all EH-return edges. A call-finally pair collapses to a single edge from
//! the call block to its designated continuation.

use std::collections::HashMap;

use super::block::{BlockId, Terminator};
use super::func::Function;

/// Enumerate a block's normal-flow successors.
///
/// With `profile_order` set, conditional and switch successors come back in
/// ascending edge likelihood, so a DFS that visits the low-likelihood side
/// first leaves likely successors adjacent to their predecessor once the
/// order is reversed.
pub fn normal_successors(func: &Function, block: BlockId, profile_order: bool) -> Vec<BlockId> {
    match &func.blocks[block].terminator {
        Terminator::Jump { target } => vec![*target],
        Terminator::CondJump {
            true_target,
            false_target,
            weight,
            ..
        } => {
            if profile_order && *weight > 0.5 {
                vec![*false_target, *true_target]
            } else {
                vec![*true_target, *false_target]
            }
        }
        Terminator::Switch { cases, .. } => {
            let mut ordered: Vec<(BlockId, f64)> =
                cases.iter().map(|c| (c.target, c.weight)).collect();
            if profile_order {
                ordered.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            }
            ordered.into_iter().map(|(t, _)| t).collect()
        }
        Terminator::Return | Terminator::Throw | Terminator::EhReturn { .. } => Vec::new(),
        Terminator::CallFinally { continuation, .. } => vec![*continuation],
        Terminator::FinallyContinuation { target } => vec![*target],
    }
}

/// Predecessor and successor maps over normal flow, plus the EH-return
/// predecessors needed to spot blocks reachable only through handlers.
pub struct FlowGraph {
    pub succs: HashMap<BlockId, Vec<BlockId>>,
    pub preds: HashMap<BlockId, Vec<BlockId>>,
    pub eh_return_preds: HashMap<BlockId, Vec<BlockId>>,
}

impl FlowGraph {
    pub fn build(func: &Function, profile_order: bool) -> Self {
        let mut succs: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        let mut eh_return_preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();

        for (block_id, _block) in func.blocks.iter() {
            succs.entry(block_id).or_default();
            preds.entry(block_id).or_default();
        }

        for (block_id, block) in func.blocks.iter() {
            for target in normal_successors(func, block_id, profile_order) {
                succs.entry(block_id).or_default().push(target);
                preds.entry(target).or_default().push(block_id);
            }
            if let Terminator::EhReturn { targets } = &block.terminator {
                for &target in targets {
                    eh_return_preds.entry(target).or_default().push(block_id);
                }
            }
        }

        FlowGraph {
            succs,
            preds,
            eh_return_preds,
        }
    }

    pub fn succs_of(&self, block: BlockId) -> &[BlockId] {
        self.succs.get(&block).map_or(&[], |v| v.as_slice())
    }

    pub fn preds_of(&self, block: BlockId) -> &[BlockId] {
        self.preds.get(&block).map_or(&[], |v| v.as_slice())
    }
}
