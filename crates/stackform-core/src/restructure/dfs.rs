//! Multi-root depth-first search over normal flow.
//!
//! Roots are visited handler/filter entries first, then blocks reachable
//! only through EH-return edges, then the method entry last — so the entry
//! finishes last and lands first in reverse postorder, with funclets
//! trailing the main body.

use crate::entity::SecondaryMap;
use crate::ir::{BlockId, FlowGraph, Function};

/// Pre/postorder numbering from one DFS invocation (whole-method or
/// subgraph). Built fresh each time; numbers live in side tables keyed by
/// block id rather than on the blocks themselves.
pub struct DfsResult {
    /// Postorder slot → block.
    pub postorder: Vec<BlockId>,
    pub preorder_of: SecondaryMap<BlockId, u32>,
    pub postorder_of: SecondaryMap<BlockId, u32>,
    /// A successor was reached while still on the visit stack.
    pub has_cycle: bool,
}

impl DfsResult {
    pub fn len(&self) -> usize {
        self.postorder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postorder.is_empty()
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.postorder_of.contains_key(block)
    }

    /// Blocks in reverse postorder.
    pub fn rpo(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.postorder.iter().rev().copied()
    }
}

/// Whole-method DFS plus the EH-only-blocks signal.
pub struct MethodDfs {
    pub result: DfsResult,
    /// Some block is reachable only through EH-return edges without being a
    /// funclet entry itself. The caller must treat the whole pipeline as
    /// inconclusive for this method and make no changes.
    pub has_eh_only_blocks: bool,
}

/// Run the whole-method DFS. Successor order comes from `graph`, so
/// profile-guided ordering is decided when the graph is built.
pub fn run_method_dfs(func: &Function, graph: &FlowGraph) -> MethodDfs {
    let mut roots = func.funclet_entries();

    let mut has_eh_only_blocks = false;
    for (id, _block) in func.blocks.iter() {
        if id == func.entry || roots.contains(&id) {
            continue;
        }
        let no_normal_preds = graph.preds_of(id).is_empty();
        let has_eh_preds = graph
            .eh_return_preds
            .get(&id)
            .is_some_and(|p| !p.is_empty());
        if no_normal_preds && has_eh_preds {
            // Unreachable via normal flow; must still be numbered as a root.
            roots.push(id);
            has_eh_only_blocks = true;
        }
    }

    roots.push(func.entry);

    let result = run_dfs_from(graph, &roots, |_| true);
    MethodDfs {
        result,
        has_eh_only_blocks,
    }
}

/// Iterative DFS from the given roots, restricted to blocks accepted by
/// `include`. Successors of excluded blocks are never visited through them.
pub fn run_dfs_from(
    graph: &FlowGraph,
    roots: &[BlockId],
    include: impl Fn(BlockId) -> bool,
) -> DfsResult {
    enum Visit {
        Enter(BlockId),
        Exit(BlockId),
    }

    let mut preorder_of: SecondaryMap<BlockId, u32> = SecondaryMap::new();
    let mut postorder_of: SecondaryMap<BlockId, u32> = SecondaryMap::new();
    let mut postorder: Vec<BlockId> = Vec::new();
    let mut has_cycle = false;
    let mut next_pre = 0u32;

    let mut stack: Vec<Visit> = Vec::new();
    for &root in roots {
        if !include(root) || preorder_of.contains_key(root) {
            continue;
        }
        stack.push(Visit::Enter(root));
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(block) => {
                    if preorder_of.contains_key(block) {
                        continue;
                    }
                    preorder_of.insert(block, next_pre);
                    next_pre += 1;
                    stack.push(Visit::Exit(block));
                    // Reverse push so the first successor is discovered first.
                    for &succ in graph.succs_of(block).iter().rev() {
                        if !include(succ) {
                            continue;
                        }
                        if !preorder_of.contains_key(succ) {
                            stack.push(Visit::Enter(succ));
                        } else if !postorder_of.contains_key(succ) {
                            // Discovered but unfinished: an ancestor on the
                            // visit stack, so this edge closes a cycle.
                            has_cycle = true;
                        }
                    }
                }
                Visit::Exit(block) => {
                    postorder_of.insert(block, postorder.len() as u32);
                    postorder.push(block);
                }
            }
        }
    }

    DfsResult {
        postorder,
        preorder_of,
        postorder_of,
        has_cycle,
    }
}
