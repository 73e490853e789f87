//! Natural-loop analysis keyed to a DFS result.
//!
//! Dominators come from Lengauer-Tarjan over the normal-flow graph with a
//! virtual root fanning out to every DFS root (funclets are disjoint
//! subgraphs, so a single real entry would leave them undominated). Natural
//! loops are back edges whose target dominates the source; retreating edges
//! without that dominance are irreducible headers.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::entity::EntityRef;
use crate::ir::{BlockId, FlowGraph, Function};

use super::dfs::DfsResult;

// Semidominator forest for the Lengauer-Tarjan walk below. Nodes are DFS
// numbers; `ancestor[v] == usize::MAX` marks a forest root, and `label[v]`
// remembers the smallest-`semi` vertex seen between `v` and its root.

fn forest_compress(v: usize, ancestor: &mut [usize], label: &mut [usize], semi: &[usize]) {
    let mut chain = Vec::new();
    let mut u = v;
    while ancestor[u] != usize::MAX && ancestor[ancestor[u]] != usize::MAX {
        chain.push(u);
        u = ancestor[u];
    }
    // Top-down, so each node inherits an already-compressed parent.
    for &node in chain.iter().rev() {
        let a = ancestor[node];
        if semi[label[a]] < semi[label[node]] {
            label[node] = label[a];
        }
        ancestor[node] = ancestor[a];
    }
}

/// Smallest-semidominator vertex on the forest path from `v` to its root.
fn forest_eval(v: usize, ancestor: &mut [usize], label: &mut [usize], semi: &[usize]) -> usize {
    if ancestor[v] == usize::MAX {
        v
    } else {
        forest_compress(v, ancestor, label, semi);
        label[v]
    }
}

/// Immediate dominators for every block reachable from `entry`, keyed by
/// block (the entry maps to itself). Lengauer-Tarjan over the given
/// adjacency maps, near-linear in the edge count.
fn lengauer_tarjan(
    entry: BlockId,
    preds: &HashMap<BlockId, Vec<BlockId>>,
    succs: &HashMap<BlockId, Vec<BlockId>>,
) -> HashMap<BlockId, BlockId> {
    // DFS numbering, iterative so deep graphs cannot blow the call stack.
    let mut num_of: HashMap<BlockId, usize> = HashMap::new();
    let mut by_num: Vec<BlockId> = Vec::new();
    let mut parent_num: Vec<usize> = Vec::new();

    let mut work: Vec<(BlockId, usize)> = vec![(entry, usize::MAX)];
    while let Some((block, parent)) = work.pop() {
        if num_of.contains_key(&block) {
            continue;
        }
        let num = by_num.len();
        num_of.insert(block, num);
        by_num.push(block);
        parent_num.push(parent);

        if let Some(out) = succs.get(&block) {
            for &succ in out.iter().rev() {
                if !num_of.contains_key(&succ) {
                    work.push((succ, num));
                }
            }
        }
    }

    let n = by_num.len();
    if n <= 1 {
        return HashMap::from([(entry, entry)]);
    }

    let mut semi: Vec<usize> = (0..n).collect();
    let mut idom: Vec<usize> = vec![0; n];
    let mut ancestor: Vec<usize> = vec![usize::MAX; n];
    let mut label: Vec<usize> = (0..n).collect();
    let mut bucket: Vec<Vec<usize>> = vec![Vec::new(); n];

    // Vertices in reverse DFS order: settle each semidominator, then
    // resolve the bucket of vertices whose semidominator is this vertex's
    // DFS parent.
    for w in (1..n).rev() {
        let parent = parent_num[w];

        if let Some(ins) = preds.get(&by_num[w]) {
            for &pred in ins {
                if let Some(&v) = num_of.get(&pred) {
                    let u = forest_eval(v, &mut ancestor, &mut label, &semi);
                    semi[w] = semi[w].min(semi[u]);
                }
            }
        }

        bucket[semi[w]].push(w);
        ancestor[w] = parent;

        for v in std::mem::take(&mut bucket[parent]) {
            let u = forest_eval(v, &mut ancestor, &mut label, &semi);
            idom[v] = if semi[u] < semi[v] { u } else { parent };
        }
    }

    // Forward sweep turns the relative links into immediate dominators.
    for w in 1..n {
        if idom[w] != semi[w] {
            idom[w] = idom[idom[w]];
        }
    }

    let mut result = HashMap::with_capacity(n);
    result.insert(entry, entry);
    for w in 1..n {
        result.insert(by_num[w], by_num[idom[w]]);
    }
    result
}

/// Walk the idom chain upward from `b`; `a` dominates `b` when the walk
/// passes through it.
fn dominates(a: BlockId, b: BlockId, idom: &HashMap<BlockId, BlockId>) -> bool {
    let mut cur = b;
    loop {
        if cur == a {
            return true;
        }
        match idom.get(&cur) {
            Some(&up) if up != cur => cur = up,
            _ => return false,
        }
    }
}

/// Dominators with a virtual root fanning out to every DFS root.
fn compute_dominators(graph: &FlowGraph, roots: &[BlockId]) -> HashMap<BlockId, BlockId> {
    let virtual_root = BlockId::new(u32::MAX);

    let mut succs = graph.succs.clone();
    let mut preds = graph.preds.clone();
    succs.insert(virtual_root, roots.to_vec());
    preds.entry(virtual_root).or_default();
    for &root in roots {
        preds.entry(root).or_default().push(virtual_root);
    }

    let idom = lengauer_tarjan(virtual_root, &preds, &succs);
    idom.into_iter()
        .filter(|(k, v)| *k != virtual_root && *v != virtual_root)
        .collect()
}

/// Natural-loop info for one DFS result: header test, membership test, and
/// the count of irreducible headers.
pub struct NaturalLoops {
    bodies: HashMap<BlockId, HashSet<BlockId>>,
    irreducible_headers: usize,
}

impl NaturalLoops {
    /// Analyze the graph restricted to blocks numbered by `dfs`.
    pub fn analyze(func: &Function, graph: &FlowGraph, dfs: &DfsResult) -> Self {
        // Same root set as the whole-method DFS: funclet entries, blocks
        // with no normal predecessors, and the method entry.
        let mut roots = func.funclet_entries();
        for &block in &dfs.postorder {
            if block != func.entry && graph.preds_of(block).is_empty() && !roots.contains(&block) {
                roots.push(block);
            }
        }
        if !roots.contains(&func.entry) {
            roots.push(func.entry);
        }
        let idom = compute_dominators(graph, &roots);

        let mut bodies: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
        let mut irreducible: HashSet<BlockId> = HashSet::new();

        for &block in &dfs.postorder {
            for &target in graph.succs_of(block) {
                if !dfs.is_reachable(target) {
                    continue;
                }
                // Retreating edge: target is a DFS ancestor of the source.
                let retreating = dfs.preorder_of[target] <= dfs.preorder_of[block]
                    && dfs.postorder_of[target] >= dfs.postorder_of[block];
                if !retreating {
                    continue;
                }
                if !dominates(target, block, &idom) {
                    irreducible.insert(target);
                    continue;
                }
                // Back edge: block → target, target is the loop header.
                let body = bodies.entry(target).or_default();
                let mut queue = VecDeque::new();
                if block != target {
                    body.insert(block);
                    queue.push_back(block);
                }
                body.insert(target);
                while let Some(cur) = queue.pop_front() {
                    for &pred in graph.preds_of(cur) {
                        if dfs.is_reachable(pred) && body.insert(pred) && pred != target {
                            queue.push_back(pred);
                        }
                    }
                }
            }
        }

        NaturalLoops {
            bodies,
            irreducible_headers: irreducible.len(),
        }
    }

    pub fn is_header(&self, block: BlockId) -> bool {
        self.bodies.contains_key(&block)
    }

    pub fn in_loop(&self, header: BlockId, block: BlockId) -> bool {
        self.bodies
            .get(&header)
            .is_some_and(|body| body.contains(&block))
    }

    pub fn loop_size(&self, header: BlockId) -> usize {
        self.bodies.get(&header).map_or(0, |body| body.len())
    }

    pub fn irreducible_header_count(&self) -> usize {
        self.irreducible_headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;
    use crate::restructure::dfs::run_method_dfs;

    fn analyzed(func: &Function) -> (FlowGraph, DfsResult, NaturalLoops) {
        let graph = FlowGraph::build(func, false);
        let dfs = run_method_dfs(func, &graph);
        assert!(!dfs.has_eh_only_blocks);
        let loops = NaturalLoops::analyze(func, &graph, &dfs.result);
        (graph, dfs.result, loops)
    }

    #[test]
    fn diamond_has_no_loops() {
        let mut fb = FunctionBuilder::new("diamond");
        let then_block = fb.create_block();
        let else_block = fb.create_block();
        let merge = fb.create_block();
        let cond = fb.temp();

        fb.cond_jump(cond, then_block, else_block);
        fb.switch_to_block(then_block);
        fb.jump(merge);
        fb.switch_to_block(else_block);
        fb.jump(merge);
        fb.switch_to_block(merge);
        fb.ret();
        let func = fb.build();

        let (_, _, loops) = analyzed(&func);
        assert!(!loops.is_header(merge));
        assert_eq!(loops.irreducible_header_count(), 0);
    }

    #[test]
    fn while_loop_membership() {
        let mut fb = FunctionBuilder::new("while_loop");
        let header = fb.create_block();
        let body = fb.create_block();
        let exit = fb.create_block();
        let cond = fb.temp();

        fb.jump(header);
        fb.switch_to_block(header);
        fb.cond_jump(cond, body, exit);
        fb.switch_to_block(body);
        fb.jump(header);
        fb.switch_to_block(exit);
        fb.ret();
        let func = fb.build();

        let (_, _, loops) = analyzed(&func);
        assert!(loops.is_header(header));
        assert!(loops.in_loop(header, body));
        assert!(!loops.in_loop(header, exit));
        assert_eq!(loops.loop_size(header), 2);
        assert_eq!(loops.irreducible_header_count(), 0);
    }

    #[test]
    fn two_entry_cycle_is_irreducible() {
        let mut fb = FunctionBuilder::new("irreducible");
        let h1 = fb.create_block();
        let h2 = fb.create_block();
        let cond = fb.temp();

        fb.cond_jump(cond, h1, h2);
        fb.switch_to_block(h1);
        fb.jump(h2);
        fb.switch_to_block(h2);
        fb.jump(h1);
        let func = fb.build();

        let (_, _, loops) = analyzed(&func);
        assert!(loops.irreducible_header_count() >= 1);
    }

    #[test]
    fn self_loop_is_reducible() {
        let mut fb = FunctionBuilder::new("self_loop");
        let b = fb.create_block();
        let exit = fb.create_block();
        let cond = fb.temp();

        fb.jump(b);
        fb.switch_to_block(b);
        fb.cond_jump(cond, b, exit);
        fb.switch_to_block(exit);
        fb.ret();
        let func = fb.build();

        let (_, _, loops) = analyzed(&func);
        assert!(loops.is_header(b));
        assert_eq!(loops.loop_size(b), 1);
        assert_eq!(loops.irreducible_header_count(), 0);
    }
}
