//! Strongly connected component detection over normal flow.
//!
//! Kosaraju's scheme: one forward DFS fixes the finish order, then a
//! backward flood from each unassigned block in reverse postorder peels
//! off exactly that block's component. Components with more than one
//! entry block are the irreducible regions the dispatcher pass rewrites.
//! Each component is re-analyzed with its entries removed, so nested
//! irreducibility is found as `children`.

use std::collections::HashSet;

use crate::ir::{BlockId, EntryKind, FlowGraph, Function, RegionId};

use super::dfs::{run_dfs_from, DfsResult};

/// A multi-block strongly connected component. Trivial single-block
/// components are never materialized.
#[derive(Debug)]
pub struct Scc {
    pub members: HashSet<BlockId>,
    /// Blocks targeted from outside the component, in reverse postorder.
    /// Whole-method roots inside the component count as entered.
    pub entries: Vec<BlockId>,
    /// Innermost try (or method) region enclosing every entry; where the
    /// dispatcher block for this component lives.
    pub region: RegionId,
    /// Components of the subgraph with this component's entries removed.
    pub children: Vec<Scc>,
}

impl Scc {
    pub fn is_irreducible(&self) -> bool {
        self.entries.len() > 1
    }
}

/// Find all multi-block components of the whole method.
pub fn find_method_sccs(func: &Function, graph: &FlowGraph, dfs: &DfsResult) -> Vec<Scc> {
    find_sccs(func, graph, dfs, None)
}

fn find_sccs(
    func: &Function,
    graph: &FlowGraph,
    dfs: &DfsResult,
    subset: Option<&HashSet<BlockId>>,
) -> Vec<Scc> {
    let in_scope =
        |b: BlockId| dfs.is_reachable(b) && subset.map_or(true, |s| s.contains(&b));

    let mut assigned: HashSet<BlockId> = HashSet::new();
    let mut sccs: Vec<Scc> = Vec::new();

    for seed in dfs.rpo() {
        if !in_scope(seed) || assigned.contains(&seed) {
            continue;
        }

        // Backward flood over unassigned blocks reaching the seed.
        let mut members: HashSet<BlockId> = HashSet::new();
        let mut stack = vec![seed];
        members.insert(seed);
        while let Some(block) = stack.pop() {
            if func.blocks[block].entry_kind != EntryKind::Normal {
                // Funclet entries start fresh flow; never walk above them.
                continue;
            }
            for &pred in graph.preds_of(block) {
                if in_scope(pred) && !assigned.contains(&pred) && members.insert(pred) {
                    stack.push(pred);
                }
            }
        }
        assigned.extend(members.iter().copied());
        if members.len() < 2 {
            continue;
        }

        let mut entries: Vec<BlockId> = members
            .iter()
            .copied()
            .filter(|&m| {
                let entered = graph.preds_of(m).iter().any(|p| !members.contains(p));
                let is_root = subset.is_none()
                    && (m == func.entry || func.blocks[m].entry_kind != EntryKind::Normal);
                entered || is_root
            })
            .collect();
        entries.sort_by_key(|&b| std::cmp::Reverse(dfs.postorder_of[b]));

        // The dispatcher must be able to branch to every entry, so it lives
        // in the innermost try enclosing all of them; entries in different
        // funclets cannot be served by one dispatcher.
        let mut region = func.blocks[entries[0]].region;
        let handler = func.regions.enclosing_handler(region);
        for &e in &entries[1..] {
            let r = func.blocks[e].region;
            assert_eq!(
                func.regions.enclosing_handler(r),
                handler,
                "component entries in `{}` straddle a handler boundary",
                func.name
            );
            region = func.regions.innermost_common_try(region, r);
        }

        let inner: HashSet<BlockId> = members
            .iter()
            .copied()
            .filter(|m| !entries.contains(m))
            .collect();
        let children = if inner.len() >= 2 {
            let mut roots: Vec<BlockId> = inner.iter().copied().collect();
            roots.sort_by_key(|&b| dfs.preorder_of[b]);
            let local = run_dfs_from(graph, &roots, |b| inner.contains(&b));
            find_sccs(func, graph, &local, Some(&inner))
        } else {
            Vec::new()
        };

        sccs.push(Scc {
            members,
            entries,
            region,
            children,
        });
    }

    sccs
}
