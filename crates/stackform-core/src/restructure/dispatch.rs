//! Irreducible-region rewriting.
//!
//! Each irreducible component is given a dispatcher block: a fresh control
//! temp, a switch over it with one case per entry, and every edge into an
//! entry redirected through the dispatcher with a pending `selector = case`
//! store on the incoming side. The rewritten region has a single header
//! (the dispatcher), so a following loop analysis sees it as reducible.

use std::collections::HashSet;

use crate::ir::{Block, BlockId, FlowGraph, Function, SelectorStore, SwitchCase, Terminator};

use super::scc::Scc;

/// Rewrite every irreducible component in `sccs`, innermost first. Returns
/// the number of dispatchers introduced.
pub fn transform_irreducible(func: &mut Function, sccs: &[Scc], trace: bool) -> usize {
    let mut rewritten = 0;
    for scc in sccs {
        // Nested components exist whether or not this one is irreducible.
        rewritten += transform_irreducible(func, &scc.children, trace);
        if scc.is_irreducible() {
            rewrite_region(func, scc, trace);
            rewritten += 1;
        }
    }
    rewritten
}

/// Profile weight carried by the normal edge `pred -> target`, summed over
/// parallel edges. EH edges contribute nothing.
fn edge_weight(term: &Terminator, target: BlockId) -> f64 {
    match term {
        Terminator::Jump { target: t } | Terminator::FinallyContinuation { target: t } => {
            if *t == target {
                1.0
            } else {
                0.0
            }
        }
        Terminator::CondJump {
            true_target,
            false_target,
            weight,
            ..
        } => {
            let mut w = 0.0;
            if *true_target == target {
                w += *weight;
            }
            if *false_target == target {
                w += 1.0 - *weight;
            }
            w
        }
        Terminator::Switch { cases, .. } => cases
            .iter()
            .filter(|c| c.target == target)
            .map(|c| c.weight)
            .sum(),
        Terminator::CallFinally { continuation, .. } => {
            if *continuation == target {
                1.0
            } else {
                0.0
            }
        }
        Terminator::Return | Terminator::Throw | Terminator::EhReturn { .. } => 0.0,
    }
}

fn rewrite_region(func: &mut Function, scc: &Scc, trace: bool) {
    // Predecessors and weights are snapshotted before any edge moves.
    let graph = FlowGraph::build(func, false);
    let mut incoming: Vec<Vec<BlockId>> = Vec::with_capacity(scc.entries.len());
    let mut raw_weight: Vec<f64> = Vec::with_capacity(scc.entries.len());
    for &entry in &scc.entries {
        let mut seen: HashSet<BlockId> = HashSet::new();
        let preds: Vec<BlockId> = graph
            .preds_of(entry)
            .iter()
            .copied()
            .filter(|&p| seen.insert(p))
            .collect();
        raw_weight.push(
            preds
                .iter()
                .map(|&p| edge_weight(&func.blocks[p].terminator, entry))
                .sum(),
        );
        incoming.push(preds);
    }
    let total: f64 = raw_weight.iter().sum();

    let var = func.alloc_temp();
    let dispatcher = func.add_block(Block::new(
        Terminator::Switch {
            selector: var,
            cases: Vec::new(),
        },
        scc.region,
    ));

    for (idx, (&entry, preds)) in scc.entries.iter().zip(&incoming).enumerate() {
        let store = SelectorStore {
            var,
            value: idx as u32,
        };
        for &pred in preds {
            let pred_block = &mut func.blocks[pred];
            let reusable = matches!(pred_block.terminator, Terminator::Jump { .. })
                && pred_block.stash.is_none();
            if reusable {
                // The jump reaches only this entry; fold the store into the
                // predecessor instead of splitting the edge.
                pred_block.stash = Some(store);
                pred_block.terminator.replace_target(entry, dispatcher);
            } else {
                let region = pred_block.region;
                let mut transfer = Block::new(Terminator::Jump { target: dispatcher }, region);
                transfer.stash = Some(store);
                let transfer = func.add_block(transfer);
                func.blocks[pred].terminator.replace_target(entry, transfer);
            }
        }
    }

    // Redistribute entry likelihoods onto the switch. The last case absorbs
    // the rounding remainder so the weights sum to exactly one.
    let n = scc.entries.len();
    let mut cases: Vec<SwitchCase> = Vec::with_capacity(n);
    let mut acc: f64 = 0.0;
    for (idx, &entry) in scc.entries.iter().enumerate() {
        let weight = if idx + 1 == n {
            (1.0 - acc).max(0.0)
        } else if total > 0.0 {
            raw_weight[idx] / total
        } else {
            1.0 / n as f64
        };
        acc += weight;
        cases.push(SwitchCase {
            target: entry,
            weight,
        });
    }
    func.blocks[dispatcher].terminator = Terminator::Switch {
        selector: var,
        cases,
    };

    if trace {
        eprintln!(
            "[restructure] function `{}`: dispatching {}-entry irreducible region through {dispatcher:?}",
            func.name, n
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, RegionKind};
    use crate::restructure::dfs::run_method_dfs;
    use crate::restructure::scc::find_method_sccs;

    fn two_entry_cycle() -> (Function, BlockId, BlockId) {
        let mut b = FunctionBuilder::new("two_entry");
        let h1 = b.create_block();
        let h2 = b.create_block();
        let exit = b.create_block();
        let cond = b.temp();
        b.cond_jump_weighted(cond, h1, h2, 0.25);
        b.switch_to_block(h1);
        let c2 = b.temp();
        b.cond_jump(c2, h2, exit);
        b.switch_to_block(h2);
        b.jump(h1);
        b.switch_to_block(exit);
        b.ret();
        (b.build(), h1, h2)
    }

    fn rewrite(func: &mut Function) -> usize {
        let graph = FlowGraph::build(func, false);
        let dfs = run_method_dfs(func, &graph);
        let sccs = find_method_sccs(func, &graph, &dfs.result);
        transform_irreducible(func, &sccs, false)
    }

    #[test]
    fn dispatcher_takes_over_every_entry_edge() {
        let (mut func, h1, h2) = two_entry_cycle();
        let before = func.blocks.len();
        let temps_before = func.temp_count();
        assert_eq!(rewrite(&mut func), 1);
        assert!(func.blocks.len() > before);
        // One fresh control temp per dispatcher.
        assert_eq!(func.temp_count(), temps_before + 1);

        let graph = FlowGraph::build(&func, false);
        let dispatchers: Vec<BlockId> = func
            .blocks
            .iter()
            .map(|(id, _)| id)
            .skip(before)
            .filter(|&id| matches!(func.blocks[id].terminator, Terminator::Switch { .. }))
            .collect();
        assert_eq!(dispatchers.len(), 1);
        let dispatcher = dispatchers[0];

        // Every edge into the old entries now comes from the dispatcher.
        for entry in [h1, h2] {
            assert_eq!(graph.preds_of(entry), [dispatcher].as_slice());
        }
        // Every dispatcher predecessor carries a selector store.
        for &p in graph.preds_of(dispatcher) {
            assert!(func.blocks[p].stash.is_some());
        }
    }

    #[test]
    fn dispatcher_lands_in_the_entries_try_region() {
        // Same two-entry cycle, but both entries moved inside a try region;
        // the dispatcher has to branch to them, so it lives in that try
        // rather than the method root.
        let (mut func, h1, h2) = two_entry_cycle();
        let root = func.regions.root();
        let try_region = func.regions.add(RegionKind::Try, root);
        for block in [h1, h2] {
            func.blocks[block].region = try_region;
        }

        let before = func.blocks.len();
        assert_eq!(rewrite(&mut func), 1);
        let dispatcher = func
            .blocks
            .iter()
            .map(|(id, _)| id)
            .skip(before)
            .find(|&id| matches!(func.blocks[id].terminator, Terminator::Switch { .. }))
            .unwrap();
        assert_eq!(func.blocks[dispatcher].region, try_region);

        let graph = FlowGraph::build(&func, false);
        let dfs = run_method_dfs(&func, &graph);
        let loops = crate::restructure::loops::NaturalLoops::analyze(&func, &graph, &dfs.result);
        assert_eq!(loops.irreducible_header_count(), 0);
    }

    #[test]
    fn case_weights_sum_to_one() {
        let (mut func, _h1, _h2) = two_entry_cycle();
        let before = func.blocks.len();
        rewrite(&mut func);
        let dispatcher = func
            .blocks
            .iter()
            .map(|(id, _)| id)
            .skip(before)
            .find(|&id| matches!(func.blocks[id].terminator, Terminator::Switch { .. }))
            .unwrap();
        if let Terminator::Switch { cases, .. } = &func.blocks[dispatcher].terminator {
            let sum: f64 = cases.iter().map(|c| c.weight).sum();
            assert!((sum - 1.0).abs() < 1e-9, "weights sum to {sum}");
            assert!(cases.iter().all(|c| c.weight >= 0.0));
        } else {
            panic!("dispatcher lost its switch");
        }
    }

    #[test]
    fn rewritten_region_becomes_reducible() {
        let (mut func, _h1, _h2) = two_entry_cycle();
        rewrite(&mut func);
        let graph = FlowGraph::build(&func, false);
        let dfs = run_method_dfs(&func, &graph);
        let loops = crate::restructure::loops::NaturalLoops::analyze(&func, &graph, &dfs.result);
        assert_eq!(loops.irreducible_header_count(), 0);
    }
}
