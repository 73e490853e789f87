//! `BLOCK`/`LOOP` interval descriptors over the final linear order.
//!
//! Three steps, run in sequence:
//!
//! - **build**: one left-to-right scan emits a Loop interval per natural
//!   loop and a Block interval per forward branch to an uncovered merge
//!   point (branches to an already-covered endpoint are subsumed, bounding
//!   the interval count by distinct merge points rather than edge count).
//! - **resolve**: intervals that overlap without nesting are merged into
//!   chains through a union-find-style pointer with path compression, so
//!   chain extents form a laminar family.
//! - **sort**: a stable three-key sort puts the intervals in exactly the
//!   order a stack-based open/close walk needs.

use serde::{Deserialize, Serialize};

use crate::ir::{FlowGraph, Function, Terminator};

use super::linearize::FinalOrder;
use super::loops::NaturalLoops;

/// One `BLOCK` or `LOOP` region over final linear positions.
///
/// A Loop interval's own `[start, end)` mirrors its natural loop's lexical
/// extent and never widens; only the chain bookkeeping may grow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
    pub is_loop: bool,
    /// Chain link: index of the interval this one was merged beneath, or
    /// itself when unchained. Stale after sorting; consumed by `resolve`
    /// and `sort` only.
    chain: u32,
    /// Rightmost end of anything chained beneath this interval.
    pub chain_end: u32,
    /// Start of the chain representative; the position at which the
    /// emitter opens this region. Filled in by `sort_intervals`.
    pub head_start: u32,
}

impl Interval {
    fn new(index: u32, start: u32, end: u32, is_loop: bool) -> Self {
        Self {
            start,
            end,
            is_loop,
            chain: index,
            chain_end: end,
            head_start: start,
        }
    }
}

/// Scan the final order and branch edges, producing intervals in
/// non-decreasing start order.
pub fn build_intervals(
    func: &Function,
    graph: &FlowGraph,
    order: &FinalOrder,
    loops: &NaturalLoops,
) -> Vec<Interval> {
    let count = order.sentinel();
    let mut intervals: Vec<Interval> = Vec::new();
    // Block-interval ends already covered, keyed by end position.
    let mut end_covered = vec![false; count as usize + 1];

    for (pos, block) in order.iter() {
        if loops.is_header(block) {
            let mut end = pos + 1;
            while end < count && loops.in_loop(block, order.block_at(end)) {
                end += 1;
            }
            let idx = intervals.len() as u32;
            intervals.push(Interval::new(idx, pos, end, true));
        }

        let is_switch = matches!(func.blocks[block].terminator, Terminator::Switch { .. });
        for &target in graph.succs_of(block) {
            // Targets that were never laid out sit conceptually past the
            // end; skipping them under-approximates at worst (no interval,
            // so no depth-indexed branch may reach them).
            let target_pos = order.position(target).unwrap_or(count);
            if target_pos <= pos {
                // Back edge; the loop interval emitted at the header covers
                // it. Never recomputed here, only asserted.
                debug_assert!(
                    intervals
                        .iter()
                        .any(|iv| iv.is_loop && iv.start == target_pos),
                    "back edge to position {target_pos} not covered by a loop interval"
                );
                continue;
            }
            if target_pos == pos + 1 && !is_switch {
                // Plain fallthrough.
                continue;
            }
            if target_pos >= count {
                // Cold/EH-adjacent target; unsupported by this pass.
                continue;
            }
            if !end_covered[target_pos as usize] {
                let idx = intervals.len() as u32;
                intervals.push(Interval::new(idx, pos, target_pos, false));
                end_covered[target_pos as usize] = true;
            }
        }
    }

    intervals
}

/// Chain representative lookup with in-place path compression.
fn find(intervals: &mut [Interval], index: u32) -> u32 {
    let mut root = index;
    while intervals[root as usize].chain != root {
        root = intervals[root as usize].chain;
    }
    let mut cur = index;
    while intervals[cur as usize].chain != root {
        let next = intervals[cur as usize].chain;
        intervals[cur as usize].chain = root;
        cur = next;
    }
    root
}

/// `interval` starts strictly inside the extent `[start, chain_end)` but
/// ends strictly outside it: overlap without nesting.
fn crosses(start: u32, chain_end: u32, interval: &Interval) -> bool {
    start < interval.start && interval.start < chain_end && interval.end > chain_end
}

/// Merge crossing intervals into chains. Post-condition: chain extents
/// form a laminar family (any two disjoint or nested), so a valid nesting
/// order exists.
pub fn resolve_chains(intervals: &mut Vec<Interval>) {
    for i in 0..intervals.len() {
        for p in 0..i {
            let rep = find(intervals, p as u32) as usize;
            // A grown chain extent can contain a newcomer whole while a
            // member's own extent still crosses it, so both are tested.
            let vs_chain = crosses(intervals[rep].start, intervals[rep].chain_end, &intervals[i]);
            let vs_member = crosses(intervals[p].start, intervals[p].end, &intervals[i]);
            if vs_chain || vs_member {
                intervals[i].chain = rep as u32;
                intervals[rep].chain_end = intervals[rep].chain_end.max(intervals[i].end);
                break;
            }
        }
    }

    debug_assert!(laminar(intervals), "crossing chain extents after resolution");
}

/// Do the resolved chain extents form a laminar family?
fn laminar(intervals: &[Interval]) -> bool {
    let reps: Vec<(u32, u32)> = (0..intervals.len() as u32)
        .filter(|&i| intervals[i as usize].chain == i)
        .map(|i| {
            let iv = &intervals[i as usize];
            (iv.start, iv.chain_end)
        })
        .collect();
    for (i, &(s1, e1)) in reps.iter().enumerate() {
        for &(s2, e2) in &reps[i + 1..] {
            let disjoint = e1 <= s2 || e2 <= s1;
            let nested = (s1 <= s2 && e2 <= e1) || (s2 <= s1 && e1 <= e2);
            if !disjoint && !nested {
                return false;
            }
        }
    }
    true
}

/// Stable sort by chain-head start ascending, own end descending, then
/// loop-before-block. A stack walk that opens each interval when its head
/// start is reached and closes it at its own end then nests correctly.
pub fn sort_intervals(intervals: &mut Vec<Interval>) {
    for i in 0..intervals.len() as u32 {
        let rep = find(intervals, i);
        intervals[i as usize].head_start = intervals[rep as usize].start;
    }
    intervals.sort_by(|a, b| {
        a.head_start
            .cmp(&b.head_start)
            .then(b.end.cmp(&a.end))
            .then(b.is_loop.cmp(&a.is_loop))
    });
}
