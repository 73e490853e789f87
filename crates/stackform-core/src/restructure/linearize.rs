//! Loop-aware linearization.
//!
//! Produces one reverse-postorder-compatible block order where every natural
//! loop occupies a contiguous run, header first. Plain reverse postorder can
//! interleave non-members between a loop's blocks (a side exit explored
//! before a later back-edge source); placing the whole body the moment the
//! header is reached removes the interleaving.

use std::collections::HashSet;

use crate::entity::SecondaryMap;
use crate::ir::BlockId;

use super::dfs::DfsResult;
use super::loops::NaturalLoops;

/// The final linear block order. Positions live in a side table; one
/// synthetic end-of-method sentinel position (`len()`) lets interval
/// endpoints reference "just past the last block" without bounds checks.
#[derive(Debug)]
pub struct FinalOrder {
    blocks: Vec<BlockId>,
    index_of: SecondaryMap<BlockId, u32>,
}

impl FinalOrder {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The synthetic position just past the last block.
    pub fn sentinel(&self) -> u32 {
        self.blocks.len() as u32
    }

    /// Final linear index of a block; `None` for blocks not laid out
    /// (unreachable via normal flow).
    pub fn position(&self, block: BlockId) -> Option<u32> {
        self.index_of.get(block).copied()
    }

    pub fn block_at(&self, position: u32) -> BlockId {
        self.blocks[position as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, BlockId)> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, &b)| (i as u32, b))
    }
}

struct Linearizer<'a> {
    rpo: Vec<BlockId>,
    loops: &'a NaturalLoops,
    placed: HashSet<BlockId>,
    out: Vec<BlockId>,
}

impl Linearizer<'_> {
    fn place_all(&mut self) {
        for i in 0..self.rpo.len() {
            self.place(self.rpo[i]);
        }
    }

    fn place(&mut self, block: BlockId) {
        if self.placed.contains(&block) {
            return;
        }
        if self.loops.is_header(block) {
            self.place_loop(block);
        } else {
            self.emit(block);
        }
    }

    /// Emit the header, then the whole body in reverse postorder. Inner
    /// loops nest inside the body and recurse; their members are a subset,
    /// so contiguity holds at every level.
    fn place_loop(&mut self, header: BlockId) {
        self.emit(header);
        let members: Vec<BlockId> = self
            .rpo
            .iter()
            .copied()
            .filter(|&b| b != header && self.loops.in_loop(header, b))
            .collect();
        for member in members {
            self.place(member);
        }
    }

    fn emit(&mut self, block: BlockId) {
        self.placed.insert(block);
        self.out.push(block);
    }
}

/// Linearize the DFS result with contiguous loop bodies.
pub fn linearize(dfs: &DfsResult, loops: &NaturalLoops) -> FinalOrder {
    let mut lin = Linearizer {
        rpo: dfs.rpo().collect(),
        loops,
        placed: HashSet::new(),
        out: Vec::with_capacity(dfs.len()),
    };
    lin.place_all();

    let mut index_of = SecondaryMap::new();
    for (i, &block) in lin.out.iter().enumerate() {
        index_of.insert(block, i as u32);
    }
    FinalOrder {
        blocks: lin.out,
        index_of,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FlowGraph, Function, FunctionBuilder};
    use crate::restructure::dfs::run_method_dfs;

    fn order_of(func: &Function) -> (FinalOrder, NaturalLoops) {
        let graph = FlowGraph::build(func, false);
        let dfs = run_method_dfs(func, &graph);
        let loops = NaturalLoops::analyze(func, &graph, &dfs.result);
        (linearize(&dfs.result, &loops), loops)
    }

    fn assert_contiguous(order: &FinalOrder, loops: &NaturalLoops, header: BlockId, size: u32) {
        let start = order.position(header).expect("header laid out");
        for pos in start..start + size {
            assert!(
                loops.in_loop(header, order.block_at(pos)),
                "position {pos} not in loop at {start}"
            );
        }
    }

    #[test]
    fn loop_body_is_contiguous_despite_side_exit() {
        // entry → h; h → (a | exit); a → (h | b); b → h
        // Plain RPO visits exit before b, splitting the loop.
        let mut fb = FunctionBuilder::new("side_exit");
        let h = fb.create_block();
        let a = fb.create_block();
        let b = fb.create_block();
        let exit = fb.create_block();
        let c1 = fb.temp();
        let c2 = fb.temp();

        fb.jump(h);
        fb.switch_to_block(h);
        fb.cond_jump(c1, a, exit);
        fb.switch_to_block(a);
        fb.cond_jump(c2, h, b);
        fb.switch_to_block(b);
        fb.jump(h);
        fb.switch_to_block(exit);
        fb.ret();
        let func = fb.build();

        let (order, loops) = order_of(&func);
        assert_eq!(loops.loop_size(h), 3);
        assert_contiguous(&order, &loops, h, 3);
        assert_eq!(order.position(h), Some(1));
        // exit comes after the whole loop body.
        assert_eq!(order.position(exit), Some(4));
    }

    #[test]
    fn nested_loops_stay_contiguous() {
        // outer: oh → ih…; inner: ih ↔ ib; outer back edge from ot.
        let mut fb = FunctionBuilder::new("nested");
        let oh = fb.create_block();
        let ih = fb.create_block();
        let ib = fb.create_block();
        let ot = fb.create_block();
        let exit = fb.create_block();
        let c1 = fb.temp();
        let c2 = fb.temp();

        fb.jump(oh);
        fb.switch_to_block(oh);
        fb.jump(ih);
        fb.switch_to_block(ih);
        fb.cond_jump(c1, ib, ot);
        fb.switch_to_block(ib);
        fb.jump(ih);
        fb.switch_to_block(ot);
        fb.cond_jump(c2, oh, exit);
        fb.switch_to_block(exit);
        fb.ret();
        let func = fb.build();

        let (order, loops) = order_of(&func);
        assert_eq!(loops.loop_size(oh), 4);
        assert_eq!(loops.loop_size(ih), 2);
        assert_contiguous(&order, &loops, oh, 4);
        assert_contiguous(&order, &loops, ih, 2);
        // Headers lead their runs.
        let oh_pos = order.position(oh).unwrap();
        let ih_pos = order.position(ih).unwrap();
        assert!(oh_pos < ih_pos);
        assert_eq!(order.sentinel(), 6);
    }
}
