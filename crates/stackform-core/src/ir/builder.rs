//! Function construction helper, used by tests and by the
//! irreducible-region transformer when it fabricates blocks.

use super::block::{Block, BlockId, EntryKind, SwitchCase, TempId, Terminator};
use super::eh::RegionId;
use super::func::Function;

/// Builds a `Function` block by block. The first created block is the entry.
pub struct FunctionBuilder {
    func: Function,
    current: BlockId,
}

impl FunctionBuilder {
    pub fn new(name: &str) -> Self {
        let mut func = Function::new(name);
        let root = func.regions.root();
        let entry = func.add_block(Block::new(Terminator::Return, root));
        func.entry = entry;
        Self {
            func,
            current: entry,
        }
    }

    /// Create a block in the method root region. Blocks start as `Return`
    /// until a terminator call replaces that.
    pub fn create_block(&mut self) -> BlockId {
        let root = self.func.regions.root();
        self.create_block_in(root)
    }

    pub fn create_block_in(&mut self, region: RegionId) -> BlockId {
        self.func.add_block(Block::new(Terminator::Return, region))
    }

    /// Create a handler funclet entry block.
    pub fn create_handler_block(&mut self) -> BlockId {
        let root = self.func.regions.root();
        let id = self.func.add_block(Block::new(Terminator::Return, root));
        self.func.blocks[id].entry_kind = EntryKind::Handler;
        id
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn temp(&mut self) -> TempId {
        self.func.alloc_temp()
    }

    pub fn regions_mut(&mut self) -> &mut super::eh::EhRegions {
        &mut self.func.regions
    }

    pub fn jump(&mut self, target: BlockId) {
        self.terminate(Terminator::Jump { target });
    }

    /// Conditional with an even edge split.
    pub fn cond_jump(&mut self, cond: TempId, true_target: BlockId, false_target: BlockId) {
        self.cond_jump_weighted(cond, true_target, false_target, 0.5);
    }

    pub fn cond_jump_weighted(
        &mut self,
        cond: TempId,
        true_target: BlockId,
        false_target: BlockId,
        weight: f64,
    ) {
        self.terminate(Terminator::CondJump {
            cond,
            true_target,
            false_target,
            weight,
            negated: false,
        });
    }

    /// Switch with an even weight per case. The last case is the default.
    pub fn switch(&mut self, selector: TempId, targets: &[BlockId]) {
        let weight = 1.0 / targets.len() as f64;
        self.terminate(Terminator::Switch {
            selector,
            cases: targets
                .iter()
                .map(|&target| SwitchCase { target, weight })
                .collect(),
        });
    }

    pub fn ret(&mut self) {
        self.terminate(Terminator::Return);
    }

    pub fn throw(&mut self) {
        self.terminate(Terminator::Throw);
    }

    pub fn call_finally(&mut self, handler: BlockId, continuation: BlockId) {
        self.terminate(Terminator::CallFinally {
            handler,
            continuation,
        });
    }

    pub fn finally_continuation(&mut self, target: BlockId) {
        self.terminate(Terminator::FinallyContinuation { target });
    }

    pub fn eh_return(&mut self, targets: &[BlockId]) {
        self.terminate(Terminator::EhReturn {
            targets: targets.to_vec(),
        });
    }

    fn terminate(&mut self, terminator: Terminator) {
        self.func.blocks[self.current].terminator = terminator;
    }

    pub fn build(self) -> Function {
        self.func
    }
}
