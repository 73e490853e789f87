//! A function's block graph.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityRef, PrimaryMap};

use super::block::{Block, BlockId, EntryKind, TempId};
use super::eh::EhRegions;

/// A function in the IR.
///
/// Everything here is created fresh per method compilation and dropped when
/// the method finishes; nothing survives across methods or threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub blocks: PrimaryMap<BlockId, Block>,
    /// Entry block — always the first block.
    pub entry: BlockId,
    pub regions: EhRegions,
    next_temp: u32,
}

impl Function {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            blocks: PrimaryMap::new(),
            entry: BlockId::new(0),
            regions: EhRegions::new(),
            next_temp: 0,
        }
    }

    pub fn add_block(&mut self, block: Block) -> BlockId {
        self.blocks.push(block)
    }

    /// Allocate a fresh integer temporary (dispatch-loop control variables).
    pub fn alloc_temp(&mut self) -> TempId {
        let id = TempId::new(self.next_temp);
        self.next_temp += 1;
        id
    }

    pub fn temp_count(&self) -> u32 {
        self.next_temp
    }

    /// Handler and filter funclet entry blocks, in id order.
    pub fn funclet_entries(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|(_, b)| b.entry_kind != EntryKind::Normal)
            .map(|(id, _)| id)
            .collect()
    }
}
