//! Block-graph IR consumed by the restructuring phase.
//!
//! Only what the phase needs: blocks with terminators, exception regions,
//! and normal-flow edge enumeration. Operation bodies are lowered by the
//! surrounding compiler and never appear here.

pub mod block;
pub mod builder;
pub mod eh;
pub mod func;
pub mod succ;

pub use block::{Block, BlockId, EntryKind, SelectorStore, SwitchCase, TempId, Terminator};
pub use builder::FunctionBuilder;
pub use eh::{EhRegions, RegionId, RegionKind};
pub use func::Function;
pub use succ::{normal_successors, FlowGraph};
