//! stackform-core — control-flow restructuring for block-structured
//! stack-machine targets.
//!
//! Takes an arbitrary (post-optimization) control-flow graph and rewrites /
//! reorders it so instruction emission can express all control flow with
//! properly nested `BLOCK`/`LOOP`/`END` regions and depth-indexed branches
//! (WebAssembly-style; no arbitrary gotos).
//!
//! The pipeline, per method:
//!
//! 1. Detect multi-entry (irreducible) regions with a Kosaraju-style SCC
//!    search and rewrite each into a single-entry dispatch loop, repeating
//!    until none remain.
//! 2. Run a multi-root DFS over normal flow, linearize blocks so every
//!    natural loop body is contiguous, and derive `BLOCK`/`LOOP` interval
//!    descriptors from the branch edges.
//! 3. Resolve intervals that cross each other into nesting-compatible
//!    chains, sort them, and hand the final order plus sorted intervals to
//!    the structured emitter, which maintains an open-region stack and
//!    computes branch depths during emission.
//!
//! This is an internal compiler phase: no file format, wire protocol, or
//! CLI surface. Per-operation lowering and register allocation live in the
//! surrounding compiler.

pub mod entity;
pub mod error;
pub mod ir;
pub mod restructure;
