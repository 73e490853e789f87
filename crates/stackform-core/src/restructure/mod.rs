//! Control-flow restructuring: from an arbitrary reducible-or-not flow
//! graph to a linear block order plus `BLOCK`/`LOOP` intervals, ready for
//! the structured emitter.
//!
//! The driver runs analysis to a fixed point: while loop analysis reports
//! irreducible headers, the component detector and dispatcher rewrite
//! them, then everything is re-analyzed on the updated graph. Reducible
//! input passes through the loop exactly once.

pub mod dfs;
pub mod dispatch;
pub mod emit;
pub mod intervals;
pub mod linearize;
pub mod loops;
pub mod scc;

use crate::error::CoreError;
use crate::ir::{FlowGraph, Function};

pub use emit::{emit, Emission, StructuredOp};
pub use intervals::Interval;
pub use linearize::FinalOrder;

/// Dispatcher passes before we declare the graph unfixable. Each pass
/// strictly reduces the number of multi-entry components, so hitting this
/// means the rewrite itself is broken.
const MAX_DISPATCH_PASSES: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct RestructureOptions {
    /// Order successors by profile weight so likely paths fall through.
    pub profile_guided: bool,
    /// Log dispatcher rewrites to stderr.
    pub trace: bool,
}

impl Default for RestructureOptions {
    fn default() -> Self {
        Self {
            profile_guided: true,
            trace: false,
        }
    }
}

/// Everything downstream consumers need: the linear order and the sorted
/// interval set over it.
#[derive(Debug)]
pub struct Restructured {
    pub order: FinalOrder,
    pub intervals: Vec<Interval>,
}

/// Restructure `func` in place. Irreducible regions are rewritten through
/// dispatchers; the returned order and intervals describe the (possibly
/// grown) function.
pub fn restructure(
    func: &mut Function,
    opts: RestructureOptions,
) -> Result<Restructured, CoreError> {
    let mut passes = 0;
    let (graph, dfs, loop_info) = loop {
        let graph = FlowGraph::build(func, opts.profile_guided);
        let dfs = dfs::run_method_dfs(func, &graph);
        if dfs.has_eh_only_blocks {
            return Err(CoreError::EhOnlyFlow {
                function: func.name.clone(),
            });
        }
        let loop_info = loops::NaturalLoops::analyze(func, &graph, &dfs.result);
        if loop_info.irreducible_header_count() == 0 {
            break (graph, dfs, loop_info);
        }
        passes += 1;
        assert!(
            passes <= MAX_DISPATCH_PASSES,
            "function `{}` still irreducible after {MAX_DISPATCH_PASSES} dispatcher passes",
            func.name
        );
        if opts.trace {
            eprintln!(
                "[restructure] function `{}`: pass {passes}, {} irreducible header(s)",
                func.name,
                loop_info.irreducible_header_count()
            );
        }
        let sccs = scc::find_method_sccs(func, &graph, &dfs.result);
        dispatch::transform_irreducible(func, &sccs, opts.trace);
    };

    let order = linearize::linearize(&dfs.result, &loop_info);
    let mut intervals = intervals::build_intervals(func, &graph, &order, &loop_info);
    intervals::resolve_chains(&mut intervals);
    intervals::sort_intervals(&mut intervals);

    // The emitter never flips a condition's sense, so conditionals whose
    // true arm became the lexical successor are inverted here.
    emit::normalize_branches(func, &order);

    Ok(Restructured { order, intervals })
}
