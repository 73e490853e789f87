//! Error type for the restructuring phase.

use thiserror::Error;

/// Errors surfaced to other compiler phases.
///
/// The only recoverable condition in this subsystem is `EhOnlyFlow`. Every
/// other anomaly — an unfindable branch depth, an SCC whose entries span
/// multiple handler regions, a broken chain invariant — is a programming
/// defect on a correctly lowered input graph and is asserted rather than
/// reported.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The method has blocks reachable only through EH-return edges that are
    /// not themselves funclet/filter entries. Restructuring aborts with no
    /// changes made; the caller must fall back to another code-generation
    /// strategy for this method.
    #[error("function `{function}` has blocks reachable only via EH-return edges; restructuring skipped")]
    EhOnlyFlow { function: String },
}
