//! Blocks and terminators.

use serde::{Deserialize, Serialize};

use crate::define_entity;

use super::eh::RegionId;

define_entity!(BlockId);

define_entity!(
    /// An integer temporary. The restructuring phase only manufactures
    /// these as dispatch-loop control variables; everything else about
    /// values lives in the surrounding compiler.
    TempId
);

/// How control first enters a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EntryKind {
    #[default]
    Normal,
    /// First block of a handler funclet.
    Handler,
    /// First block of a filter funclet.
    Filter,
}

/// One switch case: target plus profile weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub target: BlockId,
    pub weight: f64,
}

/// Block terminator.
///
/// The kind set is closed; every consumer (successor enumerator, emitter,
/// transformer) matches exhaustively so a new kind fails to compile rather
/// than silently falling through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    /// Unconditional jump.
    Jump { target: BlockId },
    /// Two-way conditional. `weight` is the profile likelihood of the true
    /// edge; the false edge carries the remainder.
    CondJump {
        cond: TempId,
        true_target: BlockId,
        false_target: BlockId,
        weight: f64,
        /// Whether `cond` has been negated relative to its original sense.
        negated: bool,
    },
    /// Multi-way switch on `selector`. The last case doubles as the default.
    Switch {
        selector: TempId,
        cases: Vec<SwitchCase>,
    },
    Return,
    Throw,
    /// Call into a finally handler. `handler` is an EH edge; normal flow
    /// resumes at `continuation`, the pair's designated continuation block.
    CallFinally {
        handler: BlockId,
        continuation: BlockId,
    },
    /// Continuation half of a call-finally pair.
    FinallyContinuation { target: BlockId },
    /// Return out of a handler funclet. `targets` are EH-return edges, not
    /// normal flow.
    EhReturn { targets: Vec<BlockId> },
}

impl Terminator {
    /// Negate a conditional terminator: swap the targets, complement the
    /// edge weight, and flip the recorded condition sense. No effect on
    /// other kinds.
    pub fn invert(&mut self) {
        if let Terminator::CondJump {
            true_target,
            false_target,
            weight,
            negated,
            ..
        } = self
        {
            std::mem::swap(true_target, false_target);
            *weight = 1.0 - *weight;
            *negated = !*negated;
        }
    }

    /// Replace every occurrence of `old` as a branch target with `new`.
    /// EH-return edges are left alone.
    pub fn replace_target(&mut self, old: BlockId, new: BlockId) {
        match self {
            Terminator::Jump { target } => {
                if *target == old {
                    *target = new;
                }
            }
            Terminator::CondJump {
                true_target,
                false_target,
                ..
            } => {
                if *true_target == old {
                    *true_target = new;
                }
                if *false_target == old {
                    *false_target = new;
                }
            }
            Terminator::Switch { cases, .. } => {
                for case in cases {
                    if case.target == old {
                        case.target = new;
                    }
                }
            }
            Terminator::CallFinally { continuation, .. } => {
                if *continuation == old {
                    *continuation = new;
                }
            }
            Terminator::FinallyContinuation { target } => {
                if *target == old {
                    *target = new;
                }
            }
            Terminator::Return | Terminator::Throw | Terminator::EhReturn { .. } => {}
        }
    }
}

/// Pending `selector = value` store appended to a block by the
/// irreducible-region transformer; lowered together with the block's other
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorStore {
    pub var: TempId,
    pub value: u32,
}

/// A basic block.
///
/// Operation bodies live in the surrounding compiler; this phase only needs
/// the terminator, EH placement, and any dispatcher selector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub terminator: Terminator,
    pub region: RegionId,
    pub entry_kind: EntryKind,
    pub stash: Option<SelectorStore>,
}

impl Block {
    pub fn new(terminator: Terminator, region: RegionId) -> Self {
        Self {
            terminator,
            region,
            entry_kind: EntryKind::Normal,
            stash: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;

    #[test]
    fn invert_swaps_targets_and_weight() {
        let a = BlockId::new(1);
        let b = BlockId::new(2);
        let mut term = Terminator::CondJump {
            cond: TempId::new(0),
            true_target: a,
            false_target: b,
            weight: 0.75,
            negated: false,
        };
        term.invert();
        match term {
            Terminator::CondJump {
                true_target,
                false_target,
                weight,
                negated,
                ..
            } => {
                assert_eq!(true_target, b);
                assert_eq!(false_target, a);
                assert!((weight - 0.25).abs() < 1e-9);
                assert!(negated);
            }
            _ => panic!("still a CondJump"),
        }
    }

    #[test]
    fn replace_target_rewrites_all_matching_cases() {
        let old = BlockId::new(3);
        let new = BlockId::new(7);
        let other = BlockId::new(4);
        let mut term = Terminator::Switch {
            selector: TempId::new(0),
            cases: vec![
                SwitchCase {
                    target: old,
                    weight: 0.25,
                },
                SwitchCase {
                    target: other,
                    weight: 0.5,
                },
                SwitchCase {
                    target: old,
                    weight: 0.25,
                },
            ],
        };
        term.replace_target(old, new);
        match term {
            Terminator::Switch { cases, .. } => {
                assert_eq!(cases[0].target, new);
                assert_eq!(cases[1].target, other);
                assert_eq!(cases[2].target, new);
            }
            _ => panic!("still a Switch"),
        }
    }
}
