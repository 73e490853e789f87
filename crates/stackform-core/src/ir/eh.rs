//! Exception-region bookkeeping.
//!
//! The restructuring phase never rewrites handler internals; it only needs
//! to answer "which region is this block in", "what is the innermost try
//! region common to two blocks" (dispatcher placement), and "which handler
//! encloses this region" (the all-entries-share-one-handler assertion).

use serde::{Deserialize, Serialize};

use crate::define_entity;
use crate::entity::{EntityRef, PrimaryMap};

define_entity!(RegionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    /// The method body itself; every region tree has exactly one at the root.
    Method,
    Try,
    Handler,
    Filter,
    Finally,
}

impl RegionKind {
    fn is_handler(self) -> bool {
        matches!(
            self,
            RegionKind::Handler | RegionKind::Filter | RegionKind::Finally
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EhRegion {
    pub kind: RegionKind,
    pub parent: Option<RegionId>,
}

/// The region tree for one method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EhRegions {
    regions: PrimaryMap<RegionId, EhRegion>,
}

impl EhRegions {
    /// A tree with only the method root. Region id 0 is always the root.
    pub fn new() -> Self {
        let mut regions = PrimaryMap::new();
        regions.push(EhRegion {
            kind: RegionKind::Method,
            parent: None,
        });
        Self { regions }
    }

    pub fn root(&self) -> RegionId {
        RegionId::new(0)
    }

    pub fn add(&mut self, kind: RegionKind, parent: RegionId) -> RegionId {
        self.regions.push(EhRegion {
            kind,
            parent: Some(parent),
        })
    }

    pub fn kind(&self, region: RegionId) -> RegionKind {
        self.regions[region].kind
    }

    fn path_to_root(&self, mut region: RegionId) -> Vec<RegionId> {
        let mut path = vec![region];
        while let Some(parent) = self.regions[region].parent {
            path.push(parent);
            region = parent;
        }
        path
    }

    /// Innermost region enclosing both `a` and `b` (inclusive).
    pub fn common_ancestor(&self, a: RegionId, b: RegionId) -> RegionId {
        let pa = self.path_to_root(a);
        let pb = self.path_to_root(b);
        let mut common = *pa.last().expect("region path never empty");
        for (x, y) in pa.iter().rev().zip(pb.iter().rev()) {
            if x != y {
                break;
            }
            common = *x;
        }
        common
    }

    /// Innermost try region (or the method root) enclosing both `a` and `b`.
    /// This is where a dispatcher serving entries in both regions must live.
    pub fn innermost_common_try(&self, a: RegionId, b: RegionId) -> RegionId {
        let mut region = self.common_ancestor(a, b);
        loop {
            let r = &self.regions[region];
            if matches!(r.kind, RegionKind::Try | RegionKind::Method) {
                return region;
            }
            region = r.parent.expect("non-root region has a parent");
        }
    }

    /// Nearest handler-kind region enclosing `region` (inclusive), if any.
    pub fn enclosing_handler(&self, region: RegionId) -> Option<RegionId> {
        let mut cur = Some(region);
        while let Some(r) = cur {
            if self.regions[r].kind.is_handler() {
                return Some(r);
            }
            cur = self.regions[r].parent;
        }
        None
    }
}

impl Default for EhRegions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_try_walks_out_of_handlers() {
        let mut regions = EhRegions::new();
        let root = regions.root();
        let try1 = regions.add(RegionKind::Try, root);
        let handler = regions.add(RegionKind::Handler, try1);
        let try2 = regions.add(RegionKind::Try, handler);

        // Two blocks inside the nested try share it.
        assert_eq!(regions.innermost_common_try(try2, try2), try2);
        // A block in the handler and one in the nested try meet at the
        // handler, whose nearest try ancestor is try1.
        assert_eq!(regions.innermost_common_try(try2, handler), try1);
        // Disjoint paths meet at the method root.
        let try3 = regions.add(RegionKind::Try, root);
        assert_eq!(regions.innermost_common_try(try2, try3), root);
    }

    #[test]
    fn enclosing_handler_finds_the_funclet() {
        let mut regions = EhRegions::new();
        let root = regions.root();
        let try1 = regions.add(RegionKind::Try, root);
        let handler = regions.add(RegionKind::Handler, try1);
        let inner = regions.add(RegionKind::Try, handler);

        assert_eq!(regions.enclosing_handler(inner), Some(handler));
        assert_eq!(regions.enclosing_handler(handler), Some(handler));
        assert_eq!(regions.enclosing_handler(try1), None);
    }
}
