use slate_bytecode::{Bytecode, BytecodeError, Site};
use tracing::trace;

/// A boolean expression that has not produced a value: the jump operands
/// to fill with the address to continue at when it is true or false.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingBranch {
    pub true_sites: Vec<Site>,
    pub false_sites: Vec<Site>,
}

impl PendingBranch {
    pub fn new(true_site: Site, false_site: Site) -> Self {
        PendingBranch {
            true_sites: vec![true_site],
            false_sites: vec![false_site],
        }
    }

    /// Logical negation; emits no code.
    pub fn negate(self) -> Self {
        PendingBranch {
            true_sites: self.false_sites,
            false_sites: self.true_sites,
        }
    }

    /// Combine for `left && right`, once `left`'s true sites have been
    /// routed into `right`.
    pub fn and(left: PendingBranch, right: PendingBranch) -> Self {
        let mut false_sites = left.false_sites;
        false_sites.extend(right.false_sites);
        PendingBranch {
            true_sites: right.true_sites,
            false_sites,
        }
    }

    /// Combine for `left || right`, once `left`'s false sites have been
    /// routed into `right`.
    pub fn or(left: PendingBranch, right: PendingBranch) -> Self {
        let mut true_sites = left.true_sites;
        true_sites.extend(right.true_sites);
        PendingBranch {
            true_sites,
            false_sites: right.false_sites,
        }
    }

    /// Route both outcomes to `target`.
    pub fn resolve(self, bc: &mut Bytecode, target: usize) -> Result<(), BytecodeError> {
        patch_sites(bc, &self.true_sites, target)?;
        patch_sites(bc, &self.false_sites, target)
    }
}

pub fn patch_sites(bc: &mut Bytecode, sites: &[Site], target: usize) -> Result<(), BytecodeError> {
    for &site in sites {
        trace!(site = site.offset(), target, "backpatch");
        bc.patch_target(site, target)?;
    }
    Ok(())
}
