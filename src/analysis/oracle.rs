//! Classification of calls that leave the closed procedure set.
//!
//! A call to a foreign owner is suspendable by default: the analyzer
//! cannot see foreign code, and guessing wrong the other way would corrupt
//! state at runtime. The two escape hatches are deliberate and narrow:
//! an allow-list of owners known to be safe, consulted only for statically
//! bound calls, and an oracle for owners a previous analysis already
//! classified.

use rustc_hash::FxHashSet;

use crate::names::{MethodId, Sym};
use crate::proc::{DispatchKind, Module};

/// Answers may-suspend for calls leaving the module, for owners that have
/// been analyzed before (e.g. by a previous run over another module).
pub trait ForeignOracle {
    fn may_suspend(&self, target: MethodId, dispatch: DispatchKind) -> bool;
}

/// Oracle with no prior knowledge: every consulted call is assumed safe.
/// Only ever consulted for sealed calls on allow-listed owners.
#[derive(Debug, Default)]
pub struct NeverSuspends;

impl ForeignOracle for NeverSuspends {
    fn may_suspend(&self, _target: MethodId, _dispatch: DispatchKind) -> bool {
        false
    }
}

/// The configurable set of foreign owners whose statically bound calls are
/// presumed non-suspending.
///
/// Membership is configuration, not logic: the exact boundary of "safe"
/// depends on the deployment, so callers add owners explicitly. The
/// continuation-stack intrinsic owner is pre-seeded, since woven code must be
/// able to call it without becoming suspendable.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    owners: FxHashSet<Sym>,
}

impl AllowList {
    pub fn new() -> Self {
        AllowList::default()
    }

    /// The standard list for a module: just the intrinsic owner.
    pub fn standard(module: &Module) -> Self {
        let mut list = AllowList::new();
        list.owners.insert(module.rt_owner());
        list
    }

    pub fn allow(&mut self, owner: Sym) -> &mut Self {
        self.owners.insert(owner);
        self
    }

    pub fn is_safe(&self, owner: Sym) -> bool {
        self.owners.contains(&owner)
    }
}
