//! Two-phase fixed-point computation of per-procedure suspendability.
//!
//! Phase one seeds facts from call-site shape alone; phase two propagates
//! may-suspend through in-module call edges until nothing changes. The
//! treatment of overridable dispatch is deliberately conservative: an
//! unseen subclass override could suspend, so a virtual or interface call
//! to a non-sealed method marks the caller suspendable even if the target
//! seen here never suspends. This is a documented approximation of the
//! analysis, not an imprecision to tighten.

use rustc_hash::FxHashMap;

use crate::analysis::oracle::{AllowList, ForeignOracle};
use crate::error::{Result, WeftError};
use crate::names::MethodId;
use crate::proc::{CallSite, Module, Procedure};

/// Total map from method identity to its may-suspend fact.
#[derive(Debug, Clone, Default)]
pub struct FactMap {
    facts: FxHashMap<MethodId, bool>,
}

impl FactMap {
    /// Query a fact. Unknown identities are a caller bug and fail loudly.
    pub fn get(&self, module: &Module, id: MethodId) -> Result<bool> {
        self.facts
            .get(&id)
            .copied()
            .ok_or_else(|| WeftError::unknown_method(module.names.describe(id)))
    }

    /// The suspending call sites of one procedure, in appearance order.
    ///
    /// A site suspends when its seed shape forces it, or when its target
    /// is an in-module procedure whose fact is true.
    pub fn suspending_sites(
        &self,
        module: &Module,
        allow: &AllowList,
        oracle: &dyn ForeignOracle,
        proc: &Procedure,
    ) -> Vec<CallSite> {
        proc.call_sites()
            .into_iter()
            .filter(|site| {
                site_forces_suspend(module, allow, oracle, site)
                    || self.facts.get(&site.target).copied().unwrap_or(false)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    fn decided(&self, id: MethodId) -> Option<bool> {
        self.facts.get(&id).copied()
    }

    fn decide(&mut self, id: MethodId, fact: bool) {
        self.facts.insert(id, fact);
    }
}

/// Does this call site, on its own shape, force the caller suspendable?
fn site_forces_suspend(
    module: &Module,
    allow: &AllowList,
    oracle: &dyn ForeignOracle,
    site: &CallSite,
) -> bool {
    match module.get(site.target) {
        Some(target) => {
            // In-module target: only overridable dispatch to a non-sealed
            // method is an immediate hazard; everything else waits for the
            // fixed point.
            site.dispatch.is_overridable() && !target.flags.is_sealed()
        }
        None => {
            // Foreign target. Statically bound calls on allow-listed owners
            // defer to the oracle; all other foreign calls may suspend.
            let sealed_call = !site.dispatch.is_overridable();
            if sealed_call && allow.is_safe(site.target.owner) {
                oracle.may_suspend(site.target, site.dispatch)
            } else {
                true
            }
        }
    }
}

/// Run the full analysis over a closed module.
pub fn analyze(
    module: &Module,
    allow: &AllowList,
    oracle: &dyn ForeignOracle,
) -> Result<FactMap> {
    let mut map = FactMap::default();

    // Phase one: seed.
    for proc in module.procedures() {
        let sites = proc.call_sites();
        if sites.is_empty() {
            map.decide(proc.id, false);
            continue;
        }
        if sites
            .iter()
            .any(|s| site_forces_suspend(module, allow, oracle, s))
        {
            map.decide(proc.id, true);
        }
    }

    // Phase two: propagate to a fixed point.
    while propagate_once(module, &mut map) {}

    // Everything still undecided cannot reach a suspending call.
    for id in module.ids() {
        if map.decided(id).is_none() {
            map.decide(id, false);
        }
    }

    Ok(map)
}

/// One propagation sweep: an undecided procedure calling an
/// already-suspendable in-module target becomes suspendable. Returns
/// whether anything changed; re-running on a completed map is a no-op.
pub fn propagate_once(module: &Module, map: &mut FactMap) -> bool {
    let mut changed = false;
    for proc in module.procedures() {
        if map.decided(proc.id) == Some(true) {
            continue;
        }
        let infected = proc
            .call_sites()
            .iter()
            .any(|s| map.decided(s.target) == Some(true));
        if infected {
            map.decide(proc.id, true);
            changed = true;
        }
    }
    changed
}
