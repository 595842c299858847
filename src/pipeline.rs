//! The instrumentation pipeline: analyze a module, weave every procedure
//! that needs it, and report what changed.

use crate::analysis::{analyze, AllowList, FactMap, ForeignOracle};
use crate::error::Result;
use crate::proc::{compute_frames, Module};
use crate::weave::{WeaveConfig, Weaver};

/// Outcome of instrumenting one module.
#[derive(Debug)]
pub struct Instrumented {
    pub facts: FactMap,
    /// Identities of the procedures that were actually rewritten.
    pub woven: Vec<crate::names::MethodId>,
}

/// Analyze `module` and weave every suspendable procedure in place.
///
/// Procedures without suspending call sites are untouched. A weave
/// failure aborts the whole pipeline with the failing procedure left in
/// its original form; partial rewrites never land.
pub fn instrument(
    module: &mut Module,
    allow: &AllowList,
    oracle: &dyn ForeignOracle,
    config: WeaveConfig,
) -> Result<Instrumented> {
    let weaver = Weaver::with_config(module, config);
    let facts = analyze(module, allow, oracle)?;

    let mut replacements = Vec::new();
    for proc in module.procedures() {
        let sites = facts.suspending_sites(module, allow, oracle, proc);
        if sites.is_empty() {
            continue;
        }
        let frames = compute_frames(module, proc)?;
        let woven = weaver.weave(module, proc, &frames, &sites)?;
        replacements.push(woven);
    }

    let woven_ids = replacements.iter().map(|p| p.id).collect();
    for proc in replacements {
        module.insert(proc);
    }

    Ok(Instrumented {
        facts,
        woven: woven_ids,
    })
}
