//! The frame rewriter ("weaver"): turns a procedure with suspend-capable
//! call sites into a resumable equivalent.
//!
//! The transform prepends a dispatch prologue, inserts a restore block per
//! suspending site, wraps each such call with receiver/argument spill code
//! and a save/unwind block, then recomputes and verifies every frame. A
//! procedure with no suspending sites passes through untouched.
//!
//! One parameterization covers what the original system grew three rewriter
//! variants for: sites targeting a configured reflective-invocation method
//! save and restore their receiver and argument values for real, since the
//! true dispatch target is only recoverable from those values at resume
//! time.

pub mod emit;
pub mod frames;
pub mod restore;
pub mod save;
pub mod sites;

pub use emit::RtIds;
pub use sites::SitePlan;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::Result;
use crate::names::MethodId;
use crate::proc::{CallSite, Cond, Frame, Label, Module, Op, Procedure, ValueKind};

/// Weaver configuration.
#[derive(Debug, Clone, Default)]
pub struct WeaveConfig {
    /// Call targets whose receiver and arguments must survive suspension
    /// verbatim (reflective invocation and the like).
    pub reflective_targets: FxHashSet<MethodId>,
}

impl WeaveConfig {
    /// The standard configuration for code running on the strand layer.
    ///
    /// `join` and `join_timeout` re-check their target on every wake, so
    /// the re-executed call must see the real strand handle, not a
    /// placeholder, so they are reflective sites. The no-argument
    /// primitives (park, yield) and `sleep` ignore their arguments on the
    /// resumed leg and need nothing special.
    pub fn with_strand_primitives(module: &mut Module) -> WeaveConfig {
        use crate::names::MethodSig;
        use crate::proc::STRAND_OWNER;

        let join = module.names.method(
            STRAND_OWNER,
            crate::sched::prims::JOIN_NAME,
            MethodSig::new(vec![ValueKind::Ref], None),
        );
        let join_timeout = module.names.method(
            STRAND_OWNER,
            crate::sched::prims::JOIN_TIMEOUT_NAME,
            MethodSig::new(vec![ValueKind::Ref, ValueKind::Long], Some(ValueKind::Int)),
        );

        let mut reflective_targets = FxHashSet::default();
        reflective_targets.insert(join);
        reflective_targets.insert(join_timeout);
        WeaveConfig { reflective_targets }
    }
}

/// Scratch-slot layout appended above a procedure's original locals.
#[derive(Debug)]
pub struct ScratchMap {
    /// Slot stashing the callee receiver across a suspension.
    pub recv: u16,
    args_base: u16,
    uninit: FxHashMap<usize, u16>,
    /// New total local count for the woven procedure.
    pub max_locals: u16,
}

impl ScratchMap {
    fn layout(base: u16, plans: &[SitePlan]) -> ScratchMap {
        let recv = base;
        let args_base = base + 1;
        let spill_args = plans
            .iter()
            .filter(|p| p.has_receiver || p.reflective)
            .map(|p| p.arg_kinds.len() as u16)
            .max()
            .unwrap_or(0);

        let mut uninit = FxHashMap::default();
        let mut next = args_base + spill_args;
        for plan in plans {
            for (site, _) in &plan.uninit {
                uninit.entry(*site).or_insert_with(|| {
                    let slot = next;
                    next += 1;
                    slot
                });
            }
        }

        ScratchMap {
            recv,
            args_base,
            uninit,
            max_locals: next,
        }
    }

    pub fn arg_slot(&self, j: usize) -> u16 {
        self.args_base + j as u16
    }

    pub fn uninit_slot(&self, site: usize) -> u16 {
        self.uninit[&site]
    }
}

/// The rewriting engine for one module.
#[derive(Debug)]
pub struct Weaver {
    rt: RtIds,
    config: WeaveConfig,
}

impl Weaver {
    /// Create a weaver, interning the intrinsic identities it emits.
    pub fn new(module: &mut Module) -> Self {
        Weaver::with_config(module, WeaveConfig::default())
    }

    pub fn with_config(module: &mut Module, config: WeaveConfig) -> Self {
        let rt_owner = module.rt_owner();
        let rt = RtIds::intern(&mut module.names, rt_owner);
        Weaver { rt, config }
    }

    pub fn rt(&self) -> &RtIds {
        &self.rt
    }

    pub fn config(&self) -> &WeaveConfig {
        &self.config
    }

    /// Weave one procedure. `frames` must be the per-op snapshots of
    /// `proc`; `sites` the suspending call sites in appearance order.
    ///
    /// With no suspending sites the input is returned unchanged. On any
    /// inconsistency the weave aborts with an error and no partial output.
    pub fn weave(
        &self,
        module: &Module,
        proc: &Procedure,
        frames: &[Frame],
        sites: &[CallSite],
    ) -> Result<Procedure> {
        if sites.is_empty() {
            return Ok(proc.clone());
        }

        let plans = sites::plan_sites(module, &self.config, proc, frames, sites)?;
        let scratch = ScratchMap::layout(proc.max_locals, &plans);

        // Fresh labels: entry, then per site a restore/call/continue trio.
        let mut next_label = proc.next_label();
        let mut fresh = || {
            let l = Label(next_label);
            next_label += 1;
            l
        };
        let entry = fresh();
        let site_labels: Vec<(Label, Label, Label)> =
            plans.iter().map(|_| (fresh(), fresh(), fresh())).collect();

        let mut ops = Vec::with_capacity(proc.ops.len() * 2);

        // Dispatch prologue: fall through to the entry unless a restore is
        // in progress, otherwise switch on the saved resume index.
        ops.push(self.rt.call(self.rt.restoring));
        ops.push(Op::Branch {
            cond: Cond::IfZero,
            target: entry,
        });
        ops.push(self.rt.call(self.rt.pop_index));
        ops.push(Op::Switch {
            targets: site_labels.iter().map(|(r, _, _)| *r).collect(),
            default: entry,
        });

        for (plan, (restore_l, call_l, _)) in plans.iter().zip(&site_labels) {
            ops.extend(restore::emit_restore(
                plan, &self.rt, &scratch, *restore_l, *call_l,
            ));
        }

        ops.push(Op::Label(entry));

        // Body, with each suspending site wrapped in spill + save code.
        let by_index: FxHashMap<usize, usize> = plans
            .iter()
            .enumerate()
            .map(|(n, p)| (p.site.index, n))
            .collect();
        let proc_ret = module
            .names
            .sig(proc.id.sig)
            .and_then(|s| s.ret);

        for (i, op) in proc.ops.iter().enumerate() {
            match by_index.get(&i) {
                None => ops.push(op.clone()),
                Some(&n) => {
                    let plan = &plans[n];
                    let (_, call_l, cont_l) = site_labels[n];
                    ops.push(Op::Label(call_l));
                    ops.extend(emit_spill(plan, &scratch));
                    ops.push(op.clone());
                    ops.extend(save::emit_save(plan, &self.rt, &scratch, proc_ret, cont_l));
                }
            }
        }

        let mut woven = Procedure::new(proc.id, proc.flags, scratch.max_locals, ops);
        woven.woven = true;
        frames::verify_woven(module, &woven)?;
        Ok(woven)
    }
}

/// Stash the callee receiver (and, for reflective sites, keep the argument
/// values reachable) in scratch locals just before the call.
///
/// Runs on both the normal path and the restore path; the restore block
/// jumps to the call label above this code.
fn emit_spill(plan: &SitePlan, scratch: &ScratchMap) -> Vec<Op> {
    if !plan.has_receiver && !plan.reflective {
        return Vec::new();
    }
    let mut ops = Vec::new();
    for (j, kind) in plan.arg_kinds.iter().enumerate().rev() {
        ops.push(Op::Store {
            kind: *kind,
            slot: scratch.arg_slot(j),
        });
    }
    if plan.has_receiver {
        ops.push(Op::Dup);
        ops.push(Op::Store {
            kind: ValueKind::Ref,
            slot: scratch.recv,
        });
    }
    for (j, kind) in plan.arg_kinds.iter().enumerate() {
        ops.push(Op::Load {
            kind: *kind,
            slot: scratch.arg_slot(j),
        });
    }
    ops
}
