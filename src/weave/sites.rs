//! Per-site planning: everything the save and restore emitters need to
//! know about one suspending call site, derived from the input frames
//! before any op is touched.
//!
//! Any disagreement between a call site and its frame found here is an
//! internal invariant violation in the input; planning fails and the weave
//! of the whole procedure is abandoned.

use rustc_hash::FxHashSet;

use crate::error::{Result, WeftError};
use crate::names::Sym;
use crate::proc::{CallSite, Frame, Module, Op, Procedure, TypeDesc, ValueKind};
use crate::weave::WeaveConfig;

/// Everything known about one suspending call site before surgery.
#[derive(Debug, Clone)]
pub struct SitePlan {
    pub site: CallSite,
    /// Resume index, 0..N-1 in appearance order.
    pub number: u16,
    pub arg_kinds: Vec<ValueKind>,
    pub ret: Option<ValueKind>,
    pub has_receiver: bool,
    /// Reflective sites save and restore receiver and arguments for real,
    /// since the true dispatch target lives in those values.
    pub reflective: bool,
    /// Live local slots at the site, ascending, with their frame types.
    pub live_locals: Vec<(u16, TypeDesc)>,
    /// Live operand cells beneath receiver+args, bottom first.
    pub live_stack: Vec<TypeDesc>,
    /// Distinct not-yet-initialized allocations among the live values:
    /// (original `New` op index, allocated class).
    pub uninit: Vec<(usize, Sym)>,
    /// Local slots holding monitors entered before and exited after the
    /// site, outermost first.
    pub held_monitors: Vec<u16>,
}

/// Build plans for the suspending sites of one procedure.
pub fn plan_sites(
    module: &Module,
    config: &WeaveConfig,
    proc: &Procedure,
    frames: &[Frame],
    sites: &[CallSite],
) -> Result<Vec<SitePlan>> {
    if frames.len() != proc.ops.len() {
        return Err(WeftError::invalid_procedure(format!(
            "frame count {} for {} ops",
            frames.len(),
            proc.ops.len()
        )));
    }

    let monitor_regions = monitor_regions(proc)?;

    let mut plans = Vec::with_capacity(sites.len());
    for (number, site) in sites.iter().enumerate() {
        let frame = frames
            .get(site.index)
            .filter(|f| f.reachable)
            .ok_or_else(|| {
                WeftError::invalid_procedure(format!(
                    "suspending site at unreachable op {}",
                    site.index
                ))
            })?;

        let sig = module
            .names
            .sig(site.target.sig)
            .ok_or_else(|| WeftError::invalid_procedure("unknown signature id"))?;
        let has_receiver = site.dispatch.has_receiver();
        let consumed = sig.params.len() + usize::from(has_receiver);

        if frame.stack.len() < consumed {
            return Err(WeftError::frame_mismatch(
                site.index,
                format!(
                    "call consumes {} cells, frame has {}",
                    consumed,
                    frame.stack.len()
                ),
            ));
        }
        let live_depth = frame.stack.len() - consumed;
        // Kind-check the argument cells against the signature.
        for (j, kind) in sig.params.iter().enumerate() {
            let cell = frame.stack[live_depth + usize::from(has_receiver) + j];
            if cell.kind() != *kind {
                return Err(WeftError::frame_mismatch(
                    site.index,
                    format!("arg {} is {:?}, signature says {}", j, cell, kind),
                ));
            }
        }
        if has_receiver && frame.stack[live_depth].kind() != ValueKind::Ref {
            return Err(WeftError::frame_mismatch(site.index, "receiver is not a reference"));
        }

        let live_stack: Vec<TypeDesc> = frame.stack[..live_depth].to_vec();
        let live_locals: Vec<(u16, TypeDesc)> = frame
            .locals
            .iter()
            .enumerate()
            .filter_map(|(slot, t)| t.map(|t| (slot as u16, t)))
            .collect();

        let uninit = collect_uninit(proc, &live_locals, &live_stack)?;

        let held_monitors = monitor_regions
            .iter()
            .filter(|r| r.covers(site.index))
            .map(|r| r.slot)
            .collect();

        plans.push(SitePlan {
            site: *site,
            number: number as u16,
            arg_kinds: sig.params.clone(),
            ret: sig.ret,
            has_receiver,
            reflective: config.reflective_targets.contains(&site.target),
            live_locals,
            live_stack,
            uninit,
            held_monitors,
        });
    }
    Ok(plans)
}

/// Distinct uninitialized-allocation sites among the live values. The
/// frame type carries the allocated class; the site index doubles as the
/// scratch-slot key. The site is cross-checked against the op list; a
/// stale frame here means the input is inconsistent.
fn collect_uninit(
    proc: &Procedure,
    live_locals: &[(u16, TypeDesc)],
    live_stack: &[TypeDesc],
) -> Result<Vec<(usize, Sym)>> {
    let mut seen = FxHashSet::default();
    let mut out = Vec::new();
    let all = live_locals
        .iter()
        .map(|(_, t)| *t)
        .chain(live_stack.iter().copied());
    for t in all {
        if let TypeDesc::Uninit { site, class } = t {
            if seen.insert(site) {
                match proc.ops.get(site) {
                    Some(Op::New { class: c }) if *c == class => out.push((site, class)),
                    _ => {
                        return Err(WeftError::frame_mismatch(
                            site,
                            "uninit type does not point at a matching New op",
                        ))
                    }
                }
            }
        }
    }
    Ok(out)
}

/// A monitor held over a span of ops, with the local slot its object was
/// loaded from.
#[derive(Debug)]
struct MonitorRegion {
    slot: u16,
    enter: usize,
    exit: usize,
}

impl MonitorRegion {
    fn covers(&self, index: usize) -> bool {
        self.enter < index && index < self.exit
    }
}

/// Pair up monitor enters and exits along the linear op order.
///
/// A procedure being woven must use structured monitor regions whose
/// operand comes straight from a local (`load.R k` immediately before
/// the monitor op), so the guard code can name the object again on both
/// the release and re-acquire paths. Anything else is rejected here.
fn monitor_regions(proc: &Procedure) -> Result<Vec<MonitorRegion>> {
    let mut open: Vec<(u16, usize)> = Vec::new();
    let mut done = Vec::new();
    for (i, op) in proc.ops.iter().enumerate() {
        match op {
            Op::MonitorEnter => {
                let slot = monitor_source(proc, i)?;
                open.push((slot, i));
            }
            Op::MonitorExit => {
                let slot = monitor_source(proc, i)?;
                let (entered, at) = open.pop().ok_or_else(|| {
                    WeftError::invalid_procedure(format!("unmatched monitorexit at op {}", i))
                })?;
                if entered != slot {
                    return Err(WeftError::invalid_procedure(format!(
                        "monitor region over slot {} exited via slot {}",
                        entered, slot
                    )));
                }
                done.push(MonitorRegion {
                    slot,
                    enter: at,
                    exit: i,
                });
            }
            _ => {}
        }
    }
    if let Some((slot, at)) = open.pop() {
        return Err(WeftError::invalid_procedure(format!(
            "monitor over slot {} entered at op {} never exits",
            slot, at
        )));
    }
    Ok(done)
}

fn monitor_source(proc: &Procedure, index: usize) -> Result<u16> {
    match index.checked_sub(1).and_then(|i| proc.ops.get(i)) {
        Some(Op::Load {
            kind: ValueKind::Ref,
            slot,
        }) => Ok(*slot),
        _ => Err(WeftError::invalid_procedure(format!(
            "monitor operand at op {} does not come from a local",
            index
        ))),
    }
}
