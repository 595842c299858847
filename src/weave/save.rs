//! Save-block emission: the unwind step that propagates a suspension up
//! the chain.
//!
//! Emitted immediately after each suspending call. When the suspension
//! flag is clear the block is skipped entirely; when set, the call's
//! placeholder result is dropped, held monitors are released, every live
//! value goes onto its kind-matched lane, and the procedure returns its
//! declared default without running further code.

use crate::proc::{Cond, Const, Label, Op, ValueKind};
use crate::weave::emit::{push_default, RtIds};
use crate::weave::sites::SitePlan;
use crate::weave::ScratchMap;

/// Emit the save/unwind block for one site, ending with the bound
/// continue label for the non-suspending path.
pub fn emit_save(
    plan: &SitePlan,
    rt: &RtIds,
    scratch: &ScratchMap,
    proc_ret: Option<ValueKind>,
    cont: Label,
) -> Vec<Op> {
    let mut ops = Vec::new();

    ops.push(rt.call(rt.suspending));
    ops.push(Op::Branch {
        cond: Cond::IfZero,
        target: cont,
    });

    // Discard the placeholder result of the interrupted call.
    if plan.ret.is_some() {
        ops.push(Op::Pop);
    }

    // Release held monitors, innermost first, so the carrier leaves the
    // region clean; restore re-acquires them.
    for slot in plan.held_monitors.iter().rev() {
        ops.push(Op::Load {
            kind: ValueKind::Ref,
            slot: *slot,
        });
        ops.push(Op::MonitorExit);
    }

    // Operand stack, top first. Uninitialized allocations cannot travel
    // through a lane; restore re-runs the allocation instead.
    for ty in plan.live_stack.iter().rev() {
        if ty.is_uninit() {
            ops.push(Op::Pop);
        } else {
            ops.push(rt.call(rt.push_of(ty.kind())));
        }
    }

    // Locals, descending slot order.
    for (slot, ty) in plan.live_locals.iter().rev() {
        if ty.is_uninit() {
            continue;
        }
        ops.push(Op::Load {
            kind: ty.kind(),
            slot: *slot,
        });
        ops.push(rt.call(rt.push_of(ty.kind())));
    }

    // Resume index.
    ops.push(Op::Push(Const::Int(plan.number as i32)));
    ops.push(rt.call(rt.push_index));

    // Reflective sites keep their real argument values.
    if plan.reflective {
        for (j, kind) in plan.arg_kinds.iter().enumerate().rev() {
            ops.push(Op::Load {
                kind: *kind,
                slot: scratch.arg_slot(j),
            });
            ops.push(rt.call(rt.push_of(*kind)));
        }
    }

    // Receiver last, so restore pops it first.
    if plan.has_receiver {
        ops.push(Op::Load {
            kind: ValueKind::Ref,
            slot: scratch.recv,
        });
        ops.push(rt.call(rt.push_of(ValueKind::Ref)));
    }

    // Unwind: return the declared default immediately.
    match proc_ret {
        Some(kind) => {
            ops.push(push_default(kind));
            ops.push(Op::Return(Some(kind)));
        }
        None => ops.push(Op::Return(None)),
    }

    ops.push(Op::Label(cont));
    ops
}
