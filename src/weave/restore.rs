//! Restore-block emission: re-entering a frame at one suspension point.
//!
//! The dispatch prologue switches here when the resume index matches.
//! The block rebuilds the frame exactly as it was before the interrupted
//! call (locals, operand stack, held monitors), then re-issues the call
//! with placeholder arguments. The call is a pure re-entry vehicle: the
//! callee's own prologue restores its real state, so from this frame's
//! point of view execution continues just after the call returns.

use crate::proc::{Label, Op, TypeDesc, ValueKind};
use crate::weave::emit::{push_default, RtIds};
use crate::weave::sites::SitePlan;
use crate::weave::ScratchMap;

/// Emit the restore block for one site. Starts with the bound restore
/// label, ends with a jump to the call label.
pub fn emit_restore(
    plan: &SitePlan,
    rt: &RtIds,
    scratch: &ScratchMap,
    restore: Label,
    call: Label,
) -> Vec<Op> {
    let mut ops = Vec::new();
    ops.push(Op::Label(restore));

    // Re-run allocations that were live but not yet constructed; every
    // alias below re-reads the fresh reference from scratch.
    for (site, class) in &plan.uninit {
        ops.push(Op::New { class: *class });
        ops.push(Op::Store {
            kind: ValueKind::Ref,
            slot: scratch.uninit_slot(*site),
        });
    }

    // The receiver was saved last, so it comes off the lane first.
    if plan.has_receiver {
        ops.push(rt.call(rt.pop_of(ValueKind::Ref)));
        ops.push(Op::Store {
            kind: ValueKind::Ref,
            slot: scratch.recv,
        });
    }

    // Reflective sites restore their real argument values next.
    if plan.reflective {
        for (j, kind) in plan.arg_kinds.iter().enumerate() {
            ops.push(rt.call(rt.pop_of(*kind)));
            ops.push(Op::Store {
                kind: *kind,
                slot: scratch.arg_slot(j),
            });
        }
    }

    // Locals in original (ascending) order.
    for (slot, ty) in &plan.live_locals {
        match ty {
            TypeDesc::Uninit { site, .. } => {
                ops.push(Op::Load {
                    kind: ValueKind::Ref,
                    slot: scratch.uninit_slot(*site),
                });
            }
            _ => ops.push(rt.call(rt.pop_of(ty.kind()))),
        }
        ops.push(Op::Store {
            kind: ty.kind(),
            slot: *slot,
        });
    }

    // Operand stack, bottom first; popped values stay on the stack.
    for ty in &plan.live_stack {
        match ty {
            TypeDesc::Uninit { site, .. } => {
                ops.push(Op::Load {
                    kind: ValueKind::Ref,
                    slot: scratch.uninit_slot(*site),
                });
            }
            _ => ops.push(rt.call(rt.pop_of(ty.kind()))),
        }
    }

    // Re-acquire monitors released at suspension, outermost first.
    for slot in &plan.held_monitors {
        ops.push(Op::Load {
            kind: ValueKind::Ref,
            slot: *slot,
        });
        ops.push(Op::MonitorEnter);
    }

    // Receiver and arguments for the re-issued call.
    if plan.has_receiver {
        ops.push(Op::Load {
            kind: ValueKind::Ref,
            slot: scratch.recv,
        });
    }
    for (j, kind) in plan.arg_kinds.iter().enumerate() {
        if plan.reflective {
            ops.push(Op::Load {
                kind: *kind,
                slot: scratch.arg_slot(j),
            });
        } else {
            ops.push(push_default(*kind));
        }
    }

    ops.push(Op::Jump(call));
    ops
}
