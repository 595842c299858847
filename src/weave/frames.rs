//! Post-edit frame verification.
//!
//! The weaver never maintains frames incrementally; after surgery it
//! recomputes them from scratch through the same
//! [`compute_frames`](crate::proc::compute_frames) that produced the
//! input, then re-checks the call-site discipline. Any disagreement
//! aborts the weave; partial output never escapes.

use crate::error::{Result, WeftError};
use crate::proc::{compute_frames, Frame, Module, Op, Procedure, ValueKind};

/// Recompute frames for a woven procedure and verify every reachable call
/// site still agrees with its target signature.
pub fn verify_woven(module: &Module, woven: &Procedure) -> Result<Vec<Frame>> {
    let frames = compute_frames(module, woven)?;

    for (i, op) in woven.ops.iter().enumerate() {
        let (target, dispatch) = match op.as_call() {
            Some(c) => c,
            None => continue,
        };
        let frame = &frames[i];
        if !frame.reachable {
            continue;
        }
        let sig = module
            .names
            .sig(target.sig)
            .ok_or_else(|| WeftError::invalid_procedure("unknown signature id"))?;
        let consumed = sig.params.len() + usize::from(dispatch.has_receiver());
        if frame.stack.len() < consumed {
            return Err(WeftError::frame_mismatch(
                i,
                format!(
                    "woven call consumes {} cells, frame has {}",
                    consumed,
                    frame.stack.len()
                ),
            ));
        }
        let base = frame.stack.len() - sig.params.len();
        for (j, kind) in sig.params.iter().enumerate() {
            let cell = frame.stack[base + j];
            if cell.kind() != *kind {
                return Err(WeftError::frame_mismatch(
                    i,
                    format!("woven arg {} is {:?}, signature says {}", j, cell, kind),
                ));
            }
        }
        if dispatch.has_receiver() && frame.stack[base - 1].kind() != ValueKind::Ref {
            return Err(WeftError::frame_mismatch(i, "woven receiver is not a reference"));
        }
    }

    Ok(frames)
}

/// Sanity check used by the fast path: the op lists are identical.
pub fn is_unchanged(a: &Procedure, b: &Procedure) -> bool {
    a.ops == b.ops && a.max_locals == b.max_locals
}
