//! Per-instruction type snapshots ("frames") and their computation.
//!
//! A frame records the static type of every local slot and operand cell at
//! one program point, before the op at that index executes. Frames are the
//! input contract of the weaver and are recomputed from scratch after every
//! structural edit; the weaver itself never touches frame math. This keeps
//! the most error-prone bookkeeping of the transform in one independently
//! testable place.
//!
//! Computation is a forward abstract interpretation with pointwise joins at
//! control-flow merges. Joins widen (mismatched object classes meet at the
//! root class, irreconcilable locals are killed), so the fixed point always
//! terminates.

use std::collections::VecDeque;

use crate::error::{Result, WeftError};
use crate::proc::op::{Cond, Op};
use crate::proc::types::{Const, DispatchKind, TypeDesc, ValueKind};
use crate::proc::{Module, Procedure};

/// Immutable type snapshot at one op index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// One entry per local slot; `None` when the slot holds nothing
    /// typeable at this point.
    pub locals: Vec<Option<TypeDesc>>,
    /// Operand stack, bottom first.
    pub stack: Vec<TypeDesc>,
    /// False for ops control flow never reaches.
    pub reachable: bool,
}

impl Frame {
    /// Sentinel for unreachable ops.
    pub fn unreachable() -> Self {
        Frame {
            locals: Vec::new(),
            stack: Vec::new(),
            reachable: false,
        }
    }

    /// Merge `other` into `self` at a control-flow join. Returns whether
    /// anything changed. Stack depths must agree.
    fn merge_from(&mut self, other: &Frame, object_class: crate::names::Sym) -> Result<bool> {
        if self.stack.len() != other.stack.len() {
            return Err(WeftError::frame_mismatch(
                0,
                format!(
                    "stack depth {} vs {} at merge",
                    self.stack.len(),
                    other.stack.len()
                ),
            ));
        }
        let mut changed = false;
        for (mine, theirs) in self.locals.iter_mut().zip(other.locals.iter()) {
            let merged = match (*mine, *theirs) {
                (Some(a), Some(b)) => TypeDesc::merge(a, b, object_class),
                _ => None,
            };
            if merged != *mine {
                *mine = merged;
                changed = true;
            }
        }
        for (mine, theirs) in self.stack.iter_mut().zip(other.stack.iter()) {
            let merged = TypeDesc::merge(*mine, *theirs, object_class).ok_or_else(|| {
                WeftError::frame_mismatch(0, format!("stack cell {:?} vs {:?}", mine, theirs))
            })?;
            if merged != *mine {
                *mine = merged;
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// Compute the frame before every op of `proc`.
///
/// This is both the stand-in for the external type-inference pass (input
/// production) and the recompute step the weaver runs after editing.
pub fn compute_frames(module: &Module, proc: &Procedure) -> Result<Vec<Frame>> {
    proc.check_labels()?;
    let labels = proc.label_indices();
    let object = module.object_class();

    let entry = entry_frame(module, proc)?;
    let mut frames: Vec<Option<Frame>> = vec![None; proc.ops.len()];
    let mut work: VecDeque<usize> = VecDeque::new();

    if proc.ops.is_empty() {
        return Err(WeftError::invalid_procedure("empty op list"));
    }
    frames[0] = Some(entry);
    work.push_back(0);

    while let Some(i) = work.pop_front() {
        let state = match &frames[i] {
            Some(f) => f.clone(),
            None => continue,
        };
        let (fall, branches) = transfer(module, proc, i, state)?;

        let mut feed = |j: usize, out: &Frame, work: &mut VecDeque<usize>| -> Result<()> {
            if j >= proc.ops.len() {
                return Err(WeftError::invalid_procedure(format!(
                    "control falls off the end after op {}",
                    i
                )));
            }
            match &mut frames[j] {
                Some(existing) => {
                    if existing.merge_from(out, object).map_err(|e| at(e, j))? {
                        work.push_back(j);
                    }
                }
                None => {
                    frames[j] = Some(out.clone());
                    work.push_back(j);
                }
            }
            Ok(())
        };

        if let Some(out) = &fall {
            feed(i + 1, out, &mut work)?;
        }
        for (label, out) in &branches {
            let j = *labels.get(label).ok_or_else(|| {
                WeftError::invalid_procedure(format!("dangling branch target L{}", label.0))
            })?;
            feed(j, out, &mut work)?;
        }
    }

    Ok(frames
        .into_iter()
        .map(|f| f.unwrap_or_else(Frame::unreachable))
        .collect())
}

/// Attach an op index to a merge error raised without one.
fn at(e: WeftError, index: usize) -> WeftError {
    match e {
        WeftError::FrameMismatch { at: 0, message } => WeftError::FrameMismatch {
            at: index,
            message,
        },
        other => other,
    }
}

/// The frame on entry: receiver (for instance procedures) and parameters
/// occupy the leading local slots.
fn entry_frame(module: &Module, proc: &Procedure) -> Result<Frame> {
    let sig = module
        .names
        .sig(proc.id.sig)
        .ok_or_else(|| WeftError::invalid_procedure("unknown signature id"))?;

    let mut locals: Vec<Option<TypeDesc>> = vec![None; proc.max_locals as usize];
    let mut slot = 0usize;
    if !proc.flags.is_static {
        if locals.is_empty() {
            return Err(WeftError::invalid_procedure(
                "instance procedure with zero locals",
            ));
        }
        locals[0] = Some(TypeDesc::Obj(proc.id.owner));
        slot = 1;
    }
    for kind in &sig.params {
        if slot >= locals.len() {
            return Err(WeftError::invalid_procedure(
                "max_locals smaller than parameter list",
            ));
        }
        locals[slot] = Some(TypeDesc::of_kind(*kind, module.object_class()));
        slot += 1;
    }

    Ok(Frame {
        locals,
        stack: Vec::new(),
        reachable: true,
    })
}

type Transfer = (Option<Frame>, Vec<(crate::proc::op::Label, Frame)>);

/// Apply op `i` to `state`, yielding the fallthrough frame and the frames
/// fed to branch targets.
fn transfer(module: &Module, proc: &Procedure, i: usize, mut state: Frame) -> Result<Transfer> {
    let object = module.object_class();
    let op = &proc.ops[i];

    let pop = |state: &mut Frame| -> Result<TypeDesc> {
        state
            .stack
            .pop()
            .ok_or(WeftError::StackUnderflow { at: i })
    };
    let pop_kind = |state: &mut Frame, kind: ValueKind| -> Result<TypeDesc> {
        let t = state
            .stack
            .pop()
            .ok_or(WeftError::StackUnderflow { at: i })?;
        if t.kind() != kind {
            return Err(WeftError::frame_mismatch(
                i,
                format!("expected {} operand, got {:?}", kind, t),
            ));
        }
        Ok(t)
    };

    match op {
        Op::Push(c) => {
            state.stack.push(const_type(module, c));
        }
        Op::Load { kind, slot } => {
            let t = state
                .locals
                .get(*slot as usize)
                .copied()
                .flatten()
                .ok_or_else(|| {
                    WeftError::frame_mismatch(i, format!("load from undefined slot {}", slot))
                })?;
            if t.kind() != *kind {
                return Err(WeftError::frame_mismatch(
                    i,
                    format!("slot {} holds {:?}, loaded as {}", slot, t, kind),
                ));
            }
            state.stack.push(t);
        }
        Op::Store { kind, slot } => {
            let t = pop_kind(&mut state, *kind)?;
            let cell = state.locals.get_mut(*slot as usize).ok_or_else(|| {
                WeftError::frame_mismatch(i, format!("store to slot {} out of range", slot))
            })?;
            *cell = Some(t);
        }
        Op::Pop => {
            pop(&mut state)?;
        }
        Op::Dup => {
            let t = *state
                .stack
                .last()
                .ok_or(WeftError::StackUnderflow { at: i })?;
            state.stack.push(t);
        }
        Op::Swap => {
            let n = state.stack.len();
            if n < 2 {
                return Err(WeftError::StackUnderflow { at: i });
            }
            state.stack.swap(n - 1, n - 2);
        }
        Op::Arith { kind, .. } => {
            if !kind.is_numeric() {
                return Err(WeftError::frame_mismatch(i, "arithmetic on references"));
            }
            pop_kind(&mut state, *kind)?;
            pop_kind(&mut state, *kind)?;
            state.stack.push(TypeDesc::of_kind(*kind, object));
        }
        Op::Cmp { kind, .. } => {
            pop_kind(&mut state, *kind)?;
            pop_kind(&mut state, *kind)?;
            state.stack.push(TypeDesc::Int);
        }
        Op::GetField { kind, .. } => {
            let recv = pop_kind(&mut state, ValueKind::Ref)?;
            if matches!(recv, TypeDesc::Uninit { .. }) {
                return Err(WeftError::frame_mismatch(i, "field access before init"));
            }
            state.stack.push(TypeDesc::of_kind(*kind, object));
        }
        Op::PutField { kind, .. } => {
            pop_kind(&mut state, *kind)?;
            let recv = pop_kind(&mut state, ValueKind::Ref)?;
            if matches!(recv, TypeDesc::Uninit { .. }) {
                return Err(WeftError::frame_mismatch(i, "field access before init"));
            }
        }
        Op::GetStatic { kind, .. } => {
            state.stack.push(TypeDesc::of_kind(*kind, object));
        }
        Op::PutStatic { kind, .. } => {
            pop_kind(&mut state, *kind)?;
        }
        Op::Jump(target) => {
            return Ok((None, vec![(*target, state)]));
        }
        Op::Branch { cond, target } => {
            match cond {
                Cond::IfZero | Cond::IfNonZero => {
                    pop_kind(&mut state, ValueKind::Int)?;
                }
                Cond::IfNull | Cond::IfNonNull => {
                    pop_kind(&mut state, ValueKind::Ref)?;
                }
            }
            return Ok((Some(state.clone()), vec![(*target, state)]));
        }
        Op::Switch { targets, default } => {
            pop_kind(&mut state, ValueKind::Int)?;
            let mut out = Vec::with_capacity(targets.len() + 1);
            for t in targets {
                out.push((*t, state.clone()));
            }
            out.push((*default, state));
            return Ok((None, out));
        }
        Op::Label(_) => {}
        Op::Call { target, dispatch } => {
            let sig = module
                .names
                .sig(target.sig)
                .ok_or_else(|| WeftError::invalid_procedure("unknown signature id"))?
                .clone();
            for kind in sig.params.iter().rev() {
                pop_kind(&mut state, *kind)?;
            }
            if dispatch.has_receiver() {
                let recv = pop_kind(&mut state, ValueKind::Ref)?;
                let is_ctor =
                    *dispatch == DispatchKind::Special && target.name == module.ctor_name();
                if let TypeDesc::Uninit { site, .. } = recv {
                    if !is_ctor {
                        return Err(WeftError::frame_mismatch(
                            i,
                            "call on uninitialized receiver",
                        ));
                    }
                    // Construction completes: the allocation becomes a
                    // real object everywhere it aliases.
                    let init = TypeDesc::Obj(target.owner);
                    for cell in state.locals.iter_mut().flatten() {
                        if matches!(cell, TypeDesc::Uninit { site: s, .. } if *s == site) {
                            *cell = init;
                        }
                    }
                    for cell in state.stack.iter_mut() {
                        if matches!(cell, TypeDesc::Uninit { site: s, .. } if *s == site) {
                            *cell = init;
                        }
                    }
                }
            }
            if let Some(ret) = sig.ret {
                state.stack.push(TypeDesc::of_kind(ret, object));
            }
        }
        Op::Return(kind) => {
            if let Some(k) = kind {
                pop_kind(&mut state, *k)?;
            }
            return Ok((None, Vec::new()));
        }
        Op::Throw => {
            pop_kind(&mut state, ValueKind::Ref)?;
            return Ok((None, Vec::new()));
        }
        Op::MonitorEnter | Op::MonitorExit => {
            let t = pop_kind(&mut state, ValueKind::Ref)?;
            if matches!(t, TypeDesc::Uninit { .. }) {
                return Err(WeftError::frame_mismatch(i, "monitor on uninitialized ref"));
            }
        }
        Op::New { class } => {
            state.stack.push(TypeDesc::Uninit {
                site: i,
                class: *class,
            });
        }
    }

    Ok((Some(state), Vec::new()))
}

/// Static type of a constant.
pub fn const_type(module: &Module, c: &Const) -> TypeDesc {
    match c {
        Const::Int(_) => TypeDesc::Int,
        Const::Float(_) => TypeDesc::Float,
        Const::Long(_) => TypeDesc::Long,
        Const::Double(_) => TypeDesc::Double,
        Const::Str(_) => TypeDesc::Obj(module.string_class()),
        Const::Null => TypeDesc::Null,
    }
}
