//! A small assembler for building procedures in tests and fixtures.
//!
//! Stands in for the external decoder: produces the same `Procedure`
//! representation that a real front end would hand the analyzer.

use crate::error::{Result, WeftError};
use crate::names::MethodId;
use crate::proc::op::{ArithOp, CmpOp, Cond, Label, Op};
use crate::proc::types::{Const, DispatchKind, ProcFlags, ValueKind};
use crate::proc::Procedure;

/// Fluent builder producing a [`Procedure`].
#[derive(Debug)]
pub struct ProcBuilder {
    id: MethodId,
    flags: ProcFlags,
    max_locals: u16,
    ops: Vec<Op>,
    next_label: u32,
}

impl ProcBuilder {
    pub fn new(id: MethodId, flags: ProcFlags) -> Self {
        ProcBuilder {
            id,
            flags,
            max_locals: 0,
            ops: Vec::new(),
            next_label: 0,
        }
    }

    /// Reserve local slots explicitly (otherwise inferred from stores,
    /// loads, and the parameter list at build time).
    pub fn locals(mut self, n: u16) -> Self {
        self.max_locals = n;
        self
    }

    /// Allocate a fresh, not-yet-bound label.
    pub fn fresh_label(&mut self) -> Label {
        let l = Label(self.next_label);
        self.next_label += 1;
        l
    }

    pub fn op(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    pub fn push(self, c: Const) -> Self {
        self.op(Op::Push(c))
    }

    pub fn push_int(self, v: i32) -> Self {
        self.push(Const::Int(v))
    }

    pub fn load(self, kind: ValueKind, slot: u16) -> Self {
        self.op(Op::Load { kind, slot })
    }

    pub fn store(self, kind: ValueKind, slot: u16) -> Self {
        self.op(Op::Store { kind, slot })
    }

    pub fn pop(self) -> Self {
        self.op(Op::Pop)
    }

    pub fn dup(self) -> Self {
        self.op(Op::Dup)
    }

    pub fn arith(self, kind: ValueKind, op: ArithOp) -> Self {
        self.op(Op::Arith { kind, op })
    }

    pub fn cmp(self, kind: ValueKind, op: CmpOp) -> Self {
        self.op(Op::Cmp { kind, op })
    }

    pub fn bind(self, label: Label) -> Self {
        self.op(Op::Label(label))
    }

    pub fn jump(self, target: Label) -> Self {
        self.op(Op::Jump(target))
    }

    pub fn branch(self, cond: Cond, target: Label) -> Self {
        self.op(Op::Branch { cond, target })
    }

    pub fn call(self, target: MethodId, dispatch: DispatchKind) -> Self {
        self.op(Op::Call { target, dispatch })
    }

    pub fn ret(self, kind: Option<ValueKind>) -> Self {
        self.op(Op::Return(kind))
    }

    pub fn new_obj(self, class: crate::names::Sym) -> Self {
        self.op(Op::New { class })
    }

    pub fn monitor_enter(self) -> Self {
        self.op(Op::MonitorEnter)
    }

    pub fn monitor_exit(self) -> Self {
        self.op(Op::MonitorExit)
    }

    /// Finish the procedure, inferring `max_locals` and checking labels.
    pub fn build(self) -> Result<Procedure> {
        let mut max_locals = self.max_locals;
        for op in &self.ops {
            if let Op::Load { slot, .. } | Op::Store { slot, .. } = op {
                max_locals = max_locals.max(slot + 1);
            }
        }
        if self.ops.is_empty() {
            return Err(WeftError::invalid_procedure("empty op list"));
        }
        let proc = Procedure::new(self.id, self.flags, max_locals, self.ops);
        proc.check_labels()?;
        Ok(proc)
    }
}
