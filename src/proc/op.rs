//! The stack-machine operation set.
//!
//! Branch targets are [`Label`] ids bound by `Op::Label` markers inside the
//! op list, so structural edits never invalidate targets. The weaver
//! allocates fresh labels above the highest bound id.

use std::fmt;

use crate::names::{MethodId, Sym};
use crate::proc::types::{Const, DispatchKind, ValueKind};

/// Branch target id, bound by an `Op::Label` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// Condition of a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    /// Pops an int; branches when zero.
    IfZero,
    /// Pops an int; branches when non-zero.
    IfNonZero,
    /// Pops a reference; branches when null.
    IfNull,
    /// Pops a reference; branches when non-null.
    IfNonNull,
}

impl Cond {
    pub fn operand_kind(self) -> ValueKind {
        match self {
            Cond::IfZero | Cond::IfNonZero => ValueKind::Int,
            Cond::IfNull | Cond::IfNonNull => ValueKind::Ref,
        }
    }
}

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Comparison operator; pushes an int (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One stack-machine operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Push a constant.
    Push(Const),

    /// Load a local slot onto the stack.
    Load { kind: ValueKind, slot: u16 },

    /// Store the top of stack into a local slot.
    Store { kind: ValueKind, slot: u16 },

    /// Discard the top of stack.
    Pop,

    /// Duplicate the top of stack.
    Dup,

    /// Exchange the top two stack cells.
    Swap,

    /// Binary arithmetic on two operands of `kind`.
    Arith { kind: ValueKind, op: ArithOp },

    /// Compare two operands of `kind`; pushes an int.
    Cmp { kind: ValueKind, op: CmpOp },

    /// Read an instance field: pops the object, pushes the value.
    GetField { owner: Sym, field: Sym, kind: ValueKind },

    /// Write an instance field: pops the value, then the object.
    PutField { owner: Sym, field: Sym, kind: ValueKind },

    /// Read a static field.
    GetStatic { owner: Sym, field: Sym, kind: ValueKind },

    /// Write a static field: pops the value.
    PutStatic { owner: Sym, field: Sym, kind: ValueKind },

    /// Unconditional jump.
    Jump(Label),

    /// Conditional branch; falls through when the condition fails.
    Branch { cond: Cond, target: Label },

    /// Pops an int index; jumps to `targets[index]`, or `default` when out
    /// of range.
    Switch { targets: Vec<Label>, default: Label },

    /// Binds a label at this position. No runtime effect.
    Label(Label),

    /// Call a procedure. Receiver (for non-static dispatch) sits beneath
    /// the arguments on the stack.
    Call { target: MethodId, dispatch: DispatchKind },

    /// Return, with a value of the given kind when `Some`.
    Return(Option<ValueKind>),

    /// Pops a reference and raises it as a failure.
    Throw,

    /// Pops a reference and acquires its monitor (reentrant).
    MonitorEnter,

    /// Pops a reference and releases its monitor.
    MonitorExit,

    /// Allocate an uninitialized object of `class`; pushes the reference.
    /// A Special-dispatch constructor call initializes it.
    New { class: Sym },
}

impl Op {
    /// The call target and dispatch, when this op is a call.
    pub fn as_call(&self) -> Option<(MethodId, DispatchKind)> {
        match self {
            Op::Call { target, dispatch } => Some((*target, *dispatch)),
            _ => None,
        }
    }

    /// True for ops that never fall through to the next op.
    pub fn ends_flow(&self) -> bool {
        matches!(
            self,
            Op::Jump(_) | Op::Switch { .. } | Op::Return(_) | Op::Throw
        )
    }

    /// The labels this op can transfer control to.
    pub fn branch_targets(&self) -> Vec<Label> {
        match self {
            Op::Jump(t) => vec![*t],
            Op::Branch { target, .. } => vec![*target],
            Op::Switch { targets, default } => {
                let mut out = targets.clone();
                out.push(*default);
                out
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Push(c) => write!(f, "push {:?}", c),
            Op::Load { kind, slot } => write!(f, "load.{} {}", kind, slot),
            Op::Store { kind, slot } => write!(f, "store.{} {}", kind, slot),
            Op::Pop => write!(f, "pop"),
            Op::Dup => write!(f, "dup"),
            Op::Swap => write!(f, "swap"),
            Op::Arith { kind, op } => write!(f, "arith.{} {:?}", kind, op),
            Op::Cmp { kind, op } => write!(f, "cmp.{} {:?}", kind, op),
            Op::GetField { field, .. } => write!(f, "getfield #{}", field.0),
            Op::PutField { field, .. } => write!(f, "putfield #{}", field.0),
            Op::GetStatic { field, .. } => write!(f, "getstatic #{}", field.0),
            Op::PutStatic { field, .. } => write!(f, "putstatic #{}", field.0),
            Op::Jump(t) => write!(f, "jump L{}", t.0),
            Op::Branch { cond, target } => write!(f, "branch {:?} L{}", cond, target.0),
            Op::Switch { targets, default } => {
                write!(f, "switch [")?;
                for (i, t) in targets.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "L{}", t.0)?;
                }
                write!(f, "] else L{}", default.0)
            }
            Op::Label(l) => write!(f, "L{}:", l.0),
            Op::Call { target, dispatch } => {
                write!(f, "call.{:?} #{}.#{}", dispatch, target.owner.0, target.name.0)
            }
            Op::Return(None) => write!(f, "return"),
            Op::Return(Some(k)) => write!(f, "return.{}", k),
            Op::Throw => write!(f, "throw"),
            Op::MonitorEnter => write!(f, "monitorenter"),
            Op::MonitorExit => write!(f, "monitorexit"),
            Op::New { class } => write!(f, "new #{}", class.0),
        }
    }
}
