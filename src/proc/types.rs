//! Core type vocabulary of the procedure model.

use std::fmt;

/// The five storage lanes a runtime value can live in.
///
/// Every local slot, operand cell, and continuation-stack lane is tagged
/// with exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Float,
    Long,
    Double,
    Ref,
}

impl ValueKind {
    /// All kinds, in lane order.
    pub const ALL: [ValueKind; 5] = [
        ValueKind::Int,
        ValueKind::Float,
        ValueKind::Long,
        ValueKind::Double,
        ValueKind::Ref,
    ];

    /// True for the four numeric kinds.
    pub fn is_numeric(self) -> bool {
        !matches!(self, ValueKind::Ref)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            ValueKind::Int => "I",
            ValueKind::Float => "F",
            ValueKind::Long => "J",
            ValueKind::Double => "D",
            ValueKind::Ref => "R",
        };
        write!(f, "{}", c)
    }
}

/// Static type of one local slot or operand-stack cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDesc {
    Int,
    Float,
    Long,
    Double,
    /// The null constant; joins with any object type.
    Null,
    /// An initialized object of the given class.
    Obj(crate::names::Sym),
    /// An allocated but not-yet-constructed object, identified by the op
    /// index of its `New`. Cannot be saved to or restored from a lane.
    Uninit {
        site: usize,
        class: crate::names::Sym,
    },
}

impl TypeDesc {
    /// The lane this type travels in.
    pub fn kind(self) -> ValueKind {
        match self {
            TypeDesc::Int => ValueKind::Int,
            TypeDesc::Float => ValueKind::Float,
            TypeDesc::Long => ValueKind::Long,
            TypeDesc::Double => ValueKind::Double,
            TypeDesc::Null | TypeDesc::Obj(_) | TypeDesc::Uninit { .. } => ValueKind::Ref,
        }
    }

    /// True for an allocated-but-unconstructed reference.
    pub fn is_uninit(self) -> bool {
        matches!(self, TypeDesc::Uninit { .. })
    }

    /// The generic type for a lane kind (object references widen to the
    /// root class).
    pub fn of_kind(kind: ValueKind, object_class: crate::names::Sym) -> TypeDesc {
        match kind {
            ValueKind::Int => TypeDesc::Int,
            ValueKind::Float => TypeDesc::Float,
            ValueKind::Long => TypeDesc::Long,
            ValueKind::Double => TypeDesc::Double,
            ValueKind::Ref => TypeDesc::Obj(object_class),
        }
    }

    /// Pointwise join of two types meeting at a control-flow merge.
    ///
    /// Returns `None` when the types are irreconcilable (the caller kills
    /// a local slot, or reports a stack mismatch). Two uninitialized
    /// allocations of the same class but different sites widen to the
    /// constructed type: the only way both reach one join is a restore
    /// path re-running the body path's allocation, and the runtime does
    /// not rely on frame-level init tracking.
    pub fn merge(a: TypeDesc, b: TypeDesc, object_class: crate::names::Sym) -> Option<TypeDesc> {
        if a == b {
            return Some(a);
        }
        match (a, b) {
            (TypeDesc::Null, TypeDesc::Obj(c)) | (TypeDesc::Obj(c), TypeDesc::Null) => {
                Some(TypeDesc::Obj(c))
            }
            (TypeDesc::Obj(_), TypeDesc::Obj(_)) => Some(TypeDesc::Obj(object_class)),
            (TypeDesc::Uninit { class: ca, .. }, TypeDesc::Uninit { class: cb, .. })
                if ca == cb =>
            {
                Some(TypeDesc::Obj(ca))
            }
            _ => None,
        }
    }
}

/// A constant operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Str(String),
    Null,
}

impl Const {
    pub fn kind(&self) -> ValueKind {
        match self {
            Const::Int(_) => ValueKind::Int,
            Const::Float(_) => ValueKind::Float,
            Const::Long(_) => ValueKind::Long,
            Const::Double(_) => ValueKind::Double,
            Const::Str(_) | Const::Null => ValueKind::Ref,
        }
    }

    /// The default ("zero") constant of a kind: what a woven procedure
    /// returns while unwinding, and what restore pushes for callee args.
    pub fn default_of(kind: ValueKind) -> Const {
        match kind {
            ValueKind::Int => Const::Int(0),
            ValueKind::Float => Const::Float(0.0),
            ValueKind::Long => Const::Long(0),
            ValueKind::Double => Const::Double(0.0),
            ValueKind::Ref => Const::Null,
        }
    }
}

/// How a call site dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    /// Instance call, dynamically dispatched; overridable.
    Virtual,
    /// No receiver.
    Static,
    /// Instance call, statically bound (constructors, private calls).
    Special,
    /// Instance call through an interface; overridable.
    Interface,
}

impl DispatchKind {
    /// True when the receiver's dynamic class chooses the target, so an
    /// unseen override could change behavior.
    pub fn is_overridable(self) -> bool {
        matches!(self, DispatchKind::Virtual | DispatchKind::Interface)
    }

    pub fn has_receiver(self) -> bool {
        !matches!(self, DispatchKind::Static)
    }
}

/// Declaration-site attributes of a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcFlags {
    pub is_static: bool,
    pub is_private: bool,
    pub is_final: bool,
    pub is_ctor: bool,
}

impl ProcFlags {
    pub fn statik() -> Self {
        ProcFlags {
            is_static: true,
            ..ProcFlags::default()
        }
    }

    pub fn private_final() -> Self {
        ProcFlags {
            is_private: true,
            is_final: true,
            ..ProcFlags::default()
        }
    }

    /// True when no unseen override of this procedure can exist.
    pub fn is_sealed(self) -> bool {
        self.is_private || self.is_static || self.is_final || self.is_ctor
    }
}
