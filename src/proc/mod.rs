//! Procedure model: typed stack-machine operations, procedures, and the
//! closed procedure set ("module") the analyzer and weaver operate on.

pub mod builder;
pub mod frame;
pub mod op;
pub mod types;

pub use builder::ProcBuilder;
pub use frame::{compute_frames, Frame};
pub use op::{ArithOp, CmpOp, Cond, Label, Op};
pub use types::{Const, DispatchKind, ProcFlags, TypeDesc, ValueKind};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Result, WeftError};
use crate::names::{MethodId, MethodSig, NameTable, Sym};

/// Root object class every reference widens to.
pub const OBJECT_CLASS: &str = "weft/Object";
/// Class of string constants.
pub const STRING_CLASS: &str = "weft/String";
/// Owner of the continuation-stack intrinsics the weaver emits calls to.
pub const RT_OWNER: &str = "weft/rt";
/// Owner of the suspension primitives (park, sleep, yield, join).
pub const STRAND_OWNER: &str = "weft/strand";
/// Class wrapping a strand handle in the value model.
pub const STRAND_CLASS: &str = "weft/Strand";
/// Conventional constructor name.
pub const CTOR_NAME: &str = "<init>";

/// One compiled procedure: ordered operations plus identity and attributes.
///
/// Instance procedures hold the receiver in local slot 0; declared
/// parameters follow.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub id: MethodId,
    pub flags: ProcFlags,
    /// Number of local slots, including receiver and parameters.
    pub max_locals: u16,
    pub ops: Vec<Op>,
    /// True once the weaver has made this procedure resumable.
    pub woven: bool,
}

impl Procedure {
    pub fn new(id: MethodId, flags: ProcFlags, max_locals: u16, ops: Vec<Op>) -> Self {
        Procedure {
            id,
            flags,
            max_locals,
            ops,
            woven: false,
        }
    }

    /// Map each bound label to the index of its `Op::Label` marker.
    pub fn label_indices(&self) -> FxHashMap<Label, usize> {
        let mut map = FxHashMap::default();
        for (i, op) in self.ops.iter().enumerate() {
            if let Op::Label(l) = op {
                map.insert(*l, i);
            }
        }
        map
    }

    /// First label id not bound or referenced in this procedure.
    pub fn next_label(&self) -> u32 {
        let mut max = 0u32;
        for op in &self.ops {
            if let Op::Label(l) = op {
                max = max.max(l.0 + 1);
            }
            for t in op.branch_targets() {
                max = max.max(t.0 + 1);
            }
        }
        max
    }

    /// All call sites, in appearance order.
    pub fn call_sites(&self) -> Vec<CallSite> {
        self.ops
            .iter()
            .enumerate()
            .filter_map(|(index, op)| {
                op.as_call().map(|(target, dispatch)| CallSite {
                    index,
                    target,
                    dispatch,
                })
            })
            .collect()
    }

    /// Verify every branch target is bound exactly once.
    pub fn check_labels(&self) -> Result<()> {
        let mut bound = FxHashSet::default();
        for op in &self.ops {
            if let Op::Label(l) = op {
                if !bound.insert(*l) {
                    return Err(WeftError::invalid_procedure(format!(
                        "label L{} bound twice",
                        l.0
                    )));
                }
            }
        }
        for op in &self.ops {
            for t in op.branch_targets() {
                if !bound.contains(&t) {
                    return Err(WeftError::invalid_procedure(format!(
                        "dangling branch target L{}",
                        t.0
                    )));
                }
            }
        }
        Ok(())
    }
}

/// View over one call op inside a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Index of the call op in `Procedure::ops`.
    pub index: usize,
    pub target: MethodId,
    pub dispatch: DispatchKind,
}

/// The closed procedure set the analyzer and weaver operate on, together
/// with its interning table and cached well-known names.
#[derive(Debug)]
pub struct Module {
    pub names: NameTable,
    procs: FxHashMap<MethodId, Procedure>,
    owners: FxHashSet<Sym>,
    object_class: Sym,
    string_class: Sym,
    rt_owner: Sym,
    strand_owner: Sym,
    ctor_name: Sym,
}

impl Module {
    pub fn new() -> Self {
        let mut names = NameTable::new();
        let object_class = names.intern(OBJECT_CLASS);
        let string_class = names.intern(STRING_CLASS);
        let rt_owner = names.intern(RT_OWNER);
        let strand_owner = names.intern(STRAND_OWNER);
        let ctor_name = names.intern(CTOR_NAME);
        Module {
            names,
            procs: FxHashMap::default(),
            owners: FxHashSet::default(),
            object_class,
            string_class,
            rt_owner,
            strand_owner,
            ctor_name,
        }
    }

    pub fn object_class(&self) -> Sym {
        self.object_class
    }

    pub fn string_class(&self) -> Sym {
        self.string_class
    }

    pub fn rt_owner(&self) -> Sym {
        self.rt_owner
    }

    pub fn strand_owner(&self) -> Sym {
        self.strand_owner
    }

    pub fn ctor_name(&self) -> Sym {
        self.ctor_name
    }

    /// Intern a method identity against this module's table.
    pub fn method(&mut self, owner: &str, name: &str, sig: MethodSig) -> MethodId {
        self.names.method(owner, name, sig)
    }

    /// Add a procedure to the set, replacing any previous definition.
    pub fn insert(&mut self, proc: Procedure) {
        self.owners.insert(proc.id.owner);
        self.procs.insert(proc.id, proc);
    }

    pub fn get(&self, id: MethodId) -> Option<&Procedure> {
        self.procs.get(&id)
    }

    pub fn get_mut(&mut self, id: MethodId) -> Option<&mut Procedure> {
        self.procs.get_mut(&id)
    }

    pub fn contains(&self, id: MethodId) -> bool {
        self.procs.contains_key(&id)
    }

    /// True when at least one procedure of this owner is in the set.
    pub fn owns(&self, owner: Sym) -> bool {
        self.owners.contains(&owner)
    }

    pub fn ids(&self) -> impl Iterator<Item = MethodId> + '_ {
        self.procs.keys().copied()
    }

    pub fn procedures(&self) -> impl Iterator<Item = &Procedure> {
        self.procs.values()
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    /// Resolve a call against the set: exact match first, then the
    /// receiver's class for overridable dispatch.
    pub fn resolve(&self, target: MethodId, receiver_class: Option<Sym>) -> Option<&Procedure> {
        if let Some(class) = receiver_class {
            let overridden = MethodId {
                owner: class,
                ..target
            };
            if let Some(p) = self.procs.get(&overridden) {
                return Some(p);
            }
        }
        self.procs.get(&target)
    }
}

impl Default for Module {
    fn default() -> Self {
        Module::new()
    }
}
