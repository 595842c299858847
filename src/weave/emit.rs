//! Emission vocabulary for woven code: the continuation-stack intrinsics.
//!
//! Woven procedures talk to the runtime exclusively through calls to the
//! `weft/rt` owner. The interpreter routes these to the active
//! [`ContStack`](crate::rt::ContStack); the analyzer's allow-list keeps
//! them from counting as suspendable.

use crate::names::{MethodId, MethodSig, NameTable, Sym};
use crate::proc::{Const, DispatchKind, Op, ValueKind};

/// Lane index of a kind, used to pick the pop/push intrinsic.
pub fn lane(kind: ValueKind) -> usize {
    match kind {
        ValueKind::Int => 0,
        ValueKind::Float => 1,
        ValueKind::Long => 2,
        ValueKind::Double => 3,
        ValueKind::Ref => 4,
    }
}

/// Intrinsic method names, indexed by [`lane`].
pub const POP_NAMES: [&str; 5] = ["pop_i", "pop_f", "pop_l", "pop_d", "pop_r"];
pub const PUSH_NAMES: [&str; 5] = ["push_i", "push_f", "push_l", "push_d", "push_r"];
pub const RESTORING_NAME: &str = "restoring";
pub const SUSPENDING_NAME: &str = "suspending";
pub const POP_INDEX_NAME: &str = "pop_index";
pub const PUSH_INDEX_NAME: &str = "push_index";

/// Pre-interned identities of every intrinsic the weaver emits.
#[derive(Debug, Clone)]
pub struct RtIds {
    pub owner: Sym,
    pub restoring: MethodId,
    pub suspending: MethodId,
    pub pop_index: MethodId,
    pub push_index: MethodId,
    pop: [MethodId; 5],
    push: [MethodId; 5],
}

impl RtIds {
    /// Intern the intrinsic identities against a module's name table.
    pub fn intern(names: &mut NameTable, owner: Sym) -> Self {
        let flag_sig = MethodSig::new(Vec::new(), Some(ValueKind::Int));
        let mk = |names: &mut NameTable, name: &str, sig: MethodSig| MethodId {
            owner,
            name: names.intern(name),
            sig: names.intern_sig(sig),
        };

        let restoring = mk(names, RESTORING_NAME, flag_sig.clone());
        let suspending = mk(names, SUSPENDING_NAME, flag_sig.clone());
        let pop_index = mk(names, POP_INDEX_NAME, flag_sig);
        let push_index = mk(
            names,
            PUSH_INDEX_NAME,
            MethodSig::new(vec![ValueKind::Int], None),
        );

        let mut pop = [restoring; 5];
        let mut push = [restoring; 5];
        for kind in ValueKind::ALL {
            let i = lane(kind);
            pop[i] = mk(names, POP_NAMES[i], MethodSig::new(Vec::new(), Some(kind)));
            push[i] = mk(names, PUSH_NAMES[i], MethodSig::new(vec![kind], None));
        }

        RtIds {
            owner,
            restoring,
            suspending,
            pop_index,
            push_index,
            pop,
            push,
        }
    }

    pub fn pop_of(&self, kind: ValueKind) -> MethodId {
        self.pop[lane(kind)]
    }

    pub fn push_of(&self, kind: ValueKind) -> MethodId {
        self.push[lane(kind)]
    }

    /// Static call op to an intrinsic.
    pub fn call(&self, target: MethodId) -> Op {
        Op::Call {
            target,
            dispatch: DispatchKind::Static,
        }
    }
}

/// Push-default op for a kind.
pub fn push_default(kind: ValueKind) -> Op {
    Op::Push(Const::default_of(kind))
}
