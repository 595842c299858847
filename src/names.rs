//! Name and signature interning for owner/method identities.
//!
//! Every owner, method name, and method signature in a procedure set is
//! interned once, so identity comparison anywhere in the analyzer, weaver,
//! and runtime is an integer compare. A `NameTable` belongs to one
//! [`Module`](crate::proc::Module); there is no process-wide table.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use crate::proc::ValueKind;

/// Interned name id (owner or method name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sym(pub u32);

/// Interned method signature id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SigId(pub u32);

/// A method signature: parameter kinds and return kind.
///
/// The receiver of an instance method is not part of the signature; it is
/// implied by the dispatch kind at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig {
    pub params: Vec<ValueKind>,
    pub ret: Option<ValueKind>,
}

impl MethodSig {
    pub fn new(params: Vec<ValueKind>, ret: Option<ValueKind>) -> Self {
        MethodSig { params, ret }
    }

    /// Signature with no parameters and no return value.
    pub fn void() -> Self {
        MethodSig {
            params: Vec::new(),
            ret: None,
        }
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ")")?;
        match self.ret {
            Some(k) => write!(f, "{}", k),
            None => write!(f, "V"),
        }
    }
}

/// The (owner, name, signature) triple identifying one procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId {
    pub owner: Sym,
    pub name: Sym,
    pub sig: SigId,
}

impl MethodId {
    pub fn new(owner: Sym, name: Sym, sig: SigId) -> Self {
        MethodId { owner, name, sig }
    }
}

/// Interning table for names and signatures.
///
/// Uses `Arc<str>` for names so a single allocation is shared between the
/// lookup map and the id-indexed vector. `Arc` rather than `Rc` because
/// procedures and their identities migrate between carrier threads.
#[derive(Debug, Default)]
pub struct NameTable {
    map: FxHashMap<Arc<str>, Sym>,
    names: Vec<Arc<str>>,
    sig_map: FxHashMap<MethodSig, SigId>,
    sigs: Vec<MethodSig>,
}

impl NameTable {
    pub fn new() -> Self {
        NameTable::default()
    }

    /// Intern a name, returning its id.
    pub fn intern(&mut self, name: &str) -> Sym {
        if let Some(&id) = self.map.get(name) {
            return id;
        }

        let id = Sym(self.names.len() as u32);
        let shared: Arc<str> = Arc::from(name);
        self.names.push(shared.clone());
        self.map.insert(shared, id);
        id
    }

    /// Get the text of an interned name.
    pub fn name(&self, id: Sym) -> Option<&str> {
        self.names.get(id.0 as usize).map(|s| s.as_ref())
    }

    /// Look up a name without interning it.
    pub fn get(&self, name: &str) -> Option<Sym> {
        self.map.get(name).copied()
    }

    /// Intern a signature, returning its id.
    pub fn intern_sig(&mut self, sig: MethodSig) -> SigId {
        if let Some(&id) = self.sig_map.get(&sig) {
            return id;
        }

        let id = SigId(self.sigs.len() as u32);
        self.sigs.push(sig.clone());
        self.sig_map.insert(sig, id);
        id
    }

    /// Get an interned signature.
    pub fn sig(&self, id: SigId) -> Option<&MethodSig> {
        self.sigs.get(id.0 as usize)
    }

    /// Intern a full method identity in one call.
    pub fn method(&mut self, owner: &str, name: &str, sig: MethodSig) -> MethodId {
        MethodId {
            owner: self.intern(owner),
            name: self.intern(name),
            sig: self.intern_sig(sig),
        }
    }

    /// Render a method identity as `owner.name(sig)` for diagnostics.
    pub fn describe(&self, id: MethodId) -> String {
        let owner = self.name(id.owner).unwrap_or("?");
        let name = self.name(id.name).unwrap_or("?");
        match self.sig(id.sig) {
            Some(sig) => format!("{}.{}{}", owner, name, sig),
            None => format!("{}.{}(?)", owner, name),
        }
    }
}
