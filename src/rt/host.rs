//! Host functions: the dispatch tier for calls leaving the module.
//!
//! A host function sees the live continuation stack and the owning strand
//! (when the scheduler is driving), and follows the restore-aware
//! protocol: consume the resume token first, then either complete or
//! request a suspension.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::names::MethodId;
use crate::rt::stack::{ContStack, SuspendReason};
use crate::rt::value::Value;
use crate::sched::Strand;

/// Execution context handed to a host function.
pub struct HostCtx<'a> {
    pub shelf: &'a mut ContStack,
    /// The strand being driven, absent when a continuation is resumed by
    /// hand.
    pub strand: Option<&'a Strand>,
    /// False when a frame the weaver never touched sits on the current
    /// chain; suspension would lose state, so primitives must fall back
    /// to blocking the carrier.
    pub chain_woven: bool,
}

impl HostCtx<'_> {
    /// Consume the resume token. True exactly once, on the re-execution
    /// of the primitive that suspended.
    pub fn take_resumed(&mut self) -> bool {
        self.shelf.take_resumed()
    }

    /// Request a cooperative suspension; the caller's woven save blocks
    /// do the rest.
    pub fn request_suspend(&mut self, reason: SuspendReason) {
        self.shelf.begin_suspend(reason);
    }
}

/// A registered host function. Returns the call's result value, if the
/// signature declares one.
pub type HostFn = Arc<dyn Fn(&mut HostCtx<'_>, &[Value]) -> Result<Option<Value>> + Send + Sync>;

/// Method-identity keyed registry of host functions.
#[derive(Default)]
pub struct HostRegistry {
    map: FxHashMap<MethodId, HostFn>,
}

impl HostRegistry {
    pub fn new() -> Self {
        HostRegistry::default()
    }

    pub fn register<F>(&mut self, id: MethodId, f: F)
    where
        F: Fn(&mut HostCtx<'_>, &[Value]) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        self.map.insert(id, Arc::new(f));
    }

    pub fn get(&self, id: MethodId) -> Option<HostFn> {
        self.map.get(&id).cloned()
    }

    pub fn contains(&self, id: MethodId) -> bool {
        self.map.contains_key(&id)
    }
}

impl std::fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRegistry")
            .field("len", &self.map.len())
            .finish()
    }
}
