//! The continuation handle: one resumable computation.

use crate::error::{Result, WeftError};
use crate::names::MethodId;
use crate::rt::interp::{Interp, RtEnv};
use crate::rt::stack::{ContStack, SuspendReason};
use crate::rt::value::Value;
use crate::sched::Strand;

/// A resumable computation over one woven entry procedure.
///
/// `resume` is the sole mutator and must never run concurrently for one
/// continuation; the owning strand enforces that by holding the
/// continuation in a mutex while driving it.
#[derive(Debug)]
pub struct Continuation {
    shelf: ContStack,
    entry: MethodId,
    receiver: Option<Value>,
    started: bool,
    done: bool,
}

impl Continuation {
    /// Wrap an entry procedure. Instance entries take their receiver
    /// here; the entry must not declare further parameters.
    pub fn new(entry: MethodId, receiver: Option<Value>) -> Self {
        Continuation {
            shelf: ContStack::new(),
            entry,
            receiver,
            started: false,
            done: false,
        }
    }

    /// Run until the next suspension or completion.
    ///
    /// Returns `Ok(true)` when the computation suspended again, and
    /// `Ok(false)` when it completed. An uncaught failure is rethrown
    /// here and the continuation is done.
    pub fn resume(&mut self, env: &RtEnv, strand: Option<&Strand>) -> Result<bool> {
        if self.done {
            return Err(WeftError::ResumeAfterDone);
        }
        self.started = true;

        let proc = env.module.get(self.entry).ok_or_else(|| {
            WeftError::unknown_method(env.module.names.describe(self.entry))
        })?;
        let args = match (&self.receiver, proc.flags.is_static) {
            (Some(r), false) => vec![r.clone()],
            (None, false) => {
                return Err(WeftError::invalid_procedure(
                    "instance entry without a receiver",
                ))
            }
            (_, true) => Vec::new(),
        };

        let result = Interp::new(env, &mut self.shelf, strand).run(proc, args);
        match result {
            Err(e) => {
                self.done = true;
                Err(e)
            }
            Ok(_) => {
                if self.shelf.is_suspending() {
                    self.shelf.finish_unwind();
                    Ok(true)
                } else if self.shelf.is_suspended() || !self.shelf.is_empty() {
                    // A restore pass finished without any primitive
                    // consuming the token, or lanes were left behind:
                    // saved state would be silently dropped.
                    self.done = true;
                    Err(WeftError::LostRestore)
                } else {
                    self.done = true;
                    Ok(false)
                }
            }
        }
    }

    /// True once `resume` returned `Ok(false)` or an error.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// The reason recorded by the primitive that caused the last
    /// suspension. Consumed by the scheduler after each `Ok(true)`.
    pub fn take_reason(&mut self) -> Option<SuspendReason> {
        self.shelf.take_reason()
    }

    pub fn entry(&self) -> MethodId {
        self.entry
    }
}
