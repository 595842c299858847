//! # Weft - Retrofitted Continuations for Stack-Machine Procedures
//!
//! Weft takes procedures expressed as typed stack-machine operations and
//! rewrites ("weaves") them so a call chain can suspend mid-flight and
//! resume later from the exact pause point. On top of the rewriting engine
//! sits a green-thread runtime: strands multiplex resumable computations
//! onto a bounded carrier-thread pool with park/unpark, timed sleep, join,
//! and interrupt.
//!
//! ## Quick Start
//!
//! ```
//! use weft::analysis::{AllowList, NeverSuspends};
//! use weft::names::MethodSig;
//! use weft::proc::{DispatchKind, Module, ProcBuilder, ProcFlags, STRAND_OWNER};
//! use weft::rt::{Continuation, RtEnv};
//! use weft::sched::{Scheduler, SchedulerConfig};
//! use weft::weave::WeaveConfig;
//!
//! let mut module = Module::new();
//! let park = module.method(STRAND_OWNER, "park", MethodSig::void());
//! let entry = module.method("demo/Main", "run", MethodSig::void());
//! module.insert(
//!     ProcBuilder::new(entry, ProcFlags::statik())
//!         .call(park, DispatchKind::Static)
//!         .ret(None)
//!         .build()
//!         .unwrap(),
//! );
//!
//! let allow = AllowList::standard(&module);
//! weft::pipeline::instrument(&mut module, &allow, &NeverSuspends, WeaveConfig::default())
//!     .unwrap();
//!
//! let scheduler = Scheduler::new(RtEnv::new(module), SchedulerConfig::default());
//! let strand = scheduler.spawn(Continuation::new(entry, None));
//! strand.start().unwrap();
//! strand.unpark();
//! assert!(strand.wait_terminated(Some(std::time::Duration::from_secs(5))));
//! ```
//!
//! ## Architecture
//!
//! The engine has three layers, each usable without the ones above it:
//!
//! 1. **Analysis** - a two-phase fixed point decides, per procedure,
//!    whether it may suspend (conservative for overridable dispatch).
//! 2. **Weaving** - procedures with suspending call sites gain a dispatch
//!    prologue, per-site restore blocks, and per-site save/unwind blocks,
//!    with all frame bookkeeping recomputed and verified.
//! 3. **Runtime** - a typed continuation stack carries the spilled state;
//!    strands drive continuations on carrier threads with CAS-protected
//!    scheduling and a best-effort-cancel timer service.

pub mod analysis;
pub mod error;
pub mod names;
pub mod pipeline;
pub mod proc;
pub mod rt;
pub mod sched;
pub mod weave;

pub use analysis::{AllowList, FactMap};
pub use error::{Result, WeftError};
pub use names::{MethodId, MethodSig, NameTable};
pub use proc::{Module, Procedure};
pub use rt::{ContStack, Continuation, RtEnv};
pub use sched::{Scheduler, SchedulerConfig, Strand, StrandState};
pub use weave::{WeaveConfig, Weaver};
