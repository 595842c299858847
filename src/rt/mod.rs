//! Continuation runtime: values, the continuation stack, the interpreter
//! hosting woven code, and the continuation handle.

pub mod continuation;
pub mod host;
pub mod interp;
pub mod stack;
pub mod value;

pub use continuation::Continuation;
pub use host::{HostCtx, HostFn, HostRegistry};
pub use interp::{Interp, RtEnv};
pub use stack::{ContStack, SuspendReason};
pub use value::{NativeHandle, Obj, ObjRef, Value};
