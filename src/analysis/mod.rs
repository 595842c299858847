//! Suspendability analysis: which procedures may suspend the call chain.

pub mod oracle;
pub mod suspend;

pub use oracle::{AllowList, ForeignOracle, NeverSuspends};
pub use suspend::{analyze, propagate_once, FactMap};
