//! Green-thread layer: strands, the carrier pool, timers, and the
//! suspension primitives.

pub mod prims;
pub mod scheduler;
pub mod strand;
pub mod timer;

pub use prims::register as install_primitives;
pub use scheduler::{ErrorHandler, Scheduler, SchedulerConfig};
pub use strand::{Strand, StrandState};
pub use timer::TimerHandle;
