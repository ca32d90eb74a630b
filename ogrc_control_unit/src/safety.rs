//! Safety module root.
//!
//! Limit-switch latches, soft-limit checks and the supervisor thread that
//! preempts motion on limit edges.

pub mod limits;
pub mod supervisor;

pub use limits::{LimitLatch, check_soft_limits};
pub use supervisor::SafetySupervisor;
