//! Axis controller module root.
//!
//! - [`machine`] - the per-axis state machine (single writer of the axis)
//! - [`worker`] - thread that serialises requests into the machine
//! - [`axis`] - request types and the handle other activities use

pub mod axis;
pub mod machine;
pub mod worker;

pub use axis::{AxisHandle, AxisRequest, AxisSet};
pub use machine::{AxisController, MotionKind, MotionPort};
pub use worker::AxisWorker;
