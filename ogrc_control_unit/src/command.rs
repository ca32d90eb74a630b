//! Command interface: GS-232 grammar, the global dispatch queue and the
//! homing sequence driven by axis controllers.

pub mod dispatcher;
pub mod homing;
pub mod protocol;

pub use dispatcher::{DispatchHandle, Dispatcher, report};
pub use homing::{HomingPhase, HomingSequence, HomingStep};
pub use protocol::{AxisPosition, Command, PositionReport, Response, parse};
