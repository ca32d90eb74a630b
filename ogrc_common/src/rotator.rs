//! Rotator domain types shared by the control unit and the drivers.
//!
//! - [`state`] - axis identifiers, axis state machine states, fault reasons
//!   and the published per-axis snapshot
//! - [`calibration`] - `CalibrationConfig` and angle↔step conversion
//! - [`error`] - client-facing command rejections

pub mod calibration;
pub mod error;
pub mod state;

pub use calibration::{
    AxisCalibration, CalibrationConfig, FeedbackConfig, MotionConfig, MotorConfig, SoftLimits,
};
pub use error::CommandError;
pub use state::{AxisId, AxisSnapshot, AxisStateKind, AxisStatusFlags, FaultReason};
