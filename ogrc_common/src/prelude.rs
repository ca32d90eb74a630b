//! Prelude module for common re-exports.
//!
//! ```rust
//! use ogrc_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{AXIS_COUNT, DEFAULT_PORT};

// ─── Hardware capabilities ──────────────────────────────────────────
pub use crate::hal::driver::{
    AngleSensor, DriverFactory, HalDriver, HalError, HardwareBundle, LimitInput, MotorDriver,
};
pub use crate::hal::types::{Direction, LimitEdge, LimitEvent, SensorReading};

// ─── Rotator domain ─────────────────────────────────────────────────
pub use crate::rotator::{
    AxisCalibration, AxisId, AxisSnapshot, AxisStateKind, AxisStatusFlags, CalibrationConfig,
    CommandError, FaultReason, SoftLimits,
};
