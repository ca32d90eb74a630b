//! Capability traits, the HAL driver trait and error types.
//!
//! This module defines:
//! - `MotorDriver` - pulse/direction/enable output per axis
//! - `AngleSensor` - orientation read returning `(yaw, pitch, timestamp)`
//! - `LimitInput` - edge-triggered limit-switch notifications
//! - `HalDriver` trait - pluggable backend that builds the three capabilities
//! - `HalError` enum - transport and driver errors
//! - `DriverFactory` type alias - factory function type

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::hal::types::{Direction, LimitEvent, SensorReading};
use crate::rotator::{AxisId, CalibrationConfig};

/// Error types for HAL operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HalError {
    /// Motor or sensor transport failure (bus error, bad frame)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation did not complete in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Pulse requested while the drive is disabled
    #[error("Drive not enabled on {0}")]
    DriveNotEnabled(AxisId),

    /// Driver initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),
}

impl HalError {
    /// Whether retrying the same operation may succeed.
    #[inline]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

/// Step/direction/enable output for both axes.
///
/// Shared between the per-axis motion threads, so calls for different axes
/// may arrive concurrently.
pub trait MotorDriver: Send + Sync {
    /// Energize the drive of `axis`.
    fn enable(&self, axis: AxisId) -> Result<(), HalError>;

    /// De-energize the drive of `axis`.
    fn disable(&self, axis: AxisId) -> Result<(), HalError>;

    /// Latch the direction used by subsequent pulses.
    fn set_direction(&self, axis: AxisId, direction: Direction) -> Result<(), HalError>;

    /// Emit one step pulse (one microstep) in the latched direction.
    fn emit_pulse(&self, axis: AxisId) -> Result<(), HalError>;
}

/// Orientation sensor (yaw and pitch over one read).
pub trait AngleSensor: Send {
    /// Read both angles. Must return within `timeout`.
    fn read_angles(&mut self, timeout: Duration) -> Result<SensorReading, HalError>;
}

/// Limit-switch inputs for both axes.
pub trait LimitInput: Send {
    /// Block until the next edge or until `timeout` elapses.
    fn wait_edge(&mut self, timeout: Duration) -> Option<LimitEvent>;

    /// Current level of the switch on `axis`.
    fn is_active(&self, axis: AxisId) -> bool;
}

/// The capabilities a driver hands to the rotator core.
pub struct HardwareBundle {
    pub motors: Arc<dyn MotorDriver>,
    pub sensor: Box<dyn AngleSensor>,
    pub limits: Box<dyn LimitInput>,
}

impl std::fmt::Debug for HardwareBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareBundle").finish_non_exhaustive()
    }
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn HalDriver>;

/// Trait defining the interface for HAL drivers.
///
/// # Lifecycle
///
/// 1. `init()` - called once before any activity starts; returns the
///    capability bundle
/// 2. `shutdown()` - called after every activity has stopped
pub trait HalDriver: Send {
    /// Returns the driver's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Open the hardware and build the capabilities.
    ///
    /// # Errors
    /// Return `HalError::InitFailed` if the hardware cannot be opened.
    fn init(&mut self, calibration: &CalibrationConfig) -> Result<HardwareBundle, HalError>;

    /// Release hardware resources.
    fn shutdown(&mut self) -> Result<(), HalError>;
}
