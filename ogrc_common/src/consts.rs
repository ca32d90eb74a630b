//! System-wide constants for the OGRC workspace.
//!
//! Single source of truth for numeric limits and default paths.

use static_assertions::{const_assert, const_assert_eq};

/// Number of controlled axes (azimuth + elevation).
pub const AXIS_COUNT: usize = 2;

/// Default GS-232 TCP port (rotctld convention).
pub const DEFAULT_PORT: u16 = 4533;

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ogrc/ogrc.toml";

/// Canonical service name used in logs.
pub const SERVICE_NAME: &str = "ogrc";

/// Longest accepted protocol line in bytes (excluding the terminator).
pub const MAX_LINE_LEN: usize = 128;

/// Attempts per pulse before a motor transport failure faults the axis.
pub const MOTOR_RETRY_ATTEMPTS: u32 = 3;

/// Feedback period bounds [ms].
pub const FEEDBACK_PERIOD_MS_MIN: u64 = 10;
/// Feedback period bounds [ms].
pub const FEEDBACK_PERIOD_MS_MAX: u64 = 10_000;

/// Upper bound on pulse rate the generator will schedule [pulses/s].
pub const MAX_PULSE_RATE_HZ: f64 = 200_000.0;

const_assert_eq!(AXIS_COUNT, 2);
const_assert!(DEFAULT_PORT > 1024);
const_assert!(FEEDBACK_PERIOD_MS_MIN < FEEDBACK_PERIOD_MS_MAX);
const_assert!(MOTOR_RETRY_ATTEMPTS >= 1);
const_assert!(MAX_LINE_LEN >= 16);
