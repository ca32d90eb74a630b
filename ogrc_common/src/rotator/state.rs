//! Axis state taxonomy.
//!
//! All enums use `#[repr(u8)]` for a compact layout. The controller of an
//! axis is the only writer of its [`AxisSnapshot`]; everybody else reads a
//! published copy.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use static_assertions::assert_impl_all;
use std::fmt;
use std::time::Instant;

use crate::consts::AXIS_COUNT;
use crate::rotator::calibration::SoftLimits;

// ─── Axis identity ──────────────────────────────────────────────────

/// One of the two controlled axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum AxisId {
    Azimuth = 0,
    Elevation = 1,
}

impl AxisId {
    /// Both axes, azimuth first.
    pub const ALL: [Self; AXIS_COUNT] = [Self::Azimuth, Self::Elevation];

    /// Array index of the axis.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Protocol tag (`AZ` / `EL`).
    #[inline]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Azimuth => "AZ",
            Self::Elevation => "EL",
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ─── Axis state machine ─────────────────────────────────────────────

/// Per-axis controller state.
///
/// `Unhomed → Homing → Idle ⇄ Moving ⇄ Holding`, `Fault` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum AxisStateKind {
    /// No absolute reference yet.
    #[default]
    Unhomed = 0,
    /// Homing sequence in progress.
    Homing = 1,
    /// At rest, nothing pending.
    Idle = 2,
    /// A motion request is executing.
    Moving = 3,
    /// Motion finished or stopped; waiting one feedback cycle.
    Holding = 4,
    /// Latched fault. Only `Home` leaves this state.
    Fault = 5,
}

impl AxisStateKind {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unhomed),
            1 => Some(Self::Homing),
            2 => Some(Self::Idle),
            3 => Some(Self::Moving),
            4 => Some(Self::Holding),
            5 => Some(Self::Fault),
            _ => None,
        }
    }

    /// States in which the axis is at rest and may take a correction.
    #[inline]
    pub const fn accepts_correction(self) -> bool {
        matches!(self, Self::Idle | Self::Holding)
    }
}

/// Why an axis is faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FaultReason {
    /// Limit switch tripped outside a homing sequence.
    UnexpectedLimit = 0,
    /// Homing switch not reached (or not released) within the travel bound.
    HomingTimeout = 1,
    /// Persistent motor transport failure or drive not enabled.
    DriveFault = 2,
}

impl FaultReason {
    /// Token used in log lines and position responses.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnexpectedLimit => "unexpected-limit",
            Self::HomingTimeout => "homing-timeout",
            Self::DriveFault => "drive-fault",
        }
    }
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Secondary status bits published alongside the axis state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AxisStatusFlags: u8 {
        /// Absolute reference established.
        const HOMED             = 0x01;
        /// Sensor reads failing; `actual_angle` is untrustworthy.
        const STALE             = 0x02;
        /// Limit switch currently active.
        const LIMIT_ACTIVE      = 0x04;
        /// Feedback corrections allowed.
        const CORRECTIONS_ARMED = 0x08;
    }
}

impl Default for AxisStatusFlags {
    fn default() -> Self {
        Self::empty()
    }
}

// ─── Published snapshot ─────────────────────────────────────────────

/// Consistent copy of one axis' state, replaced as a whole on every change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSnapshot {
    pub axis: AxisId,
    pub state: AxisStateKind,
    pub flags: AxisStatusFlags,
    /// Last accepted target [deg].
    pub target_angle: f64,
    /// Angle implied by accumulated steps [deg].
    pub commanded_angle: f64,
    /// Accumulated pulses from the home reference.
    pub commanded_steps: i64,
    /// Last sensor angle, if any [deg].
    pub actual_angle: Option<f64>,
    pub soft_limits: SoftLimits,
    /// Cruise speed of the current or last move [full steps/s].
    pub speed: f64,
    pub fault: Option<FaultReason>,
    /// Id and step sign of the motion request in flight.
    pub active_motion: Option<(u64, i64)>,
    /// Incremented on every successful homing.
    pub home_epoch: u64,
    /// When the axis last came to rest.
    pub settled_at: Option<Instant>,
}

assert_impl_all!(AxisSnapshot: Send, Sync, Copy);

impl AxisSnapshot {
    /// Fresh, unhomed axis at the zero position.
    pub fn new(axis: AxisId, soft_limits: SoftLimits, speed: f64) -> Self {
        Self {
            axis,
            state: AxisStateKind::Unhomed,
            flags: AxisStatusFlags::empty(),
            target_angle: 0.0,
            commanded_angle: 0.0,
            commanded_steps: 0,
            actual_angle: None,
            soft_limits,
            speed,
            fault: None,
            active_motion: None,
            home_epoch: 0,
            settled_at: None,
        }
    }

    #[inline]
    pub const fn is_homed(&self) -> bool {
        self.flags.contains(AxisStatusFlags::HOMED)
    }

    #[inline]
    pub const fn is_stale(&self) -> bool {
        self.flags.contains(AxisStatusFlags::STALE)
    }

    /// Commanded steps including `emitted` pulses of the move `motion_id`.
    ///
    /// Progress reported for any other move is ignored.
    #[inline]
    pub fn live_steps(&self, motion_id: u64, emitted: u64) -> i64 {
        match self.active_motion {
            Some((id, sign)) if id == motion_id => {
                self.commanded_steps + sign * i64::try_from(emitted).unwrap_or(i64::MAX)
            }
            _ => self.commanded_steps,
        }
    }
}
