//! Plain data exchanged with the hardware capabilities.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::rotator::AxisId;

/// Rotation direction as seen by the motor driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Clockwise, increasing angle.
    #[default]
    Cw,
    /// Counter-clockwise, decreasing angle.
    Ccw,
}

impl Direction {
    /// Direction that moves by a signed step delta.
    #[inline]
    pub const fn from_delta(delta: i64) -> Self {
        if delta < 0 { Self::Ccw } else { Self::Cw }
    }

    /// +1 for `Cw`, -1 for `Ccw`.
    #[inline]
    pub const fn sign(self) -> i64 {
        match self {
            Self::Cw => 1,
            Self::Ccw => -1,
        }
    }

    #[inline]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Cw => Self::Ccw,
            Self::Ccw => Self::Cw,
        }
    }
}

/// Transition of a limit-switch input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitEdge {
    /// Switch became active (contact made).
    Rising,
    /// Switch released.
    Falling,
}

/// One edge notification from a limit-switch input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitEvent {
    pub axis: AxisId,
    pub edge: LimitEdge,
    pub at: Instant,
}

impl LimitEvent {
    pub fn new(axis: AxisId, edge: LimitEdge) -> Self {
        Self {
            axis,
            edge,
            at: Instant::now(),
        }
    }
}

/// Raw orientation read from the angle sensor.
///
/// `yaw` maps to azimuth, `pitch` to elevation. Values are degrees as the
/// sensor reports them; wraparound handling is the consumer's job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub yaw: f64,
    pub pitch: f64,
    pub timestamp: Instant,
}

impl SensorReading {
    /// Angle for one axis.
    #[inline]
    pub const fn angle(&self, axis: AxisId) -> f64 {
        match axis {
            AxisId::Azimuth => self.yaw,
            AxisId::Elevation => self.pitch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_from_delta() {
        assert_eq!(Direction::from_delta(10), Direction::Cw);
        assert_eq!(Direction::from_delta(0), Direction::Cw);
        assert_eq!(Direction::from_delta(-3), Direction::Ccw);
        assert_eq!(Direction::Ccw.sign(), -1);
        assert_eq!(Direction::Cw.reversed(), Direction::Ccw);
    }

    #[test]
    fn reading_maps_axes() {
        let r = SensorReading {
            yaw: 12.5,
            pitch: 40.0,
            timestamp: Instant::now(),
        };
        assert_eq!(r.angle(AxisId::Azimuth), 12.5);
        assert_eq!(r.angle(AxisId::Elevation), 40.0);
    }
}
