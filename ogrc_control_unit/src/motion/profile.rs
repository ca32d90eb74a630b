//! Linear velocity ramp.
//!
//! The pulse rate climbs linearly with pulse index from `min_rate` to
//! `cruise_rate` over `ramp` pulses and mirrors that on the way down. Moves
//! shorter than two ramps never reach cruise and form a triangle with the
//! same slope.

use std::time::Duration;

use ogrc_common::rotator::CalibrationConfig;

/// Rate profile of one pulse train. Rates are in pulses per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampProfile {
    total: u64,
    min_rate: f64,
    cruise_rate: f64,
    ramp: u64,
}

impl RampProfile {
    /// Profile of `total` pulses. `cruise_rate` is raised to `min_rate` if lower.
    pub fn new(total: u64, min_rate: f64, cruise_rate: f64, ramp: u64) -> Self {
        let min_rate = min_rate.max(f64::MIN_POSITIVE);
        Self {
            total,
            min_rate,
            cruise_rate: cruise_rate.max(min_rate),
            ramp,
        }
    }

    /// Profile for a move of `pulses` at `speed` full steps/s on this mount.
    ///
    /// The speed is clamped to the configured range and scaled by the
    /// microstep multiplier, as are the ramp bounds.
    pub fn for_move(calibration: &CalibrationConfig, pulses: u64, speed: f64) -> Self {
        let micro = f64::from(calibration.motor.microstep_multiplier);
        let motion = &calibration.motion;
        Self::new(
            pulses,
            motion.min_speed * micro,
            motion.clamp_speed(speed) * micro,
            u64::from(motion.ramp_steps) * u64::from(calibration.motor.microstep_multiplier),
        )
    }

    /// Pulses in the train.
    #[inline]
    pub const fn len(&self) -> u64 {
        self.total
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }

    #[inline]
    pub const fn cruise_rate(&self) -> f64 {
        self.cruise_rate
    }

    /// Rate at which pulse `index` is emitted.
    pub fn rate_at(&self, index: u64) -> f64 {
        if self.ramp == 0 || index >= self.total {
            return self.cruise_rate;
        }
        let from_end = self.total - 1 - index;
        let k = index.min(from_end);
        if k >= self.ramp {
            self.cruise_rate
        } else {
            self.min_rate + (self.cruise_rate - self.min_rate) * (k as f64 / self.ramp as f64)
        }
    }

    /// Delay before pulse `index`.
    #[inline]
    pub fn interval(&self, index: u64) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_at(index))
    }
}
