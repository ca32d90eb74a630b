//! Calibration supplied once at start-up and never mutated by the core.
//!
//! Optional fields use `#[serde(default)]`, so an empty TOML document (or a
//! missing file) yields the stock mount: 200 steps/rev, 40:1 worm gear, no
//! microstepping.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ConfigError;
use crate::consts::{FEEDBACK_PERIOD_MS_MAX, FEEDBACK_PERIOD_MS_MIN, MAX_PULSE_RATE_HZ};
use crate::hal::types::Direction;
use crate::rotator::state::AxisId;

// ─── Soft limits ────────────────────────────────────────────────────

/// Inclusive angular bounds enforced in software [deg].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftLimits {
    pub min: f64,
    pub max: f64,
}

impl SoftLimits {
    #[inline]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `true` if `angle` lies inside the bounds. NaN never does.
    #[inline]
    pub fn contains(&self, angle: f64) -> bool {
        angle >= self.min && angle <= self.max
    }
}

/// Float slack when comparing a pulse position against a bound [deg].
const LIMIT_EPSILON: f64 = 1e-9;

// ─── Motor ──────────────────────────────────────────────────────────

/// Drive train geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    /// Full steps per motor revolution.
    #[serde(default = "default_steps_per_revolution")]
    pub steps_per_revolution: u32,
    /// Motor revolutions per axis revolution.
    #[serde(default = "default_gear_ratio")]
    pub gear_ratio: f64,
    /// Driver pulses per full step.
    #[serde(default = "default_microstep")]
    pub microstep_multiplier: u32,
}

fn default_steps_per_revolution() -> u32 {
    200
}
fn default_gear_ratio() -> f64 {
    40.0
}
fn default_microstep() -> u32 {
    1
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            steps_per_revolution: default_steps_per_revolution(),
            gear_ratio: default_gear_ratio(),
            microstep_multiplier: default_microstep(),
        }
    }
}

impl MotorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.steps_per_revolution == 0 {
            return Err("motor.steps_per_revolution must be > 0".into());
        }
        if self.microstep_multiplier == 0 {
            return Err("motor.microstep_multiplier must be > 0".into());
        }
        if !(self.gear_ratio.is_finite() && self.gear_ratio > 0.0) {
            return Err(format!("motor.gear_ratio {} must be > 0", self.gear_ratio));
        }
        Ok(())
    }
}

// ─── Motion ─────────────────────────────────────────────────────────

/// Speeds in full steps per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    #[serde(default = "default_speed")]
    pub default_speed: f64,
    /// Ramp start/end speed.
    #[serde(default = "default_min_speed")]
    pub min_speed: f64,
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
    /// Full steps spent accelerating (and again decelerating).
    #[serde(default = "default_ramp_steps")]
    pub ramp_steps: u32,
    #[serde(default = "default_homing_speed")]
    pub homing_speed: f64,
    /// Cruise speed of feedback corrections.
    #[serde(default = "default_correction_speed")]
    pub correction_speed: f64,
}

fn default_speed() -> f64 {
    100.0
}
fn default_min_speed() -> f64 {
    1.0
}
fn default_max_speed() -> f64 {
    1000.0
}
fn default_ramp_steps() -> u32 {
    50
}
fn default_homing_speed() -> f64 {
    50.0
}
fn default_correction_speed() -> f64 {
    50.0
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            default_speed: default_speed(),
            min_speed: default_min_speed(),
            max_speed: default_max_speed(),
            ramp_steps: default_ramp_steps(),
            homing_speed: default_homing_speed(),
            correction_speed: default_correction_speed(),
        }
    }
}

impl MotionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.min_speed.is_finite() && self.min_speed > 0.0) {
            return Err(format!("motion.min_speed {} must be > 0", self.min_speed));
        }
        if !self.max_speed.is_finite() || self.max_speed < self.min_speed {
            return Err(format!(
                "motion.max_speed {} must be >= min_speed {}",
                self.max_speed, self.min_speed
            ));
        }
        let range = self.min_speed..=self.max_speed;
        for (name, value) in [
            ("default_speed", self.default_speed),
            ("homing_speed", self.homing_speed),
            ("correction_speed", self.correction_speed),
        ] {
            if !range.contains(&value) {
                return Err(format!(
                    "motion.{name} {value} out of range [{}, {}]",
                    self.min_speed, self.max_speed
                ));
            }
        }
        Ok(())
    }

    /// Clamp a requested speed into `[min_speed, max_speed]`.
    #[inline]
    pub fn clamp_speed(&self, speed: f64) -> f64 {
        speed.clamp(self.min_speed, self.max_speed)
    }
}

// ─── Feedback ───────────────────────────────────────────────────────

/// Sensor polling and correction policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    /// Minimum |error| that triggers a correction [deg].
    #[serde(default = "default_correction_threshold")]
    pub correction_threshold: f64,
    /// Largest single correction [deg].
    #[serde(default = "default_max_correction_step")]
    pub max_correction_step: f64,
    /// Acceptable disagreement between consecutive samples [deg].
    #[serde(default = "default_jitter_tolerance")]
    pub jitter_tolerance: f64,
    /// Failed cycles before `actual_angle` is marked stale.
    #[serde(default = "default_stale_after")]
    pub stale_after_failures: u32,
    /// Extra read attempts per cycle.
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,
    /// First retry delay, doubled on every further attempt [ms].
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_period_ms() -> u64 {
    100
}
fn default_correction_threshold() -> f64 {
    0.5
}
fn default_max_correction_step() -> f64 {
    1.0
}
fn default_jitter_tolerance() -> f64 {
    0.2
}
fn default_stale_after() -> u32 {
    5
}
fn default_read_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    5
}
fn default_read_timeout_ms() -> u64 {
    50
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_ms: default_period_ms(),
            correction_threshold: default_correction_threshold(),
            max_correction_step: default_max_correction_step(),
            jitter_tolerance: default_jitter_tolerance(),
            stale_after_failures: default_stale_after(),
            read_retries: default_read_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl FeedbackConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.period_ms < FEEDBACK_PERIOD_MS_MIN || self.period_ms > FEEDBACK_PERIOD_MS_MAX {
            return Err(format!(
                "feedback.period_ms {} out of range [{}, {}]",
                self.period_ms, FEEDBACK_PERIOD_MS_MIN, FEEDBACK_PERIOD_MS_MAX
            ));
        }
        if !(self.correction_threshold.is_finite() && self.correction_threshold > 0.0) {
            return Err("feedback.correction_threshold must be > 0".into());
        }
        if !(self.max_correction_step.is_finite() && self.max_correction_step > 0.0) {
            return Err("feedback.max_correction_step must be > 0".into());
        }
        if !(self.jitter_tolerance.is_finite() && self.jitter_tolerance >= 0.0) {
            return Err("feedback.jitter_tolerance must be >= 0".into());
        }
        if self.stale_after_failures == 0 {
            return Err("feedback.stale_after_failures must be >= 1".into());
        }
        if self.read_timeout_ms == 0 {
            return Err("feedback.read_timeout_ms must be > 0".into());
        }
        Ok(())
    }
}

// ─── Per-axis ───────────────────────────────────────────────────────

/// Limits and homing geometry of one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisCalibration {
    pub soft_min: f64,
    pub soft_max: f64,
    /// Direction that drives toward the home switch.
    #[serde(default = "default_homing_direction")]
    pub homing_direction: Direction,
    /// Travel allowed before the switch must trigger [deg].
    #[serde(default = "default_homing_max_travel")]
    pub homing_max_travel_deg: f64,
    /// Travel allowed for the switch to release on back-off [deg].
    #[serde(default = "default_homing_release")]
    pub homing_release_deg: f64,
    /// Motor wired so that `Cw` decreases the angle.
    #[serde(default)]
    pub invert_direction: bool,
}

fn default_homing_direction() -> Direction {
    Direction::Ccw
}
fn default_homing_max_travel() -> f64 {
    400.0
}
fn default_homing_release() -> f64 {
    5.0
}

impl AxisCalibration {
    /// Stock azimuth axis: full circle, home at 0°.
    pub fn azimuth() -> Self {
        Self {
            soft_min: 0.0,
            soft_max: 360.0,
            homing_direction: default_homing_direction(),
            homing_max_travel_deg: default_homing_max_travel(),
            homing_release_deg: default_homing_release(),
            invert_direction: false,
        }
    }

    /// Stock elevation axis: horizon to zenith, home at the horizon.
    pub fn elevation() -> Self {
        Self {
            soft_min: 0.0,
            soft_max: 90.0,
            homing_max_travel_deg: 120.0,
            ..Self::azimuth()
        }
    }

    #[inline]
    pub const fn soft_limits(&self) -> SoftLimits {
        SoftLimits::new(self.soft_min, self.soft_max)
    }

    pub fn validate(&self, axis: AxisId) -> Result<(), String> {
        if !(self.soft_min.is_finite() && self.soft_max.is_finite())
            || self.soft_min >= self.soft_max
        {
            return Err(format!(
                "{axis}: soft_min {} must be < soft_max {}",
                self.soft_min, self.soft_max
            ));
        }
        if !(self.homing_max_travel_deg.is_finite() && self.homing_max_travel_deg > 0.0) {
            return Err(format!("{axis}: homing_max_travel_deg must be > 0"));
        }
        if !(self.homing_release_deg.is_finite() && self.homing_release_deg > 0.0) {
            return Err(format!("{axis}: homing_release_deg must be > 0"));
        }
        Ok(())
    }
}

fn default_azimuth() -> AxisCalibration {
    AxisCalibration::azimuth()
}
fn default_elevation() -> AxisCalibration {
    AxisCalibration::elevation()
}

// ─── Calibration bundle ─────────────────────────────────────────────

/// Complete calibration of the mount.
///
/// # TOML Example
///
/// ```toml
/// [motor]
/// steps_per_revolution = 200
/// gear_ratio = 40.0
/// microstep_multiplier = 8
///
/// [feedback]
/// correction_threshold = 0.3
///
/// [elevation]
/// soft_min = 0.0
/// soft_max = 85.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default)]
    pub motor: MotorConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default = "default_azimuth")]
    pub azimuth: AxisCalibration,
    #[serde(default = "default_elevation")]
    pub elevation: AxisCalibration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            motor: MotorConfig::default(),
            motion: MotionConfig::default(),
            feedback: FeedbackConfig::default(),
            azimuth: default_azimuth(),
            elevation: default_elevation(),
        }
    }
}

impl CalibrationConfig {
    /// Calibration of one axis.
    #[inline]
    pub const fn axis(&self, axis: AxisId) -> &AxisCalibration {
        match axis {
            AxisId::Azimuth => &self.azimuth,
            AxisId::Elevation => &self.elevation,
        }
    }

    /// Driver pulses per degree of axis rotation.
    #[inline]
    pub fn steps_per_degree(&self) -> f64 {
        f64::from(self.motor.steps_per_revolution)
            * f64::from(self.motor.microstep_multiplier)
            * self.motor.gear_ratio
            / 360.0
    }

    /// Angular size of one pulse [deg].
    #[inline]
    pub fn step_resolution(&self) -> f64 {
        1.0 / self.steps_per_degree()
    }

    /// Pulses for `degrees`, rounded to the nearest pulse.
    #[inline]
    pub fn degrees_to_steps(&self, degrees: f64) -> i64 {
        (degrees * self.steps_per_degree()).round() as i64
    }

    #[inline]
    pub fn steps_to_degrees(&self, steps: i64) -> f64 {
        steps as f64 / self.steps_per_degree()
    }

    /// Like [`degrees_to_steps`](Self::degrees_to_steps), but never lands
    /// outside `limits`: a rounded position past a bound moves one pulse
    /// back inside.
    pub fn degrees_to_steps_within(&self, degrees: f64, limits: &SoftLimits) -> i64 {
        let steps = self.degrees_to_steps(degrees);
        let angle = self.steps_to_degrees(steps);
        if angle > limits.max + LIMIT_EPSILON {
            steps - 1
        } else if angle < limits.min - LIMIT_EPSILON {
            steps + 1
        } else {
            steps
        }
    }

    /// Sensor polling period.
    #[inline]
    pub const fn feedback_period(&self) -> Duration {
        Duration::from_millis(self.feedback.period_ms)
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.motor.validate().map_err(ConfigError::ValidationError)?;
        self.motion.validate().map_err(ConfigError::ValidationError)?;
        self.feedback
            .validate()
            .map_err(ConfigError::ValidationError)?;
        for axis in AxisId::ALL {
            self.axis(axis)
                .validate(axis)
                .map_err(ConfigError::ValidationError)?;
        }
        let peak_rate = self.motion.max_speed * f64::from(self.motor.microstep_multiplier);
        if peak_rate > MAX_PULSE_RATE_HZ {
            return Err(ConfigError::ValidationError(format!(
                "max pulse rate {peak_rate} Hz exceeds {MAX_PULSE_RATE_HZ} Hz"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_defaults() {
        let cal = CalibrationConfig::default();
        assert_eq!(cal.motor.steps_per_revolution, 200);
        assert_eq!(cal.motor.gear_ratio, 40.0);
        assert_eq!(cal.motor.microstep_multiplier, 1);
        assert_eq!(cal.motion.default_speed, 100.0);
        assert_eq!(cal.motion.min_speed, 1.0);
        assert_eq!(cal.motion.max_speed, 1000.0);
        assert_eq!(cal.azimuth.soft_limits(), SoftLimits::new(0.0, 360.0));
        assert_eq!(cal.elevation.soft_limits(), SoftLimits::new(0.0, 90.0));
        assert!(cal.validate().is_ok());
    }

    #[test]
    fn conversion_matches_drive_train() {
        let cal = CalibrationConfig::default();
        // 200 * 1 * 40 = 8000 pulses per axis revolution.
        assert_eq!(cal.degrees_to_steps(360.0), 8000);
        assert_eq!(cal.degrees_to_steps(180.0), 4000);
        assert_eq!(cal.degrees_to_steps(-1.0), -22);
        assert!((cal.step_resolution() - 0.045).abs() < 1e-12);
    }

    #[test]
    fn conversion_roundtrip_within_one_step() {
        let mut cal = CalibrationConfig::default();
        cal.motor.microstep_multiplier = 16;
        let res = cal.step_resolution();
        for i in 0..720 {
            let angle = i as f64 * 0.4937;
            let back = cal.steps_to_degrees(cal.degrees_to_steps(angle));
            assert!((back - angle).abs() <= res, "angle {angle} -> {back}");
        }
    }

    #[test]
    fn steps_within_limits_round_inward() {
        let cal = CalibrationConfig::default();
        let limits = SoftLimits::new(5.0, 85.0);

        // 85° is 1888.9 pulses, 5° is 111.1 pulses.
        assert_eq!(cal.degrees_to_steps(85.0), 1889);
        assert_eq!(cal.degrees_to_steps_within(85.0, &limits), 1888);
        assert_eq!(cal.degrees_to_steps(5.0), 111);
        assert_eq!(cal.degrees_to_steps_within(5.0, &limits), 112);
        for steps in [1888, 112] {
            assert!(limits.contains(cal.steps_to_degrees(steps)));
        }

        // Bounds on a pulse boundary are kept.
        let stock = SoftLimits::new(0.0, 90.0);
        assert_eq!(cal.degrees_to_steps_within(90.0, &stock), 2000);
        assert_eq!(cal.degrees_to_steps_within(0.0, &stock), 0);
        assert_eq!(cal.degrees_to_steps_within(45.0, &limits), 1000);
    }

    #[test]
    fn soft_limits_inclusive_and_reject_nan() {
        let lim = SoftLimits::new(0.0, 90.0);
        assert!(lim.contains(0.0));
        assert!(lim.contains(90.0));
        assert!(!lim.contains(90.01));
        assert!(!lim.contains(-0.1));
        assert!(!lim.contains(f64::NAN));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cal = CalibrationConfig::default();
        cal.motor.steps_per_revolution = 0;
        assert!(cal.validate().is_err());

        let mut cal = CalibrationConfig::default();
        cal.motion.default_speed = 5000.0;
        assert!(cal.validate().is_err());

        let mut cal = CalibrationConfig::default();
        cal.elevation.soft_min = 90.0;
        assert!(cal.validate().is_err());

        let mut cal = CalibrationConfig::default();
        cal.feedback.period_ms = 1;
        assert!(cal.validate().is_err());

        let mut cal = CalibrationConfig::default();
        cal.motor.microstep_multiplier = 256;
        cal.motion.max_speed = 1000.0;
        assert!(matches!(
            cal.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("pulse rate")
        ));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cal: CalibrationConfig = toml::from_str(
            r#"
            [motor]
            microstep_multiplier = 4

            [feedback]
            period_ms = 250

            [elevation]
            soft_min = 5.0
            soft_max = 85.0
            "#,
        )
        .unwrap();
        assert_eq!(cal.motor.microstep_multiplier, 4);
        assert_eq!(cal.motor.steps_per_revolution, 200);
        assert_eq!(cal.elevation.soft_limits(), SoftLimits::new(5.0, 85.0));
        assert_eq!(cal.elevation.homing_direction, Direction::Ccw);
        assert_eq!(cal.azimuth.soft_max, 360.0);
        assert_eq!(cal.feedback_period(), Duration::from_millis(250));
        assert!(cal.feedback.enabled);
    }
}
