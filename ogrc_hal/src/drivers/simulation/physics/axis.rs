//! Stepper shaft with a single limit switch.
//!
//! Position is kept in driver pulses relative to the physical 0°. The
//! switch is engaged on the homing side of `switch_steps` (inclusive).

use ogrc_common::hal::driver::HalError;
use ogrc_common::hal::types::{Direction, LimitEdge};
use ogrc_common::rotator::{AxisCalibration, AxisId};
use tracing::trace;

/// Simulated axis driven by step pulses.
#[derive(Debug, Clone)]
pub struct AxisSimulator {
    axis: AxisId,
    steps_per_degree: f64,
    /// Physical shaft position [pulses from 0°]
    position_steps: i64,
    /// Switch threshold [pulses from 0°]
    switch_steps: i64,
    /// Side of the threshold on which the switch is engaged
    switch_side: Direction,
    /// Motor `Cw` turns the shaft toward decreasing angle
    inverted: bool,
    enabled: bool,
    direction: Direction,
    /// Test override of the switch level
    forced_limit: Option<bool>,
    /// Pulses that will fail with a transport error
    failing_pulses: u32,
    pulse_count: u64,
}

impl AxisSimulator {
    /// Create a shaft at `start_deg` with its switch at `switch_deg`.
    pub fn new(
        axis: AxisId,
        calibration: &AxisCalibration,
        steps_per_degree: f64,
        start_deg: f64,
        switch_deg: f64,
    ) -> Self {
        Self {
            axis,
            steps_per_degree,
            position_steps: (start_deg * steps_per_degree).round() as i64,
            switch_steps: (switch_deg * steps_per_degree).round() as i64,
            switch_side: calibration.homing_direction,
            inverted: calibration.invert_direction,
            enabled: false,
            direction: Direction::Cw,
            forced_limit: None,
            failing_pulses: 0,
            pulse_count: 0,
        }
    }

    /// Physical shaft angle [deg].
    #[inline]
    pub fn angle(&self) -> f64 {
        self.position_steps as f64 / self.steps_per_degree
    }

    /// Physical shaft position [pulses].
    #[inline]
    pub const fn position_steps(&self) -> i64 {
        self.position_steps
    }

    /// Pulses accepted since creation.
    #[inline]
    pub const fn pulse_count(&self) -> u64 {
        self.pulse_count
    }

    /// Drive energized.
    #[inline]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current switch level, honouring a forced override.
    pub fn limit_active(&self) -> bool {
        self.forced_limit.unwrap_or(match self.switch_side {
            Direction::Ccw => self.position_steps <= self.switch_steps,
            Direction::Cw => self.position_steps >= self.switch_steps,
        })
    }

    /// Energize or release the drive.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Latch the motor direction.
    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    /// Make the next `count` pulses fail with a transport error.
    pub fn fail_pulses(&mut self, count: u32) {
        self.failing_pulses = count;
    }

    /// Override (or with `None` release) the switch level.
    ///
    /// Returns the edge caused by the change, if any.
    pub fn force_limit(&mut self, level: Option<bool>) -> Option<LimitEdge> {
        let before = self.limit_active();
        self.forced_limit = level;
        edge_between(before, self.limit_active())
    }

    /// Move the shaft one pulse in the latched direction.
    ///
    /// Returns the switch edge crossed by this pulse, if any.
    pub fn pulse(&mut self) -> Result<Option<LimitEdge>, HalError> {
        if !self.enabled {
            return Err(HalError::DriveNotEnabled(self.axis));
        }
        if self.failing_pulses > 0 {
            self.failing_pulses -= 1;
            return Err(HalError::Transport(format!(
                "{}: simulated step line fault",
                self.axis
            )));
        }

        let before = self.limit_active();
        let physical = if self.inverted {
            self.direction.reversed()
        } else {
            self.direction
        };
        self.position_steps += physical.sign();
        self.pulse_count += 1;
        trace!(axis = %self.axis, pos = self.position_steps, "sim pulse");
        Ok(edge_between(before, self.limit_active()))
    }
}

fn edge_between(before: bool, after: bool) -> Option<LimitEdge> {
    match (before, after) {
        (false, true) => Some(LimitEdge::Rising),
        (true, false) => Some(LimitEdge::Falling),
        _ => None,
    }
}
