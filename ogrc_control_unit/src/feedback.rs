//! Sensor feedback loop.
//!
//! One thread polls the angle sensor at a fixed period, turns raw yaw and
//! pitch into per-axis samples and, for axes at rest, proposes a bounded
//! correction. The controller makes the final call.
//!
//! ## Corrections
//!
//! A sample proposes `commanded + clamp(error, ±max_correction_step)` when
//! all of the following hold:
//!
//! - `|error| > correction_threshold`
//! - the axis is `Idle` or `Holding`, armed, with no move in flight
//! - this sample and the one before it were taken after the axis settled
//! - the two samples agree within `jitter_tolerance`
//!
//! ## Staleness
//!
//! A cycle whose reads all fail counts as one failure. Exactly at
//! `stale_after_failures` consecutive failures both axes are told their
//! actual angle is stale; the next good sample clears it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ogrc_common::hal::driver::{AngleSensor, HalError};
use ogrc_common::hal::types::SensorReading;
use ogrc_common::consts::AXIS_COUNT;
use ogrc_common::rotator::{
    AxisId, AxisSnapshot, AxisStatusFlags, CalibrationConfig, FeedbackConfig,
};
use tracing::{debug, info, trace, warn};

use crate::error::RuntimeError;
use crate::state::axis::{AxisRequest, AxisSet};

/// Longest uninterrupted sleep, so shutdown is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Latest sensor view of one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackSample {
    pub axis: AxisId,
    /// Sensor angle in the axis frame, unwrapped next to the commanded angle [deg].
    pub measured: f64,
    pub at: Instant,
    pub seq: u64,
    /// Corrected position estimate, if one is proposed [deg].
    pub correction: Option<f64>,
}

/// Wrap an angle difference into (-180, 180].
#[inline]
pub fn normalize_angle(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}

// ─── Per-axis filter ────────────────────────────────────────────────

/// Sensor-to-axis mapping and correction gate of one axis.
#[derive(Debug, Clone)]
pub struct AxisFilter {
    axis: AxisId,
    /// Raw sensor angle at the home reference.
    offset: f64,
    /// Home epoch the offset belongs to.
    epoch: u64,
    /// Previous sample (measured, timestamp).
    prev: Option<(f64, Instant)>,
    seq: u64,
}

impl AxisFilter {
    pub const fn new(axis: AxisId) -> Self {
        Self {
            axis,
            offset: 0.0,
            epoch: 0,
            prev: None,
            seq: 0,
        }
    }

    #[inline]
    pub const fn offset(&self) -> f64 {
        self.offset
    }

    /// Turn one raw angle into a sample against the axis snapshot.
    pub fn process(
        &mut self,
        raw: f64,
        at: Instant,
        snap: &AxisSnapshot,
        config: &FeedbackConfig,
    ) -> FeedbackSample {
        let at_rest = snap.state.accepts_correction() && snap.active_motion.is_none();

        // Re-zero once per successful homing, taken while the axis sits at home.
        if snap.home_epoch != self.epoch && snap.is_homed() && at_rest {
            self.offset = raw - snap.commanded_angle;
            self.epoch = snap.home_epoch;
            self.prev = None;
            info!(axis = %self.axis, offset = self.offset, "sensor offset re-zeroed");
        }

        let frame = match self.axis {
            AxisId::Azimuth => (raw - self.offset).rem_euclid(360.0),
            AxisId::Elevation => raw - self.offset,
        };
        let error = normalize_angle(frame - snap.commanded_angle);
        let measured = snap.commanded_angle + error;

        let settled = |t: Instant| snap.settled_at.is_some_and(|s| t > s);
        let steady = self
            .prev
            .is_some_and(|(p, t)| settled(t) && (measured - p).abs() <= config.jitter_tolerance);
        let eligible = at_rest
            && snap.flags.contains(AxisStatusFlags::CORRECTIONS_ARMED)
            && settled(at)
            && steady;

        let correction = (eligible && error.abs() > config.correction_threshold).then(|| {
            let step = error.clamp(-config.max_correction_step, config.max_correction_step);
            snap.commanded_angle + step
        });

        self.seq += 1;
        self.prev = Some((measured, at));
        trace!(axis = %self.axis, seq = self.seq, measured, error, "sample");

        FeedbackSample {
            axis: self.axis,
            measured,
            at,
            seq: self.seq,
            correction,
        }
    }
}

// ─── Polling thread ─────────────────────────────────────────────────

/// The feedback polling activity.
pub struct FeedbackLoop {
    sensor: Box<dyn AngleSensor>,
    axes: Arc<AxisSet>,
    config: FeedbackConfig,
    period: Duration,
    filters: [AxisFilter; AXIS_COUNT],
    failures: u32,
    running: Arc<AtomicBool>,
}

impl FeedbackLoop {
    pub fn new(
        sensor: Box<dyn AngleSensor>,
        axes: Arc<AxisSet>,
        calibration: &CalibrationConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            sensor,
            axes,
            period: calibration.feedback_period(),
            config: calibration.feedback.clone(),
            filters: AxisId::ALL.map(AxisFilter::new),
            failures: 0,
            running,
        }
    }

    pub fn spawn(self) -> Result<JoinHandle<()>, RuntimeError> {
        std::thread::Builder::new()
            .name("ogrc-feedback".into())
            .spawn(move || self.run())
            .map_err(|source| RuntimeError::Spawn {
                name: "feedback",
                source,
            })
    }

    fn run(mut self) {
        info!(period_ms = self.config.period_ms, "feedback loop started");
        let mut deadline = Instant::now();
        while self.running.load(Ordering::Acquire) {
            match self.read_with_retry() {
                Ok(reading) => self.on_reading(&reading),
                Err(e) => self.on_failure(&e),
            }

            deadline += self.period;
            let now = Instant::now();
            if deadline <= now {
                debug!("feedback cycle overran its period");
                deadline = now;
                continue;
            }
            self.sleep_until(deadline);
        }
        info!("feedback loop stopped");
    }

    fn sleep_until(&self, deadline: Instant) {
        loop {
            if !self.running.load(Ordering::Acquire) {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            std::thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }

    fn read_with_retry(&mut self) -> Result<SensorReading, HalError> {
        let timeout = Duration::from_millis(self.config.read_timeout_ms);
        let mut backoff = Duration::from_millis(self.config.retry_backoff_ms);
        let mut attempt = 0;
        loop {
            match self.sensor.read_angles(timeout) {
                Ok(reading) => return Ok(reading),
                Err(e) if attempt < self.config.read_retries => {
                    trace!(attempt, "sensor read failed, retrying: {e}");
                    attempt += 1;
                    std::thread::sleep(backoff);
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn on_reading(&mut self, reading: &SensorReading) {
        if self.failures >= self.config.stale_after_failures {
            info!(after = self.failures, "sensor recovered");
        }
        self.failures = 0;

        for axis in AxisId::ALL {
            let handle = self.axes.get(axis);
            let snap = handle.snapshot();
            let sample = self.filters[axis.index()].process(
                reading.angle(axis),
                reading.timestamp,
                &snap,
                &self.config,
            );
            if let Some(target) = sample.correction {
                debug!(
                    axis = %axis,
                    commanded = snap.commanded_angle,
                    measured = sample.measured,
                    target,
                    "correction proposed"
                );
            }
            handle.send(AxisRequest::Sample(sample));
        }
    }

    fn on_failure(&mut self, error: &HalError) {
        self.failures = self.failures.saturating_add(1);
        debug!(failures = self.failures, "sensor cycle failed: {error}");
        if self.failures == self.config.stale_after_failures {
            warn!(failures = self.failures, "sensor unavailable, marking axes stale: {error}");
            for axis in AxisId::ALL {
                self.axes.get(axis).send(AxisRequest::SensorStale);
            }
        }
    }
}
