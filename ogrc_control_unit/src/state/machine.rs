//! Per-axis state machine.
//!
//! `Unhomed → Homing → Idle ⇄ Moving ⇄ Holding`, `Fault` from any state.
//!
//! The controller owns the [`AxisSnapshot`] of its axis and is its only
//! writer. Every operation here runs on the axis worker thread, one at a
//! time. Moves go out through a [`MotionPort`]; their outcome comes back
//! through [`AxisController::on_motion_done`], which is the only place
//! `commanded_steps` grows by emitted pulses.
//!
//! ## Retargeting
//!
//! A new target (or `Home`) while a move is active cancels the move and is
//! parked in `pending`. It starts from the exact consumed position when
//! the cancelled move reports back.
//!
//! ## Corrections
//!
//! A correction carries the feedback loop's estimate of where the axis
//! really is (`commanded + clamp(error)`). The controller re-bases the
//! dead-reckoned position onto it, then moves back to the client target.
//! `target_angle` is never changed by a correction.

use std::sync::Arc;
use std::time::Instant;

use ogrc_common::hal::types::LimitEdge;
use ogrc_common::rotator::{
    AxisId, AxisSnapshot, AxisStateKind, AxisStatusFlags, CalibrationConfig, CommandError,
    FaultReason,
};
use tracing::{debug, error, info, warn};

use crate::command::homing::{HomingSequence, HomingStep};
use crate::feedback::FeedbackSample;
use crate::motion::{MotionOutcome, MotionRequest};
use crate::safety::limits::{LimitLatch, check_soft_limits};

/// Where the controller sends motion requests.
pub trait MotionPort: Send {
    /// Queue a move. Fails only if the generator is gone.
    fn start(&mut self, request: MotionRequest) -> Result<(), CommandError>;

    /// Cancel `motion_id` and anything queued before it.
    fn cancel(&mut self, motion_id: u64);
}

/// What a move was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionKind {
    Target,
    Correction,
    Homing,
}

#[derive(Debug, Clone, Copy)]
struct ActiveMotion {
    id: u64,
    kind: MotionKind,
}

/// Action parked until the active move reports back.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Target(f64),
    Home,
}

/// State machine of one axis.
pub struct AxisController<P: MotionPort> {
    axis: AxisId,
    calibration: Arc<CalibrationConfig>,
    port: P,
    latch: Arc<LimitLatch>,
    snap: AxisSnapshot,
    next_motion_id: u64,
    active: Option<ActiveMotion>,
    pending: Option<Pending>,
    homing: HomingSequence,
}

impl<P: MotionPort> AxisController<P> {
    pub fn new(
        axis: AxisId,
        calibration: Arc<CalibrationConfig>,
        port: P,
        latch: Arc<LimitLatch>,
    ) -> Self {
        let snap = AxisSnapshot::new(
            axis,
            calibration.axis(axis).soft_limits(),
            calibration.motion.default_speed,
        );
        let homing = HomingSequence::new(&calibration, axis);
        Self {
            axis,
            calibration,
            port,
            latch,
            snap,
            next_motion_id: 0,
            active: None,
            pending: None,
            homing,
        }
    }

    #[inline]
    pub const fn snapshot(&self) -> &AxisSnapshot {
        &self.snap
    }

    #[inline]
    pub const fn state(&self) -> AxisStateKind {
        self.snap.state
    }

    /// A move is in flight (possibly already cancelled).
    #[inline]
    pub const fn has_active_motion(&self) -> bool {
        self.active.is_some()
    }

    // ─── Client operations ──────────────────────────────────────────

    /// Accept a new target angle.
    ///
    /// # Errors
    ///
    /// `Range` outside soft limits, `Homing` / `Fault` in those states.
    /// A rejected target leaves the axis untouched.
    pub fn set_target(&mut self, angle: f64) -> Result<(), CommandError> {
        check_soft_limits(self.axis, &self.snap.soft_limits, angle)?;
        self.accepts_target()?;

        self.snap.target_angle = angle;
        self.snap.flags.insert(AxisStatusFlags::CORRECTIONS_ARMED);
        debug!(axis = %self.axis, angle, "target accepted");

        if let Some(active) = self.active {
            self.port.cancel(active.id);
            self.pending = Some(Pending::Target(angle));
            self.snap.state = AxisStateKind::Moving;
            return Ok(());
        }
        if self.move_to(angle) {
            Ok(())
        } else {
            Err(CommandError::Unavailable)
        }
    }

    /// `Ok` if a target would be taken in the current state.
    pub fn accepts_target(&self) -> Result<(), CommandError> {
        match self.snap.state {
            AxisStateKind::Homing => Err(CommandError::Homing(self.axis)),
            AxisStateKind::Fault => Err(CommandError::Fault(
                self.axis,
                self.snap.fault.unwrap_or(FaultReason::DriveFault),
            )),
            _ => Ok(()),
        }
    }

    /// Cancel motion and come to rest. Aborts homing.
    ///
    /// Returns once the request is cancelled; the axis is at rest when
    /// [`has_active_motion`](Self::has_active_motion) turns false.
    pub fn stop(&mut self) {
        self.pending = None;
        self.snap.flags.remove(AxisStatusFlags::CORRECTIONS_ARMED);
        if self.homing.is_active() {
            info!(axis = %self.axis, "homing aborted by stop");
            self.homing.abort();
        }
        match self.active {
            Some(active) => self.port.cancel(active.id),
            None if self.snap.state != AxisStateKind::Fault => self.settle(),
            None => {}
        }
    }

    /// Start (or restart) homing. Clears a latched fault.
    pub fn home(&mut self) {
        info!(axis = %self.axis, from = ?self.snap.state, "homing requested");
        self.homing.abort();
        self.pending = None;
        self.snap.fault = None;
        self.snap
            .flags
            .remove(AxisStatusFlags::HOMED | AxisStatusFlags::CORRECTIONS_ARMED);
        self.snap.state = AxisStateKind::Homing;

        if let Some(active) = self.active {
            self.port.cancel(active.id);
            self.pending = Some(Pending::Home);
            return;
        }
        self.begin_homing();
    }

    // ─── Activity callbacks ─────────────────────────────────────────

    /// The generator finished a move.
    pub fn on_motion_done(&mut self, outcome: &MotionOutcome) {
        let Some(active) = self.active.filter(|a| a.id == outcome.id) else {
            debug!(axis = %self.axis, id = outcome.id, "stale motion outcome ignored");
            return;
        };
        self.active = None;
        self.snap.active_motion = None;
        self.set_steps(self.snap.commanded_steps + outcome.signed_emitted());

        if let Some(err) = &outcome.error {
            error!(axis = %self.axis, emitted = outcome.emitted, "drive failure: {err}");
            self.fault(FaultReason::DriveFault);
            return;
        }
        if self.snap.state == AxisStateKind::Fault {
            return;
        }

        if active.kind == MotionKind::Homing && self.homing.is_active() {
            let step = self.homing.advance(self.latch.is_active());
            self.apply_homing(step);
            return;
        }

        match self.pending.take() {
            Some(Pending::Target(angle)) => {
                self.move_to(angle);
            }
            Some(Pending::Home) => self.begin_homing(),
            None => self.settle(),
        }
    }

    /// Limit edge forwarded by the supervisor.
    ///
    /// The supervisor has already cancelled the running pulse train.
    pub fn on_limit_edge(&mut self, edge: LimitEdge) {
        self.snap
            .flags
            .set(AxisStatusFlags::LIMIT_ACTIVE, edge == LimitEdge::Rising);

        match (edge, self.snap.state) {
            (LimitEdge::Rising, AxisStateKind::Moving) => {
                error!(axis = %self.axis, angle = self.snap.commanded_angle, "unexpected limit switch");
                self.fault(FaultReason::UnexpectedLimit);
            }
            (_, AxisStateKind::Homing) => {
                debug!(axis = %self.axis, ?edge, "homing switch edge");
            }
            (LimitEdge::Rising, state) => {
                warn!(axis = %self.axis, ?state, "limit switch active while not moving");
            }
            (LimitEdge::Falling, _) => debug!(axis = %self.axis, "limit switch released"),
        }
    }

    /// Feedback sample, possibly carrying a corrective target.
    pub fn on_sample(&mut self, sample: &FeedbackSample) {
        self.snap.actual_angle = Some(sample.measured);
        self.snap.flags.remove(AxisStatusFlags::STALE);

        match sample.correction {
            Some(target) => self.apply_correction(target, sample.seq),
            None if self.snap.state == AxisStateKind::Holding => {
                self.snap.state = AxisStateKind::Idle;
            }
            None => {}
        }
    }

    /// Sensor reads have failed too often.
    pub fn on_sensor_stale(&mut self) {
        if !self.snap.is_stale() {
            warn!(axis = %self.axis, "actual angle stale");
        }
        self.snap.flags.insert(AxisStatusFlags::STALE);
    }

    /// Cancel whatever is running; the worker is going away.
    pub fn shutdown(&mut self) {
        self.pending = None;
        self.homing.abort();
        if let Some(active) = self.active.take() {
            self.port.cancel(active.id);
        }
        self.snap.active_motion = None;
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn set_steps(&mut self, steps: i64) {
        self.snap.commanded_steps = steps;
        self.snap.commanded_angle = self.calibration.steps_to_degrees(steps);
    }

    /// Pulse position for `angle` that stays inside the soft limits.
    #[inline]
    fn limited_steps(&self, angle: f64) -> i64 {
        self.calibration
            .degrees_to_steps_within(angle, &self.snap.soft_limits)
    }

    /// Start a move from the commanded position to `angle`.
    fn move_to(&mut self, angle: f64) -> bool {
        let steps = self.limited_steps(angle) - self.snap.commanded_steps;
        if steps == 0 {
            self.settle();
            return true;
        }
        let issued = self.issue(steps, self.calibration.motion.default_speed, MotionKind::Target);
        if issued {
            self.snap.state = AxisStateKind::Moving;
        }
        issued
    }

    /// Hand a move to the generator. Faults the axis if it is gone.
    fn issue(&mut self, steps: i64, speed: f64, kind: MotionKind) -> bool {
        self.next_motion_id += 1;
        let id = self.next_motion_id;
        let request = MotionRequest {
            id,
            axis: self.axis,
            steps,
            speed,
        };
        if let Err(e) = self.port.start(request) {
            error!(axis = %self.axis, "motion generator unavailable: {e}");
            self.fault(FaultReason::DriveFault);
            return false;
        }
        self.active = Some(ActiveMotion { id, kind });
        self.snap.active_motion = Some((id, steps.signum()));
        self.snap.speed = speed;
        debug!(axis = %self.axis, id, steps, ?kind, "move issued");
        true
    }

    /// Come to rest after motion.
    fn settle(&mut self) {
        self.snap.settled_at = Some(Instant::now());
        self.snap.state = if !self.snap.is_homed() {
            AxisStateKind::Unhomed
        } else if self.calibration.feedback.enabled {
            AxisStateKind::Holding
        } else {
            AxisStateKind::Idle
        };
    }

    fn fault(&mut self, reason: FaultReason) {
        if let Some(active) = self.active {
            self.port.cancel(active.id);
        }
        self.pending = None;
        self.homing.abort();
        self.snap.state = AxisStateKind::Fault;
        self.snap.fault = Some(reason);
        self.snap
            .flags
            .remove(AxisStatusFlags::HOMED | AxisStatusFlags::CORRECTIONS_ARMED);
        error!(axis = %self.axis, %reason, "axis faulted");
    }

    fn begin_homing(&mut self) {
        self.snap.state = AxisStateKind::Homing;
        let step = self.homing.start(self.latch.is_active());
        self.apply_homing(step);
    }

    fn apply_homing(&mut self, step: HomingStep) {
        match step {
            HomingStep::Move { steps } => {
                let speed = self.calibration.motion.homing_speed;
                self.issue(steps, speed, MotionKind::Homing);
            }
            HomingStep::Success => {
                self.set_steps(0);
                self.snap.target_angle = 0.0;
                self.snap.actual_angle = Some(0.0);
                self.snap.home_epoch += 1;
                self.snap
                    .flags
                    .insert(AxisStatusFlags::HOMED | AxisStatusFlags::CORRECTIONS_ARMED);
                self.snap.settled_at = Some(Instant::now());
                self.snap.state = AxisStateKind::Idle;
                info!(axis = %self.axis, epoch = self.snap.home_epoch, "homed");
            }
            HomingStep::Failed(reason) => {
                warn!(axis = %self.axis, ?reason, "homing failed");
                self.fault(FaultReason::HomingTimeout);
            }
        }
    }

    fn apply_correction(&mut self, corrected: f64, seq: u64) {
        let at_rest = self.snap.state.accepts_correction() && self.active.is_none();
        let armed = self.snap.flags.contains(AxisStatusFlags::CORRECTIONS_ARMED);
        if !at_rest || !armed {
            debug!(axis = %self.axis, seq, state = ?self.snap.state, "correction dropped");
            return;
        }
        if let Err(e) = check_soft_limits(self.axis, &self.snap.soft_limits, corrected) {
            warn!(axis = %self.axis, seq, "correction rejected: {e}");
            return;
        }
        let cap = self.calibration.feedback.max_correction_step
            + self.calibration.step_resolution() / 2.0;
        if (corrected - self.snap.commanded_angle).abs() > cap {
            warn!(axis = %self.axis, seq, corrected, "correction exceeds step cap, rejected");
            return;
        }

        let before = self.snap.commanded_angle;
        self.set_steps(self.limited_steps(corrected));
        info!(
            axis = %self.axis,
            seq,
            from = before,
            to = self.snap.commanded_angle,
            "position corrected"
        );

        let steps = self.limited_steps(self.snap.target_angle) - self.snap.commanded_steps;
        if steps == 0 {
            self.settle();
            return;
        }
        let speed = self.calibration.motion.correction_speed;
        if self.issue(steps, speed, MotionKind::Correction) {
            self.snap.state = AxisStateKind::Moving;
        }
    }
}
