//! Per-axis pulse thread.
//!
//! Turns a [`MotionRequest`] into direction-then-pulse cycles paced by a
//! [`RampProfile`]. The cancel flag is checked before every pulse and while
//! waiting, so a cancelled move stops with zero pending pulses and the
//! [`MotionOutcome`] carries the exact number of pulses emitted.
//!
//! Cancellation is id-based: `cancel(id)` cancels every move up to and
//! including `id`, including one still queued. No lock is taken on the
//! pulse path except the progress update.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use ogrc_common::consts::MOTOR_RETRY_ATTEMPTS;
use ogrc_common::hal::driver::{HalError, MotorDriver};
use ogrc_common::hal::types::Direction;
use ogrc_common::rotator::{AxisId, CalibrationConfig, CommandError};
use parking_lot::Mutex;
use static_assertions::assert_impl_all;
use tracing::{debug, error, trace, warn};

use crate::error::RuntimeError;
use crate::motion::profile::RampProfile;
use crate::rt::{Pacer, PulseStats, RtOptions, rt_setup};
use crate::state::machine::MotionPort;

// ─── Messages ───────────────────────────────────────────────────────

/// One move: a signed pulse count at a cruise speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionRequest {
    pub id: u64,
    pub axis: AxisId,
    /// Signed pulse delta (positive = increasing angle).
    pub steps: i64,
    /// Cruise speed [full steps/s].
    pub speed: f64,
}

assert_impl_all!(MotionRequest: Send, Copy);

/// Result of one move, reported exactly once per request.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionOutcome {
    pub id: u64,
    pub axis: AxisId,
    pub requested: i64,
    /// Pulses actually emitted.
    pub emitted: u64,
    pub cancelled: bool,
    /// Motor failure that ended the move.
    pub error: Option<HalError>,
}

impl MotionOutcome {
    /// Emitted pulses with the sign of the request.
    #[inline]
    pub fn signed_emitted(&self) -> i64 {
        let emitted = i64::try_from(self.emitted).unwrap_or(i64::MAX);
        if self.requested < 0 { -emitted } else { emitted }
    }

    /// Every requested pulse was emitted.
    #[inline]
    pub fn completed(&self) -> bool {
        !self.cancelled && self.error.is_none() && self.emitted == self.requested.unsigned_abs()
    }
}

// ─── Shared state ───────────────────────────────────────────────────

#[derive(Debug)]
struct GeneratorShared {
    /// Highest id handed to the thread.
    issued: AtomicU64,
    /// Moves with id <= this are cancelled.
    cancelled_upto: AtomicU64,
    /// (motion id, pulses emitted so far)
    progress: Mutex<(u64, u64)>,
    stats: Mutex<PulseStats>,
}

impl GeneratorShared {
    #[inline]
    fn is_cancelled(&self, id: u64) -> bool {
        id <= self.cancelled_upto.load(Ordering::Acquire)
    }

    #[inline]
    fn cancel_through(&self, id: u64) {
        self.cancelled_upto.fetch_max(id, Ordering::AcqRel);
    }
}

/// Cancel and observe handle, shared with the supervisor, the dispatcher
/// and position queries.
#[derive(Debug, Clone)]
pub struct GeneratorHandle {
    axis: AxisId,
    shared: Arc<GeneratorShared>,
}

impl GeneratorHandle {
    #[inline]
    pub const fn axis(&self) -> AxisId {
        self.axis
    }

    /// Cancel every move issued so far.
    pub fn cancel_all(&self) {
        let issued = self.shared.issued.load(Ordering::Acquire);
        self.shared.cancel_through(issued);
    }

    /// Cancel the move the pulse thread is executing right now.
    ///
    /// Moves issued after it are not affected.
    pub fn cancel_current(&self) -> u64 {
        let (id, _) = self.progress();
        self.shared.cancel_through(id);
        id
    }

    /// `(motion id, pulses emitted)` of the current or last move.
    #[inline]
    pub fn progress(&self) -> (u64, u64) {
        *self.shared.progress.lock()
    }

    /// Timing statistics accumulated over all finished moves.
    pub fn stats(&self) -> PulseStats {
        *self.shared.stats.lock()
    }
}

assert_impl_all!(GeneratorHandle: Send, Sync, Clone);

/// Submission end owned by the axis controller.
///
/// Dropping it stops the pulse thread once its current move is done.
pub struct GeneratorPort {
    shared: Arc<GeneratorShared>,
    jobs: Sender<MotionRequest>,
}

assert_impl_all!(GeneratorPort: Send);

impl MotionPort for GeneratorPort {
    fn start(&mut self, request: MotionRequest) -> Result<(), CommandError> {
        self.shared.issued.fetch_max(request.id, Ordering::AcqRel);
        self.jobs
            .send(request)
            .map_err(|_| CommandError::Unavailable)
    }

    fn cancel(&mut self, motion_id: u64) {
        self.shared.cancel_through(motion_id);
    }
}

// ─── Generator ──────────────────────────────────────────────────────

/// Completion callback, invoked on the pulse thread.
pub type CompletionSink = Box<dyn FnMut(MotionOutcome) + Send>;

/// The pulse thread of one axis.
pub struct MotionGenerator {
    axis: AxisId,
    calibration: CalibrationConfig,
    invert: bool,
    motors: Arc<dyn MotorDriver>,
    shared: Arc<GeneratorShared>,
    jobs: Receiver<MotionRequest>,
    on_done: CompletionSink,
}

impl MotionGenerator {
    /// Spawn the pulse thread for `axis`.
    pub fn spawn(
        axis: AxisId,
        calibration: &CalibrationConfig,
        motors: Arc<dyn MotorDriver>,
        on_done: CompletionSink,
        rt: Option<RtOptions>,
    ) -> Result<(GeneratorPort, GeneratorHandle, JoinHandle<()>), RuntimeError> {
        let shared = Arc::new(GeneratorShared {
            issued: AtomicU64::new(0),
            cancelled_upto: AtomicU64::new(0),
            progress: Mutex::new((0, 0)),
            stats: Mutex::new(PulseStats::new()),
        });
        let (tx, rx) = mpsc::channel();
        let generator = Self {
            axis,
            calibration: calibration.clone(),
            invert: calibration.axis(axis).invert_direction,
            motors,
            shared: Arc::clone(&shared),
            jobs: rx,
            on_done,
        };

        let name = format!("ogrc-pulse-{}", axis.tag().to_lowercase());
        let join = std::thread::Builder::new()
            .name(name)
            .spawn(move || generator.run(rt))
            .map_err(|source| RuntimeError::Spawn {
                name: "pulse",
                source,
            })?;

        Ok((
            GeneratorPort {
                shared: Arc::clone(&shared),
                jobs: tx,
            },
            GeneratorHandle { axis, shared },
            join,
        ))
    }

    fn run(mut self, rt: Option<RtOptions>) {
        if let Some(opts) = rt {
            if let Err(e) = rt_setup(opts.cpu_core, opts.priority) {
                warn!(axis = %self.axis, "RT setup failed, pacing without RT: {e}");
            }
        }
        debug!(axis = %self.axis, "pulse thread started");

        while let Ok(request) = self.jobs.recv() {
            let outcome = self.execute(&request);
            (self.on_done)(outcome);
        }

        debug!(axis = %self.axis, "pulse thread stopped");
    }

    fn execute(&mut self, request: &MotionRequest) -> MotionOutcome {
        let mut outcome = MotionOutcome {
            id: request.id,
            axis: self.axis,
            requested: request.steps,
            emitted: 0,
            cancelled: false,
            error: None,
        };
        *self.shared.progress.lock() = (request.id, 0);

        if self.shared.is_cancelled(request.id) {
            outcome.cancelled = true;
            return outcome;
        }
        let total = request.steps.unsigned_abs();
        if total == 0 {
            return outcome;
        }

        let direction = Direction::from_delta(request.steps);
        let motor_direction = if self.invert {
            direction.reversed()
        } else {
            direction
        };
        if let Err(e) = self.with_retry(|m, axis| m.set_direction(axis, motor_direction)) {
            error!(axis = %self.axis, "set_direction failed: {e}");
            outcome.error = Some(e);
            return outcome;
        }

        let profile = RampProfile::for_move(&self.calibration, total, request.speed);
        debug!(
            axis = %self.axis,
            id = request.id,
            steps = request.steps,
            rate = profile.cruise_rate(),
            "move started"
        );

        let mut pacer = Pacer::start();
        let mut stats = PulseStats::new();
        for index in 0..total {
            let interval = profile.interval(index);
            pacer.advance(interval);
            if !pacer.wait(|| self.shared.is_cancelled(request.id)) {
                outcome.cancelled = true;
                break;
            }
            let lateness = pacer.lateness();
            if let Err(e) = self.with_retry(|m, axis| m.emit_pulse(axis)) {
                error!(axis = %self.axis, emitted = outcome.emitted, "pulse failed: {e}");
                outcome.error = Some(e);
                break;
            }
            outcome.emitted += 1;
            self.shared.progress.lock().1 = outcome.emitted;
            stats.record(interval.as_nanos() as i64, lateness.as_nanos() as i64);
        }
        self.shared.stats.lock().merge(&stats);

        debug!(
            axis = %self.axis,
            id = request.id,
            emitted = outcome.emitted,
            cancelled = outcome.cancelled,
            "move finished"
        );
        outcome
    }

    /// Run a motor call, retrying transient failures.
    fn with_retry(
        &self,
        op: impl Fn(&dyn MotorDriver, AxisId) -> Result<(), HalError>,
    ) -> Result<(), HalError> {
        let mut attempt = 1;
        loop {
            match op(self.motors.as_ref(), self.axis) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < MOTOR_RETRY_ATTEMPTS => {
                    trace!(axis = %self.axis, attempt, "motor retry: {e}");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
