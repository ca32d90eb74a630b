//! Runtime assembly.
//!
//! [`Rotator`] wires the activities together:
//!
//! 1. enable both drives
//! 2. per axis: inbox, pulse thread, controller worker
//! 3. safety supervisor (limit edges)
//! 4. feedback loop, if enabled
//!
//! and tears them down in reverse on [`Rotator::shutdown`] or drop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ogrc_common::consts::AXIS_COUNT;
use ogrc_common::hal::driver::{HalDriver, HardwareBundle, MotorDriver};
use ogrc_common::rotator::{AxisId, AxisSnapshot, AxisStateKind, CalibrationConfig};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::RuntimeError;
use crate::feedback::FeedbackLoop;
use crate::motion::{CompletionSink, MotionGenerator};
use crate::rt::RtOptions;
use crate::safety::{LimitLatch, SafetySupervisor};
use crate::state::axis::{AxisHandle, AxisRequest, AxisSet};
use crate::state::machine::AxisController;
use crate::state::worker::AxisWorker;

const SETTLE_POLL: Duration = Duration::from_millis(10);

/// A running rotator core.
pub struct Rotator {
    calibration: Arc<CalibrationConfig>,
    axes: Arc<AxisSet>,
    latches: [Arc<LimitLatch>; AXIS_COUNT],
    motors: Arc<dyn MotorDriver>,
    driver: Option<Box<dyn HalDriver>>,
    running: Arc<AtomicBool>,
    /// Worker threads first, then the rest, in join order.
    threads: Vec<(&'static str, JoinHandle<()>)>,
    stopped: bool,
}

impl Rotator {
    /// Initialise `driver` and start every activity on its hardware.
    pub fn start(
        calibration: CalibrationConfig,
        mut driver: Box<dyn HalDriver>,
        rt: Option<RtOptions>,
    ) -> Result<Self, RuntimeError> {
        calibration.validate()?;
        info!(driver = driver.name(), version = driver.version(), "initialising HAL driver");
        let hardware = driver.init(&calibration)?;
        Self::start_with_hardware(calibration, hardware, Some(driver), rt)
    }

    /// Start every activity on already initialised hardware.
    pub fn start_with_hardware(
        calibration: CalibrationConfig,
        hardware: HardwareBundle,
        driver: Option<Box<dyn HalDriver>>,
        rt: Option<RtOptions>,
    ) -> Result<Self, RuntimeError> {
        calibration.validate()?;
        let calibration = Arc::new(calibration);
        let HardwareBundle {
            motors,
            sensor,
            limits,
        } = hardware;

        for axis in AxisId::ALL {
            motors.enable(axis)?;
        }

        let running = Arc::new(AtomicBool::new(true));
        let latches = [Arc::new(LimitLatch::new()), Arc::new(LimitLatch::new())];

        let (azimuth, mut threads) =
            spawn_axis(AxisId::Azimuth, &calibration, &motors, &latches[0], rt)?;
        let (elevation, el_threads) =
            match spawn_axis(AxisId::Elevation, &calibration, &motors, &latches[1], rt) {
                Ok(spawned) => spawned,
                Err(e) => {
                    error!("elevation axis failed to start: {e}");
                    abort_start(&running, [&azimuth], threads, motors.as_ref());
                    return Err(e);
                }
            };
        threads.extend(el_threads);
        let axes = Arc::new(AxisSet { azimuth, elevation });

        let supervisor = SafetySupervisor::new(
            limits,
            Arc::clone(&axes),
            latches.clone(),
            Arc::clone(&running),
        );
        match supervisor.spawn(rt) {
            Ok(thread) => threads.push(("safety", thread)),
            Err(e) => {
                abort_start(&running, axes.iter(), threads, motors.as_ref());
                return Err(e);
            }
        }

        if calibration.feedback.enabled {
            let feedback =
                FeedbackLoop::new(sensor, Arc::clone(&axes), &calibration, Arc::clone(&running));
            match feedback.spawn() {
                Ok(thread) => threads.push(("feedback", thread)),
                Err(e) => {
                    abort_start(&running, axes.iter(), threads, motors.as_ref());
                    return Err(e);
                }
            }
        } else {
            info!("feedback loop disabled");
        }

        info!(
            steps_per_degree = calibration.steps_per_degree(),
            "rotator started"
        );
        Ok(Self {
            calibration,
            axes,
            latches,
            motors,
            driver,
            running,
            threads,
            stopped: false,
        })
    }

    #[inline]
    pub fn axes(&self) -> Arc<AxisSet> {
        Arc::clone(&self.axes)
    }

    #[inline]
    pub fn axis(&self, axis: AxisId) -> &AxisHandle {
        self.axes.get(axis)
    }

    #[inline]
    pub fn calibration(&self) -> &CalibrationConfig {
        &self.calibration
    }

    /// Rising limit edges seen on `axis` since start.
    pub fn limit_trips(&self, axis: AxisId) -> u64 {
        self.latches[axis.index()].trips()
    }

    /// Wait until `predicate` holds for the snapshot of `axis`.
    pub fn wait_for(
        &self,
        axis: AxisId,
        timeout: Duration,
        predicate: impl Fn(&AxisSnapshot) -> bool,
    ) -> Result<AxisSnapshot, RuntimeError> {
        let deadline = Instant::now() + timeout;
        loop {
            let snap = self.axis(axis).snapshot();
            if predicate(&snap) {
                return Ok(snap);
            }
            if Instant::now() >= deadline {
                return Err(RuntimeError::Timeout("axis state"));
            }
            std::thread::sleep(SETTLE_POLL);
        }
    }

    /// Home both axes and wait for the sequences to end.
    ///
    /// A sequence that ends in `Fault` is logged, not returned as an error;
    /// the axis stays faulted until the client sends `H`.
    pub fn home_all_blocking(&self, timeout: Duration) -> Result<(), RuntimeError> {
        for handle in self.axes.iter() {
            if handle.home_blocking().is_err() {
                return Err(RuntimeError::Timeout("homing request"));
            }
        }
        for axis in AxisId::ALL {
            let snap = self
                .wait_for(axis, timeout, |s| {
                    s.state != AxisStateKind::Homing && s.active_motion.is_none()
                })
                .map_err(|_| RuntimeError::Timeout("homing"))?;
            match snap.state {
                AxisStateKind::Fault => {
                    warn!(%axis, fault = ?snap.fault, "start-up homing failed");
                }
                _ => info!(%axis, "start-up homing complete"),
            }
        }
        Ok(())
    }

    /// Stop every activity, disable the drives and release the driver.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!("rotator shutting down");

        let threads = std::mem::take(&mut self.threads);
        stop_activities(&self.running, self.axes.iter(), threads);
        for handle in self.axes.iter() {
            let stats = handle.generator().stats();
            info!(
                axis = %handle.axis(),
                pulses = stats.pulse_count,
                avg_interval_ns = stats.avg_interval_ns(),
                late = stats.late_pulses,
                max_lateness_us = stats.max_lateness_ns / 1000,
                "pulse statistics"
            );
        }

        disable_drives(self.motors.as_ref());
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.shutdown() {
                warn!(driver = driver.name(), "driver shutdown failed: {e}");
            }
        }
        info!("rotator stopped");
    }
}

impl Drop for Rotator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

type AxisThreads = Vec<(&'static str, JoinHandle<()>)>;

/// Clear the running flag, cancel and shut down `axes`, then join `threads`.
fn stop_activities<'a>(
    running: &AtomicBool,
    axes: impl IntoIterator<Item = &'a AxisHandle>,
    threads: AxisThreads,
) {
    running.store(false, Ordering::Release);
    for handle in axes {
        handle.generator().cancel_all();
        handle.send(AxisRequest::Shutdown);
    }
    for (name, thread) in threads {
        if thread.join().is_err() {
            error!(thread = name, "activity thread panicked");
        }
    }
}

fn disable_drives(motors: &dyn MotorDriver) {
    for axis in AxisId::ALL {
        if let Err(e) = motors.disable(axis) {
            warn!(%axis, "disable failed: {e}");
        }
    }
}

/// Undo a partial start: stop what was spawned and disable the drives.
fn abort_start<'a>(
    running: &AtomicBool,
    axes: impl IntoIterator<Item = &'a AxisHandle>,
    threads: AxisThreads,
    motors: &dyn MotorDriver,
) {
    stop_activities(running, axes, threads);
    disable_drives(motors);
}

/// Inbox, pulse thread and controller worker of one axis.
fn spawn_axis(
    axis: AxisId,
    calibration: &Arc<CalibrationConfig>,
    motors: &Arc<dyn MotorDriver>,
    latch: &Arc<LimitLatch>,
    rt: Option<RtOptions>,
) -> Result<(AxisHandle, AxisThreads), RuntimeError> {
    let (inbox, requests) = mpsc::channel();

    let completions = inbox.clone();
    let sink: CompletionSink = Box::new(move |outcome| {
        if completions.send(AxisRequest::MotionDone(outcome)).is_err() {
            debug!(%axis, "controller gone, outcome dropped");
        }
    });
    let (port, generator, pulse_thread) =
        MotionGenerator::spawn(axis, calibration, Arc::clone(motors), sink, rt)?;

    let controller = AxisController::new(axis, Arc::clone(calibration), port, Arc::clone(latch));
    let published = Arc::new(RwLock::new(*controller.snapshot()));
    let worker = AxisWorker::new(controller, requests, Arc::clone(&published));
    let worker_thread = worker.spawn(axis)?;

    let handle = AxisHandle::new(axis, inbox, published, generator, Arc::clone(calibration));
    Ok((handle, vec![("axis", worker_thread), ("pulse", pulse_thread)]))
}
