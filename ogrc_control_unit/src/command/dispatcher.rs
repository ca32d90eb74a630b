//! Global command queue.
//!
//! Every state-changing command from every connection goes through one
//! bounded queue and is executed by a single task, so command effects are
//! linearised in arrival order across clients. Execution only waits for
//! validation (and for `S`, for both axes to be at rest), never for a move
//! to finish.

use std::sync::Arc;

use ogrc_common::rotator::{AxisId, AxisStateKind, CommandError, FaultReason};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::protocol::{Command, PositionReport, Response};
use crate::safety::limits::check_soft_limits;
use crate::state::axis::{AxisHandle, AxisSet};

struct Job {
    command: Command,
    reply: oneshot::Sender<Response>,
}

/// Submission side of the queue, one clone per connection.
#[derive(Clone)]
pub struct DispatchHandle {
    jobs: mpsc::Sender<Job>,
}

impl DispatchHandle {
    /// Queue a command and wait for its response.
    pub async fn submit(&self, command: Command) -> Response {
        let (reply, rx) = oneshot::channel();
        if self.jobs.send(Job { command, reply }).await.is_err() {
            return Response::Error(CommandError::Unavailable);
        }
        rx.await
            .unwrap_or(Response::Error(CommandError::Unavailable))
    }
}

/// The single consumer of the queue.
pub struct Dispatcher {
    axes: Arc<AxisSet>,
    jobs: mpsc::Receiver<Job>,
}

impl Dispatcher {
    /// Spawn the dispatcher task on the current tokio runtime.
    pub fn spawn(axes: Arc<AxisSet>, queue_depth: usize) -> (DispatchHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let dispatcher = Self { axes, jobs: rx };
        let task = tokio::spawn(dispatcher.run());
        (DispatchHandle { jobs: tx }, task)
    }

    async fn run(mut self) {
        debug!("dispatcher started");
        while let Some(job) = self.jobs.recv().await {
            let response = self.execute(job.command).await;
            let _ = job.reply.send(response);
        }
        debug!("dispatcher stopped");
    }

    /// Run one command to its response.
    pub async fn execute(&self, command: Command) -> Response {
        let axes = &self.axes;
        match command {
            Command::SetAzimuth(angle) => axes.azimuth.set_target(angle).await.into(),
            Command::SetElevation(angle) => axes.elevation.set_target(angle).await.into(),
            Command::SetBoth { az, el } => self.set_both(az, el).await.into(),
            Command::QueryPosition => Response::Position(report(axes)),
            Command::Stop => self.stop_all().await.into(),
            Command::Home => self.home_all().await.into(),
            Command::Reset => {
                info!("reset: stop then home");
                match self.stop_all().await {
                    Ok(()) => self.home_all().await.into(),
                    Err(e) => Response::Error(e),
                }
            }
            Command::Malformed(raw) => Response::Error(CommandError::Protocol(raw)),
        }
    }

    /// Validate both targets before touching either axis.
    ///
    /// If elevation still rejects its target, azimuth is sent back to the
    /// target it had before, so `W` never half-applies.
    async fn set_both(&self, az: f64, el: f64) -> Result<(), CommandError> {
        for (axis, angle) in [(AxisId::Azimuth, az), (AxisId::Elevation, el)] {
            precheck(self.axes.get(axis), angle)?;
        }
        let azimuth = &self.axes.azimuth;
        let previous = azimuth.snapshot().target_angle;
        azimuth.set_target(az).await?;
        if let Err(e) = self.axes.elevation.set_target(el).await {
            warn!(previous, "elevation rejected W ({e}), restoring azimuth target");
            if azimuth.set_target(previous).await.is_err() {
                azimuth.generator().cancel_all();
                let _ = azimuth.stop().await;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Cancel both pulse trains right away, then wait for both axes to rest.
    async fn stop_all(&self) -> Result<(), CommandError> {
        for handle in self.axes.iter() {
            handle.generator().cancel_all();
        }
        let (az, el) = tokio::join!(self.axes.azimuth.stop(), self.axes.elevation.stop());
        info!("both axes stopped");
        az.and(el)
    }

    async fn home_all(&self) -> Result<(), CommandError> {
        let (az, el) = tokio::join!(self.axes.azimuth.home(), self.axes.elevation.home());
        if az.is_err() || el.is_err() {
            warn!("homing request not delivered");
        }
        az.and(el)
    }
}

/// Same checks the controller makes, against the published snapshot.
fn precheck(handle: &AxisHandle, angle: f64) -> Result<(), CommandError> {
    let snap = handle.snapshot();
    check_soft_limits(handle.axis(), &snap.soft_limits, angle)?;
    match snap.state {
        AxisStateKind::Homing => Err(CommandError::Homing(handle.axis())),
        AxisStateKind::Fault => Err(CommandError::Fault(
            handle.axis(),
            snap.fault.unwrap_or(FaultReason::DriveFault),
        )),
        _ => Ok(()),
    }
}

/// Live position of both axes.
pub fn report(axes: &AxisSet) -> PositionReport {
    PositionReport {
        az: axes.azimuth.position(),
        el: axes.elevation.position(),
    }
}
