//! Requests into an axis controller and the handle used to submit them.

use std::sync::Arc;
use std::sync::mpsc::Sender;

use ogrc_common::hal::types::LimitEdge;
use ogrc_common::rotator::{AxisId, AxisSnapshot, AxisStateKind, CalibrationConfig, CommandError};
use parking_lot::RwLock;
use static_assertions::assert_impl_all;
use tokio::sync::oneshot;

use crate::command::protocol::AxisPosition;
use crate::feedback::FeedbackSample;
use crate::motion::{GeneratorHandle, MotionOutcome};

/// Reply channel for a client operation.
pub type Reply<T> = oneshot::Sender<T>;

/// Everything an axis controller reacts to.
#[derive(Debug)]
pub enum AxisRequest {
    SetTarget {
        angle: f64,
        reply: Reply<Result<(), CommandError>>,
    },
    /// Replied to once the axis is at rest.
    Stop { reply: Reply<()> },
    Home { reply: Reply<()> },
    MotionDone(MotionOutcome),
    LimitEdge(LimitEdge),
    Sample(FeedbackSample),
    SensorStale,
    Shutdown,
}

assert_impl_all!(AxisRequest: Send);

/// Cloneable access to one axis: request inbox, published snapshot and
/// the generator's cancel/progress side.
#[derive(Debug, Clone)]
pub struct AxisHandle {
    axis: AxisId,
    inbox: Sender<AxisRequest>,
    published: Arc<RwLock<AxisSnapshot>>,
    generator: GeneratorHandle,
    calibration: Arc<CalibrationConfig>,
}

impl AxisHandle {
    pub fn new(
        axis: AxisId,
        inbox: Sender<AxisRequest>,
        published: Arc<RwLock<AxisSnapshot>>,
        generator: GeneratorHandle,
        calibration: Arc<CalibrationConfig>,
    ) -> Self {
        Self {
            axis,
            inbox,
            published,
            generator,
            calibration,
        }
    }

    #[inline]
    pub const fn axis(&self) -> AxisId {
        self.axis
    }

    #[inline]
    pub const fn generator(&self) -> &GeneratorHandle {
        &self.generator
    }

    /// Fire-and-forget submission. `false` if the controller is gone.
    pub fn send(&self, request: AxisRequest) -> bool {
        self.inbox.send(request).is_ok()
    }

    /// Hand a new target to the controller; resolves once it is validated.
    pub async fn set_target(&self, angle: f64) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        if !self.send(AxisRequest::SetTarget { angle, reply }) {
            return Err(CommandError::Unavailable);
        }
        rx.await.unwrap_or(Err(CommandError::Unavailable))
    }

    /// Stop the axis; resolves once it is at rest.
    pub async fn stop(&self) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        if !self.send(AxisRequest::Stop { reply }) {
            return Err(CommandError::Unavailable);
        }
        rx.await.map_err(|_| CommandError::Unavailable)
    }

    /// Start homing; resolves once the sequence has started.
    pub async fn home(&self) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        if !self.send(AxisRequest::Home { reply }) {
            return Err(CommandError::Unavailable);
        }
        rx.await.map_err(|_| CommandError::Unavailable)
    }

    /// Blocking variant of [`home`](Self::home) for non-async callers.
    pub fn home_blocking(&self) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        if !self.send(AxisRequest::Home { reply }) {
            return Err(CommandError::Unavailable);
        }
        rx.blocking_recv().map_err(|_| CommandError::Unavailable)
    }

    /// Latest published snapshot.
    #[inline]
    pub fn snapshot(&self) -> AxisSnapshot {
        *self.published.read()
    }

    /// Live dead-reckoned position.
    ///
    /// Generator progress is read before the snapshot, so a newer snapshot
    /// can only add pulses. Successive reads never move back against the
    /// direction of travel.
    pub fn position(&self) -> AxisPosition {
        let (motion_id, emitted) = self.generator.progress();
        let snap = self.snapshot();
        let steps = snap.live_steps(motion_id, emitted);
        AxisPosition {
            angle: self.calibration.steps_to_degrees(steps),
            stale: snap.is_stale(),
            fault: if snap.state == AxisStateKind::Fault {
                snap.fault
            } else {
                None
            },
        }
    }
}

/// Both axes.
#[derive(Debug, Clone)]
pub struct AxisSet {
    pub azimuth: AxisHandle,
    pub elevation: AxisHandle,
}

assert_impl_all!(AxisSet: Send, Sync);

impl AxisSet {
    #[inline]
    pub const fn get(&self, axis: AxisId) -> &AxisHandle {
        match axis {
            AxisId::Azimuth => &self.azimuth,
            AxisId::Elevation => &self.elevation,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AxisHandle> {
        [&self.azimuth, &self.elevation].into_iter()
    }
}
