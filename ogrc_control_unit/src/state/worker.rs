//! Axis worker thread.
//!
//! Drains the axis inbox into the [`AxisController`] one request at a time,
//! publishes the snapshot after each, and only then answers the caller. A
//! reply therefore never races ahead of the state it reports on.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread::JoinHandle;

use ogrc_common::rotator::{AxisId, AxisSnapshot};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::RuntimeError;
use crate::state::axis::{AxisRequest, Reply};
use crate::state::machine::{AxisController, MotionPort};

/// Owns one controller and its inbox.
pub struct AxisWorker<P: MotionPort> {
    controller: AxisController<P>,
    inbox: Receiver<AxisRequest>,
    published: Arc<RwLock<AxisSnapshot>>,
    /// Stop callers waiting for the axis to come to rest.
    stop_waiters: Vec<Reply<()>>,
}

impl<P: MotionPort + 'static> AxisWorker<P> {
    pub fn new(
        controller: AxisController<P>,
        inbox: Receiver<AxisRequest>,
        published: Arc<RwLock<AxisSnapshot>>,
    ) -> Self {
        *published.write() = *controller.snapshot();
        Self {
            controller,
            inbox,
            published,
            stop_waiters: Vec::new(),
        }
    }

    pub fn spawn(self, axis: AxisId) -> Result<JoinHandle<()>, RuntimeError> {
        std::thread::Builder::new()
            .name(format!("ogrc-axis-{}", axis.tag().to_lowercase()))
            .spawn(move || self.run())
            .map_err(|source| RuntimeError::Spawn {
                name: "axis",
                source,
            })
    }

    fn run(mut self) {
        let axis = self.controller.snapshot().axis;
        debug!(%axis, "axis worker started");
        while let Ok(request) = self.inbox.recv() {
            if matches!(request, AxisRequest::Shutdown) {
                break;
            }
            self.handle(request);
        }
        self.controller.shutdown();
        self.publish();
        info!(%axis, state = ?self.controller.state(), "axis worker stopped");
    }

    /// Process one request. Exposed for driving the worker without a thread.
    pub fn handle(&mut self, request: AxisRequest) {
        let c = &mut self.controller;
        match request {
            AxisRequest::SetTarget { angle, reply } => {
                let result = c.set_target(angle);
                self.publish();
                let _ = reply.send(result);
            }
            AxisRequest::Stop { reply } => {
                c.stop();
                self.stop_waiters.push(reply);
                self.publish();
            }
            AxisRequest::Home { reply } => {
                c.home();
                self.publish();
                let _ = reply.send(());
            }
            AxisRequest::MotionDone(outcome) => {
                c.on_motion_done(&outcome);
                self.publish();
            }
            AxisRequest::LimitEdge(edge) => {
                c.on_limit_edge(edge);
                self.publish();
            }
            AxisRequest::Sample(sample) => {
                c.on_sample(&sample);
                self.publish();
            }
            AxisRequest::SensorStale => {
                c.on_sensor_stale();
                self.publish();
            }
            AxisRequest::Shutdown => {}
        }

        if !self.controller.has_active_motion() {
            for waiter in self.stop_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    #[inline]
    pub fn snapshot(&self) -> &AxisSnapshot {
        self.controller.snapshot()
    }

    fn publish(&self) {
        *self.published.write() = *self.controller.snapshot();
    }
}
