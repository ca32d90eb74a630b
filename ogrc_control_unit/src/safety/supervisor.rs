//! Limit-switch supervisor.
//!
//! Runs at the highest priority in the process. On every edge it latches
//! the switch level, cancels the pulse train directly on the generator if
//! the axis is moving or homing, and only then tells the controller. The
//! cancel never waits behind the controller's inbox.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use ogrc_common::consts::AXIS_COUNT;
use ogrc_common::hal::driver::LimitInput;
use ogrc_common::hal::types::{LimitEdge, LimitEvent};
use ogrc_common::rotator::{AxisId, AxisStateKind};
use tracing::{debug, error, info, warn};

use crate::error::RuntimeError;
use crate::rt::{RtOptions, rt_setup};
use crate::safety::limits::LimitLatch;
use crate::state::axis::{AxisRequest, AxisSet};

/// How long one edge wait may block before the running flag is rechecked.
const EDGE_POLL: Duration = Duration::from_millis(50);

pub struct SafetySupervisor {
    limits: Box<dyn LimitInput>,
    axes: Arc<AxisSet>,
    latches: [Arc<LimitLatch>; AXIS_COUNT],
    running: Arc<AtomicBool>,
}

impl SafetySupervisor {
    pub fn new(
        limits: Box<dyn LimitInput>,
        axes: Arc<AxisSet>,
        latches: [Arc<LimitLatch>; AXIS_COUNT],
        running: Arc<AtomicBool>,
    ) -> Self {
        let supervisor = Self {
            limits,
            axes,
            latches,
            running,
        };
        supervisor.seed_levels();
        supervisor
    }

    /// Latch the current switch levels before any edge arrives.
    fn seed_levels(&self) {
        for axis in AxisId::ALL {
            let active = self.limits.is_active(axis);
            self.latches[axis.index()].set_level(active);
            if active {
                warn!(%axis, "limit switch active at start-up");
                self.axes.get(axis).send(AxisRequest::LimitEdge(LimitEdge::Rising));
            }
        }
    }

    pub fn spawn(self, rt: Option<RtOptions>) -> Result<JoinHandle<()>, RuntimeError> {
        std::thread::Builder::new()
            .name("ogrc-safety".into())
            .spawn(move || self.run(rt))
            .map_err(|source| RuntimeError::Spawn {
                name: "safety",
                source,
            })
    }

    fn run(mut self, rt: Option<RtOptions>) {
        if let Some(opts) = rt {
            if let Err(e) = rt_setup(opts.cpu_core, opts.supervisor_priority()) {
                warn!("safety RT setup failed: {e}");
            }
        }
        info!("safety supervisor started");

        while self.running.load(Ordering::Acquire) {
            if let Some(event) = self.limits.wait_edge(EDGE_POLL) {
                self.on_edge(event);
            }
        }
        info!("safety supervisor stopped");
    }

    /// React to one limit edge.
    pub fn on_edge(&self, event: LimitEvent) {
        let axis = event.axis;
        self.latches[axis.index()].record(event.edge);

        let handle = self.axes.get(axis);
        let state = handle.snapshot().state;
        match (event.edge, state) {
            (LimitEdge::Rising, AxisStateKind::Moving) => {
                let id = handle.generator().cancel_current();
                error!(%axis, motion = id, "limit tripped while moving, pulses cancelled");
            }
            (edge, AxisStateKind::Homing) => {
                let id = handle.generator().cancel_current();
                debug!(%axis, ?edge, motion = id, "homing switch edge");
            }
            _ => {}
        }

        if !handle.send(AxisRequest::LimitEdge(event.edge)) {
            debug!(%axis, "controller gone, edge dropped");
        }
    }
}
