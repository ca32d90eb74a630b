//! Capability endpoints of the simulated mount.
//!
//! One shared [`SimMount`] backs all three capabilities, so pulses emitted
//! through the motor endpoint move the shaft the sensor reports and cross
//! the switch the limit endpoint watches.

use ogrc_common::hal::driver::{AngleSensor, HalError, LimitInput, MotorDriver};
use ogrc_common::hal::types::{Direction, LimitEdge, LimitEvent, SensorReading};
use ogrc_common::rotator::AxisId;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tracing::debug;

use super::physics::AxisSimulator;

/// Sensor error model.
#[derive(Debug, Clone, Default)]
struct SensorModel {
    /// Added to the true angle [deg]
    offset: [f64; 2],
    /// Reads that will time out before the sensor answers again
    failing_reads: u32,
    offline: bool,
    reads: u64,
}

/// Shared state of the simulated mount.
pub(crate) struct SimMount {
    axes: [Mutex<AxisSimulator>; 2],
    sensor: Mutex<SensorModel>,
    edge_tx: Sender<LimitEvent>,
}

impl SimMount {
    pub(crate) fn new(axes: [AxisSimulator; 2], offsets: [f64; 2], edge_tx: Sender<LimitEvent>) -> Self {
        let [az, el] = axes;
        Self {
            axes: [Mutex::new(az), Mutex::new(el)],
            sensor: Mutex::new(SensorModel {
                offset: offsets,
                ..SensorModel::default()
            }),
            edge_tx,
        }
    }

    #[inline]
    fn axis(&self, axis: AxisId) -> &Mutex<AxisSimulator> {
        &self.axes[axis.index()]
    }

    fn publish(&self, axis: AxisId, edge: Option<LimitEdge>) {
        if let Some(edge) = edge {
            debug!(%axis, ?edge, "sim limit edge");
            // Receiver is gone only after shutdown.
            let _ = self.edge_tx.send(LimitEvent::new(axis, edge));
        }
    }
}

// ─── Motor endpoint ─────────────────────────────────────────────────

pub(crate) struct SimMotors(pub(crate) Arc<SimMount>);

impl MotorDriver for SimMotors {
    fn enable(&self, axis: AxisId) -> Result<(), HalError> {
        self.0.axis(axis).lock().set_enabled(true);
        Ok(())
    }

    fn disable(&self, axis: AxisId) -> Result<(), HalError> {
        self.0.axis(axis).lock().set_enabled(false);
        Ok(())
    }

    fn set_direction(&self, axis: AxisId, direction: Direction) -> Result<(), HalError> {
        self.0.axis(axis).lock().set_direction(direction);
        Ok(())
    }

    fn emit_pulse(&self, axis: AxisId) -> Result<(), HalError> {
        let edge = self.0.axis(axis).lock().pulse()?;
        self.0.publish(axis, edge);
        Ok(())
    }
}

// ─── Sensor endpoint ────────────────────────────────────────────────

pub(crate) struct SimSensor(pub(crate) Arc<SimMount>);

impl AngleSensor for SimSensor {
    fn read_angles(&mut self, timeout: Duration) -> Result<SensorReading, HalError> {
        let (offset, fail) = {
            let mut model = self.0.sensor.lock();
            model.reads += 1;
            let fail = model.offline || model.failing_reads > 0;
            model.failing_reads = model.failing_reads.saturating_sub(1);
            (model.offset, fail)
        };
        if fail {
            return Err(HalError::Timeout(timeout));
        }
        let az = self.0.axis(AxisId::Azimuth).lock().angle();
        let el = self.0.axis(AxisId::Elevation).lock().angle();
        Ok(SensorReading {
            yaw: (az + offset[0]).rem_euclid(360.0),
            pitch: el + offset[1],
            timestamp: Instant::now(),
        })
    }
}

// ─── Limit endpoint ─────────────────────────────────────────────────

pub(crate) struct SimLimits {
    pub(crate) mount: Arc<SimMount>,
    pub(crate) edges: Receiver<LimitEvent>,
}

impl LimitInput for SimLimits {
    fn wait_edge(&mut self, timeout: Duration) -> Option<LimitEvent> {
        match self.edges.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    fn is_active(&self, axis: AxisId) -> bool {
        self.mount.axis(axis).lock().limit_active()
    }
}

// ─── Test handle ────────────────────────────────────────────────────

/// Inspection and fault-injection handle on a running simulated mount.
#[derive(Clone)]
pub struct SimulationHandle(pub(crate) Arc<SimMount>);

impl SimulationHandle {
    /// True shaft angle [deg].
    pub fn angle(&self, axis: AxisId) -> f64 {
        self.0.axis(axis).lock().angle()
    }

    /// True shaft position [pulses from 0°].
    pub fn position_steps(&self, axis: AxisId) -> i64 {
        self.0.axis(axis).lock().position_steps()
    }

    /// Pulses accepted by the axis so far.
    pub fn pulse_count(&self, axis: AxisId) -> u64 {
        self.0.axis(axis).lock().pulse_count()
    }

    /// Drive energized.
    pub fn is_enabled(&self, axis: AxisId) -> bool {
        self.0.axis(axis).lock().is_enabled()
    }

    /// Current switch level.
    pub fn limit_active(&self, axis: AxisId) -> bool {
        self.0.axis(axis).lock().limit_active()
    }

    /// Force the switch level (`None` returns it to the shaft position).
    pub fn force_limit(&self, axis: AxisId, level: Option<bool>) {
        let edge = self.0.axis(axis).lock().force_limit(level);
        self.0.publish(axis, edge);
    }

    /// Fail the next `count` pulses of `axis` with a transport error.
    pub fn fail_pulses(&self, axis: AxisId, count: u32) {
        self.0.axis(axis).lock().fail_pulses(count);
    }

    /// Bias the sensor reading of `axis` by `offset` degrees.
    pub fn set_sensor_offset(&self, axis: AxisId, offset: f64) {
        self.0.sensor.lock().offset[axis.index()] = offset;
    }

    /// Time out the next `count` sensor reads.
    pub fn fail_sensor_reads(&self, count: u32) {
        self.0.sensor.lock().failing_reads = count;
    }

    /// Take the sensor off the bus (or bring it back).
    pub fn set_sensor_offline(&self, offline: bool) {
        self.0.sensor.lock().offline = offline;
    }

    /// Sensor reads attempted so far.
    pub fn sensor_reads(&self) -> u64 {
        self.0.sensor.lock().reads
    }
}

impl std::fmt::Debug for SimulationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationHandle")
            .field("az_steps", &self.position_steps(AxisId::Azimuth))
            .field("el_steps", &self.position_steps(AxisId::Elevation))
            .finish()
    }
}
