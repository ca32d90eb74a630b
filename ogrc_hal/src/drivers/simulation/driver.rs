//! Simulation driver implementation.
//!
//! The `SimulationDriver` implements the `HalDriver` trait to provide a
//! software-emulated mount for development and testing without hardware.

use ogrc_common::hal::driver::{HalDriver, HalError, HardwareBundle};
use ogrc_common::rotator::{AxisId, CalibrationConfig};
use std::sync::Arc;
use std::sync::mpsc;
use tracing::{info, warn};

use super::io::{SimLimits, SimMotors, SimMount, SimSensor, SimulationHandle};
use super::physics::AxisSimulator;

/// Initial conditions of the simulated mount, indexed by `AxisId::index()`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    /// Shaft angle at power-on [deg]
    pub start_angle_deg: [f64; 2],
    /// Angle where the limit switch engages [deg]
    pub switch_angle_deg: [f64; 2],
    /// Constant sensor bias [deg]
    pub sensor_offset_deg: [f64; 2],
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            start_angle_deg: [10.0, 10.0],
            switch_angle_deg: [0.0, 0.0],
            sensor_offset_deg: [0.0, 0.0],
        }
    }
}

/// Simulation driver implementing the HalDriver trait.
pub struct SimulationDriver {
    name: &'static str,
    version: &'static str,
    settings: SimulationSettings,
    mount: Option<Arc<SimMount>>,
}

impl SimulationDriver {
    /// Create a simulation driver with default settings.
    pub fn new() -> Self {
        Self::with_settings(SimulationSettings::default())
    }

    /// Create a simulation driver with explicit initial conditions.
    pub fn with_settings(settings: SimulationSettings) -> Self {
        Self {
            name: super::DRIVER_NAME,
            version: env!("CARGO_PKG_VERSION"),
            settings,
            mount: None,
        }
    }

    /// Inspection handle; `None` before `init()`.
    pub fn handle(&self) -> Option<SimulationHandle> {
        self.mount.clone().map(SimulationHandle)
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl HalDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn init(&mut self, calibration: &CalibrationConfig) -> Result<HardwareBundle, HalError> {
        if self.mount.is_some() {
            return Err(HalError::InitFailed(
                "simulation driver already initialized".into(),
            ));
        }
        let steps_per_degree = calibration.steps_per_degree();
        if !(steps_per_degree.is_finite() && steps_per_degree > 0.0) {
            return Err(HalError::ConfigError(format!(
                "invalid steps per degree {steps_per_degree}"
            )));
        }

        let s = &self.settings;
        let axes = AxisId::ALL.map(|axis| {
            let i = axis.index();
            AxisSimulator::new(
                axis,
                calibration.axis(axis),
                steps_per_degree,
                s.start_angle_deg[i],
                s.switch_angle_deg[i],
            )
        });
        let (edge_tx, edge_rx) = mpsc::channel();
        let mount = Arc::new(SimMount::new(axes, s.sensor_offset_deg, edge_tx));
        self.mount = Some(Arc::clone(&mount));

        info!(
            "Simulation mount ready: AZ at {:.2}°, EL at {:.2}°, {:.3} pulses/deg",
            s.start_angle_deg[0], s.start_angle_deg[1], steps_per_degree
        );

        Ok(HardwareBundle {
            motors: Arc::new(SimMotors(Arc::clone(&mount))),
            sensor: Box::new(SimSensor(Arc::clone(&mount))),
            limits: Box::new(SimLimits {
                mount,
                edges: edge_rx,
            }),
        })
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        info!("Shutting down simulation driver");
        match self.handle() {
            Some(handle) => {
                for axis in AxisId::ALL {
                    if handle.is_enabled(axis) {
                        warn!(%axis, "drive still enabled at shutdown");
                    }
                }
            }
            None => warn!("shutdown before init"),
        }
        Ok(())
    }
}
