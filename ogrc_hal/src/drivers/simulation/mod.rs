//! Simulation driver module.
//!
//! A software mount for development and testing without hardware: pulses
//! move a simulated shaft, a limit switch sits at a configurable angle and
//! the angle sensor reports the shaft position.

mod driver;
mod io;
mod physics;

pub use driver::{SimulationDriver, SimulationSettings};
pub use io::SimulationHandle;
pub use physics::AxisSimulator;

use ogrc_common::hal::driver::HalDriver;

/// Registry name of the simulation driver.
pub const DRIVER_NAME: &str = "simulation";

/// Factory function to create a simulation driver instance.
pub fn create_driver() -> Box<dyn HalDriver> {
    Box::new(SimulationDriver::new())
}
