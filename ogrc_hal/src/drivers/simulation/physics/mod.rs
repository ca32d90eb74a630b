//! Shaft physics of the simulated mount.

mod axis;

pub use axis::AxisSimulator;
