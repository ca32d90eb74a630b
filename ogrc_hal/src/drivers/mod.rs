//! HAL driver implementations.
//!
//! - [`simulation`] - Simulated two-axis mount for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `HalDriver` from `ogrc_common::hal::driver`
//! 3. Register the factory in [`register_all_drivers`]

pub mod simulation;

use crate::driver_registry::DriverRegistry;

/// Register every built-in driver into `registry`.
pub fn register_all_drivers(registry: &mut DriverRegistry) {
    // Names are unique by construction; a clash is a programming error.
    if let Err(e) = registry.register(simulation::DRIVER_NAME, simulation::create_driver) {
        tracing::error!("{e}");
    }
}
