//! # OGRC HAL Library
//!
//! Hardware drivers behind the capability traits defined in
//! `ogrc_common::hal::driver`.
//!
//! # Module Structure
//!
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - Driver implementations
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         ogrc_hal                              │
//! │  ┌──────────────────┐          ┌──────────────────────────┐  │
//! │  │ DriverRegistry   │─create──►│ HalDriver (trait object) │  │
//! │  └──────────────────┘          └────────────┬─────────────┘  │
//! │                                             │ init()         │
//! │                                             ▼                │
//! │                  HardwareBundle { motors, sensor, limits }    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod driver_registry;
pub mod drivers;

pub use crate::driver_registry::DriverRegistry;
pub use crate::drivers::simulation::{SimulationDriver, SimulationHandle, SimulationSettings};
