//! OGRC Common Library
//!
//! Shared types for every crate of the Open Ground station Rotator
//! Controller workspace.
//!
//! # Module Structure
//!
//! - [`rotator`] - Axis identifiers, axis state/fault taxonomy, calibration
//!   and the client-facing command error type
//! - [`hal`] - Capability traits for the external hardware collaborators
//!   (motor pulses, angle sensor, limit switches) and `HalError`
//! - [`config`] - TOML configuration loading traits and types
//! - [`consts`] - Workspace-wide constants
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use ogrc_common::prelude::*;
//!
//! let cal = CalibrationConfig::default();
//! assert_eq!(cal.degrees_to_steps(180.0), 4000);
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
pub mod rotator;
