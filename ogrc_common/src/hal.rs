//! Hardware capability layer.
//!
//! The rotator core never touches pins or serial buses. It consumes three
//! capabilities (pulse output, angle sensor, limit-switch input) that a
//! [`driver::HalDriver`] builds at start-up.

pub mod driver;
pub mod types;
