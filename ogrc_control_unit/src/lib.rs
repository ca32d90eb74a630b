//! # OGRC Control Unit Library
//!
//! Closed-loop antenna rotator core. Bridges a GS-232 tracking client to a
//! two-axis stepper mount and uses an angle sensor as ground truth.
//!
//! ## Activities
//!
//! | Activity          | Context          | Talks to controller via          |
//! |-------------------|------------------|----------------------------------|
//! | Command interface | tokio tasks      | global dispatch queue → requests |
//! | Motion generator  | 1 thread / axis  | completion callback → inbox      |
//! | Axis controller   | 1 thread / axis  | owns the axis state              |
//! | Feedback loop     | 1 thread         | samples + corrections → inbox    |
//! | Safety supervisor | 1 thread         | cancel + limit edges → inbox     |
//!
//! Each axis controller is the single writer of its state. Everybody else
//! submits requests into its inbox and reads the published snapshot.

pub mod command;
pub mod config;
pub mod error;
pub mod feedback;
pub mod motion;
pub mod rt;
pub mod runtime;
pub mod safety;
pub mod server;
pub mod state;

pub use crate::error::RuntimeError;
pub use crate::runtime::Rotator;
