//! Pulse generation.
//!
//! - [`profile`] - trapezoidal rate profile over a pulse train
//! - [`generator`] - per-axis pulse thread with exact cancellation accounting

pub mod generator;
pub mod profile;

pub use generator::{
    CompletionSink, GeneratorHandle, GeneratorPort, MotionGenerator, MotionOutcome, MotionRequest,
};
pub use profile::RampProfile;
