//! Start-up and runtime assembly errors.
//!
//! Client-facing rejections live in `ogrc_common::rotator::CommandError`;
//! this type covers everything that stops the service from running.

use ogrc_common::config::ConfigError;
use ogrc_common::hal::driver::HalError;
use thiserror::Error;

/// Failure while assembling or running the rotator service.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Socket or file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hardware driver failed.
    #[error("HAL error: {0}")]
    Hal(#[from] HalError),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),

    /// OS refused to start an activity thread.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Waited too long for the rotator to reach a state.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}
