//! Client-facing command rejections.

use thiserror::Error;

use crate::rotator::state::{AxisId, FaultReason};

/// Why a client command was not carried out.
///
/// Every variant maps to exactly one protocol response token.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// Line could not be parsed.
    #[error("malformed command: {0:?}")]
    Protocol(String),

    /// Target outside the soft limits. Never clamped.
    #[error("{axis} target {angle} outside soft limits [{min}, {max}]")]
    Range {
        axis: AxisId,
        angle: f64,
        min: f64,
        max: f64,
    },

    /// Axis is running its homing sequence.
    #[error("{0} is homing")]
    Homing(AxisId),

    /// Axis is faulted and needs `H`.
    #[error("{0} faulted: {1}")]
    Fault(AxisId, FaultReason),

    /// Controller is shutting down or its queue is gone.
    #[error("controller unavailable")]
    Unavailable,
}

impl CommandError {
    /// Response line sent to the client.
    pub const fn response_token(&self) -> &'static str {
        match self {
            Self::Protocol(_) | Self::Unavailable => "ERROR",
            Self::Range { .. } => "ERROR RANGE",
            Self::Homing(_) => "ERROR HOMING",
            Self::Fault(..) => "ERROR FAULT",
        }
    }
}
