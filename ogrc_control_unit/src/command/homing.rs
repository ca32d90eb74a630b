//! Homing sequence.
//!
//! Pure phase logic; the axis controller issues the moves it asks for and
//! reports back the switch level each time a move finishes.
//!
//! ## Phases
//!
//! | Phase    | Move                                    | Done when            |
//! |----------|-----------------------------------------|----------------------|
//! | Approach | toward switch, at most max travel       | switch active        |
//! | Release  | away from switch, at most release dist. | switch inactive      |
//!
//! The supervisor cancels the running move on each switch edge, so both
//! moves normally end early. A move that runs its full length without the
//! expected switch level fails the sequence. The release point becomes
//! the zero reference.

use ogrc_common::hal::types::Direction;
use ogrc_common::rotator::{AxisId, CalibrationConfig};

// ─── Phases ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingPhase {
    /// Not homing.
    Idle,
    /// Driving toward the switch.
    Approach,
    /// Backing off until the switch releases.
    Release,
}

/// Why a sequence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingFailReason {
    /// Max travel used up without the switch triggering.
    SwitchNotReached,
    /// Release distance used up with the switch still active.
    SwitchNotReleased,
}

/// What the controller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingStep {
    /// Issue a move of this many signed pulses at homing speed.
    Move { steps: i64 },
    /// Switch released: zero the axis here.
    Success,
    Failed(HomingFailReason),
}

// ─── Sequence ───────────────────────────────────────────────────────

/// Per-axis homing sequencer.
#[derive(Debug, Clone)]
pub struct HomingSequence {
    phase: HomingPhase,
    /// Signed pulses of the approach move.
    approach_steps: i64,
    /// Signed pulses of the release move.
    release_steps: i64,
}

impl HomingSequence {
    pub fn new(calibration: &CalibrationConfig, axis: AxisId) -> Self {
        let cal = calibration.axis(axis);
        let toward: Direction = cal.homing_direction;
        let approach = calibration.degrees_to_steps(cal.homing_max_travel_deg).max(1);
        let release = calibration.degrees_to_steps(cal.homing_release_deg).max(1);
        Self {
            phase: HomingPhase::Idle,
            approach_steps: toward.sign() * approach,
            release_steps: toward.reversed().sign() * release,
        }
    }

    #[inline]
    pub const fn phase(&self) -> HomingPhase {
        self.phase
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.phase != HomingPhase::Idle
    }

    /// Begin homing. An already active switch skips the approach.
    pub fn start(&mut self, switch_active: bool) -> HomingStep {
        if switch_active {
            self.phase = HomingPhase::Release;
            HomingStep::Move {
                steps: self.release_steps,
            }
        } else {
            self.phase = HomingPhase::Approach;
            HomingStep::Move {
                steps: self.approach_steps,
            }
        }
    }

    /// The move of the current phase finished (completed or cancelled).
    pub fn advance(&mut self, switch_active: bool) -> HomingStep {
        match (self.phase, switch_active) {
            (HomingPhase::Approach, true) => {
                self.phase = HomingPhase::Release;
                HomingStep::Move {
                    steps: self.release_steps,
                }
            }
            (HomingPhase::Approach, false) => {
                self.phase = HomingPhase::Idle;
                HomingStep::Failed(HomingFailReason::SwitchNotReached)
            }
            (HomingPhase::Release, false) => {
                self.phase = HomingPhase::Idle;
                HomingStep::Success
            }
            (HomingPhase::Release, true) => {
                self.phase = HomingPhase::Idle;
                HomingStep::Failed(HomingFailReason::SwitchNotReleased)
            }
            // Nothing running; restart cleanly.
            (HomingPhase::Idle, active) => self.start(active),
        }
    }

    pub fn abort(&mut self) {
        self.phase = HomingPhase::Idle;
    }
}
