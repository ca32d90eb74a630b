//! Limit-switch latch and soft-limit enforcement.
//!
//! The supervisor is the only writer of a [`LimitLatch`]; controllers read
//! it when a homing phase finishes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ogrc_common::hal::types::LimitEdge;
use ogrc_common::rotator::{AxisId, CommandError, SoftLimits};

/// Switch level and trip counter of one axis.
#[derive(Debug, Default)]
pub struct LimitLatch {
    active: AtomicBool,
    trips: AtomicU64,
}

impl LimitLatch {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            trips: AtomicU64::new(0),
        }
    }

    /// Record an edge. Rising edges count as trips.
    pub fn record(&self, edge: LimitEdge) {
        match edge {
            LimitEdge::Rising => {
                self.active.store(true, Ordering::Release);
                self.trips.fetch_add(1, Ordering::Relaxed);
            }
            LimitEdge::Falling => self.active.store(false, Ordering::Release),
        }
    }

    /// Seed the level without counting a trip (start-up).
    pub fn set_level(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    #[inline]
    pub fn trips(&self) -> u64 {
        self.trips.load(Ordering::Relaxed)
    }
}

/// Reject `angle` if it lies outside `limits`. Never clamps.
pub fn check_soft_limits(axis: AxisId, limits: &SoftLimits, angle: f64) -> Result<(), CommandError> {
    if limits.contains(angle) {
        Ok(())
    } else {
        Err(CommandError::Range {
            axis,
            angle,
            min: limits.min,
            max: limits.max,
        })
    }
}
