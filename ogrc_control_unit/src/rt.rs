//! Real-time helpers for the pulse threads.
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`: lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity`: pin to the configured core.
//! 4. `sched_setscheduler(SCHED_FIFO, prio)`: RT priority.
//!
//! Without the `rt` feature every step is a no-op and [`Pacer`] sleeps with
//! `std::thread::sleep`; with it, pacing uses `clock_nanosleep(TIMER_ABSTIME)`
//! on `CLOCK_MONOTONIC`. Both wait on absolute deadlines, so pulse trains do
//! not drift.

use std::time::Duration;

use crate::error::RuntimeError;

/// Longest uninterrupted sleep; bounds cancellation latency.
pub const WAIT_SLICE: Duration = Duration::from_millis(2);

/// A pulse later than this counts as late.
pub const LATE_PULSE_NS: i64 = 1_000_000;

// ─── RT Options ─────────────────────────────────────────────────────

/// Scheduling options for the time-critical threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtOptions {
    /// Core to pin pulse threads to; `None` leaves affinity alone.
    pub cpu_core: Option<usize>,
    /// SCHED_FIFO priority of the pulse threads. The safety supervisor runs
    /// one level above.
    pub priority: i32,
}

impl Default for RtOptions {
    fn default() -> Self {
        Self {
            cpu_core: None,
            priority: 80,
        }
    }
}

impl RtOptions {
    /// Priority used by the safety supervisor.
    #[inline]
    pub fn supervisor_priority(&self) -> i32 {
        (self.priority + 1).min(99)
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), RuntimeError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| RuntimeError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), RuntimeError> {
    Ok(())
}

/// Touch stack pages so the first pulses do not page-fault.
fn prefault_stack() {
    let mut buf = [0u8; 64 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), RuntimeError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| RuntimeError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| RuntimeError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), RuntimeError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), RuntimeError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(RuntimeError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), RuntimeError> {
    Ok(())
}

/// Apply the RT setup sequence to the calling thread.
///
/// In simulation builds (no `rt` feature) this only prefaults the stack.
pub fn rt_setup(cpu_core: Option<usize>, priority: i32) -> Result<(), RuntimeError> {
    rt_mlockall()?;
    prefault_stack();
    if let Some(cpu) = cpu_core {
        rt_set_affinity(cpu)?;
    }
    rt_set_scheduler(priority)
}

// ─── Clock ──────────────────────────────────────────────────────────

#[cfg(feature = "rt")]
mod clock {
    use nix::sys::time::TimeSpec;
    use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};
    use std::time::Duration;

    pub type Deadline = TimeSpec;

    pub fn now() -> Deadline {
        // CLOCK_MONOTONIC cannot fail on Linux; fall back to zero regardless.
        clock_gettime(ClockId::CLOCK_MONOTONIC).unwrap_or_else(|_| TimeSpec::new(0, 0))
    }

    pub fn add(at: Deadline, d: Duration) -> Deadline {
        at + TimeSpec::from_duration(d)
    }

    /// `a - b`, zero if negative.
    pub fn since(a: Deadline, b: Deadline) -> Duration {
        if a > b { Duration::from(a - b) } else { Duration::ZERO }
    }

    pub fn sleep_until(at: Deadline) {
        let _ = clock_nanosleep(
            ClockId::CLOCK_MONOTONIC,
            ClockNanosleepFlags::TIMER_ABSTIME,
            &at,
        );
    }
}

#[cfg(not(feature = "rt"))]
mod clock {
    use std::time::{Duration, Instant};

    pub type Deadline = Instant;

    pub fn now() -> Deadline {
        Instant::now()
    }

    pub fn add(at: Deadline, d: Duration) -> Deadline {
        at + d
    }

    pub fn since(a: Deadline, b: Deadline) -> Duration {
        a.saturating_duration_since(b)
    }

    pub fn sleep_until(at: Deadline) {
        let remaining = at.saturating_duration_since(Instant::now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}

// ─── Pacer ──────────────────────────────────────────────────────────

/// Absolute-deadline pacing with cancellable waits.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    deadline: clock::Deadline,
}

impl Pacer {
    /// Start pacing from now.
    pub fn start() -> Self {
        Self {
            deadline: clock::now(),
        }
    }

    /// Move the deadline `interval` further.
    #[inline]
    pub fn advance(&mut self, interval: Duration) {
        self.deadline = clock::add(self.deadline, interval);
    }

    /// Sleep until the deadline.
    ///
    /// Returns `false` without reaching the deadline as soon as `cancelled`
    /// reports true; it is polled at least every [`WAIT_SLICE`].
    pub fn wait(&self, cancelled: impl Fn() -> bool) -> bool {
        loop {
            if cancelled() {
                return false;
            }
            let now = clock::now();
            let remaining = clock::since(self.deadline, now);
            if remaining.is_zero() {
                return true;
            }
            if remaining > WAIT_SLICE {
                clock::sleep_until(clock::add(now, WAIT_SLICE));
            } else {
                clock::sleep_until(self.deadline);
            }
        }
    }

    /// How far past the deadline we are now.
    #[inline]
    pub fn lateness(&self) -> Duration {
        clock::since(clock::now(), self.deadline)
    }
}

// ─── Pulse statistics ───────────────────────────────────────────────

/// O(1) per-pulse timing statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseStats {
    /// Pulses recorded.
    pub pulse_count: u64,
    /// Minimum scheduled interval [ns].
    pub min_interval_ns: i64,
    /// Maximum scheduled interval [ns].
    pub max_interval_ns: i64,
    /// Running sum for average computation.
    pub sum_interval_ns: i64,
    /// Pulses emitted more than [`LATE_PULSE_NS`] after their deadline.
    pub late_pulses: u64,
    /// Worst lateness seen [ns].
    pub max_lateness_ns: i64,
}

impl PulseStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            pulse_count: 0,
            min_interval_ns: i64::MAX,
            max_interval_ns: 0,
            sum_interval_ns: 0,
            late_pulses: 0,
            max_lateness_ns: 0,
        }
    }

    /// Record one pulse. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, interval_ns: i64, lateness_ns: i64) {
        self.pulse_count += 1;
        self.min_interval_ns = self.min_interval_ns.min(interval_ns);
        self.max_interval_ns = self.max_interval_ns.max(interval_ns);
        self.sum_interval_ns = self.sum_interval_ns.saturating_add(interval_ns);
        if lateness_ns > LATE_PULSE_NS {
            self.late_pulses += 1;
        }
        self.max_lateness_ns = self.max_lateness_ns.max(lateness_ns);
    }

    /// Fold another set of statistics into this one.
    pub fn merge(&mut self, other: &Self) {
        self.pulse_count += other.pulse_count;
        self.min_interval_ns = self.min_interval_ns.min(other.min_interval_ns);
        self.max_interval_ns = self.max_interval_ns.max(other.max_interval_ns);
        self.sum_interval_ns = self.sum_interval_ns.saturating_add(other.sum_interval_ns);
        self.late_pulses += other.late_pulses;
        self.max_lateness_ns = self.max_lateness_ns.max(other.max_lateness_ns);
    }

    /// Average interval [ns] (0 if nothing recorded).
    #[inline]
    pub fn avg_interval_ns(&self) -> i64 {
        if self.pulse_count == 0 {
            0
        } else {
            self.sum_interval_ns / self.pulse_count as i64
        }
    }
}

impl Default for PulseStats {
    fn default() -> Self {
        Self::new()
    }
}
