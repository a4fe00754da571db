//! Virtual clock for time-shifted evaluations.
//!
//! The clock produces a deterministic sequence of synthetic timestamps from a
//! start time, a step size, and an optional set of explicit probe timestamps
//! that are interleaved into the sequence regardless of step alignment. The
//! same construction always yields the same sequence, which is what makes
//! campaign replay possible.

use crate::error::{Error, Result};
use chrono::{Duration, NaiveDateTime};

/// Deterministic synthetic clock.
///
/// The natural timestamp at step `k` is `start + k * step`. Before a natural
/// timestamp is emitted, any unconsumed probe that is chronologically due is
/// emitted first. A probe that coincides exactly with a natural step is
/// emitted once, not twice.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    start: NaiveDateTime,
    step: Duration,
    probes: Vec<NaiveDateTime>,
    cursor: i64,
    next_probe: usize,
}

impl VirtualClock {
    /// Create a clock. Fails fast on a non-positive step size.
    pub fn new(
        start: NaiveDateTime,
        step: Duration,
        probes: impl IntoIterator<Item = NaiveDateTime>,
    ) -> Result<Self> {
        if step <= Duration::zero() {
            return Err(Error::config(format!(
                "Virtual clock step must be positive, got {step}"
            )));
        }
        let mut probes: Vec<NaiveDateTime> = probes.into_iter().collect();
        probes.sort_unstable();
        probes.dedup();
        Ok(Self {
            start,
            step,
            probes,
            cursor: 0,
            next_probe: 0,
        })
    }

    /// Convenience constructor for day-granularity schedules.
    pub fn for_days(
        start: NaiveDateTime,
        step_days: i64,
        probes: impl IntoIterator<Item = NaiveDateTime>,
    ) -> Result<Self> {
        Self::new(start, Duration::days(step_days), probes)
    }

    /// The configured start time.
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Emit the next timestamp in the deterministic sequence.
    pub fn advance(&mut self) -> NaiveDateTime {
        let natural =
            self.start + Duration::milliseconds(self.step.num_milliseconds() * self.cursor);
        if let Some(&probe) = self.probes.get(self.next_probe) {
            if probe < natural {
                self.next_probe += 1;
                return probe;
            }
            if probe == natural {
                // Coincides with the natural step; consume it and emit once.
                self.next_probe += 1;
            }
        }
        self.cursor += 1;
        natural
    }

    /// Rewind to the initial state for replay.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.next_probe = 0;
    }

    /// Generate the full campaign schedule: `horizon` natural steps plus
    /// every probe, each timestamp exactly once, in chronological order.
    pub fn schedule(&mut self, horizon: u32) -> Vec<NaiveDateTime> {
        self.reset();
        let mut out = Vec::with_capacity(horizon as usize + self.probes.len());
        while self.cursor < i64::from(horizon) {
            out.push(self.advance());
        }
        // Probes beyond the last natural step still belong to the schedule.
        while let Some(&probe) = self.probes.get(self.next_probe) {
            self.next_probe += 1;
            out.push(probe);
        }
        out
    }
}
