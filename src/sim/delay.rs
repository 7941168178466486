//! Injectable simulated-time delays.
//!
//! The driver never calls the RNG directly: arrival and hold durations
//! come from a [`DelayProvider`], so tests can force zero delays and
//! assert exact orderings while the default run keeps the jittered feel
//! of the original demo.

use rand::Rng;
use std::time::Duration;

/// Source of the simulated arrival and hold delays.
pub trait DelayProvider: Send + Sync {
    /// How long a process idles before issuing its `entry`-th request.
    fn arrival_delay(&self, pid: u32, entry: u32) -> Duration;

    /// How long a process stays inside the critical section.
    fn hold_delay(&self, pid: u32, entry: u32) -> Duration;
}

/// Randomized delays.
///
/// Arrival: `40ms + rand(0..80ms) * (pid + 1)`, so higher pids tend to
/// arrive later and contention patterns vary run to run.
/// Hold: `60ms + rand(0..80ms)`.
#[derive(Debug, Clone, Copy)]
pub struct JitterDelay {
    pub arrival_base: Duration,
    pub arrival_spread_ms: u64,
    pub hold_base: Duration,
    pub hold_spread_ms: u64,
}

impl Default for JitterDelay {
    fn default() -> Self {
        JitterDelay {
            arrival_base: Duration::from_millis(40),
            arrival_spread_ms: 80,
            hold_base: Duration::from_millis(60),
            hold_spread_ms: 80,
        }
    }
}

impl JitterDelay {
    /// A faster variant for tests that still want contention jitter.
    pub fn brisk() -> Self {
        JitterDelay {
            arrival_base: Duration::from_millis(1),
            arrival_spread_ms: 5,
            hold_base: Duration::from_millis(1),
            hold_spread_ms: 3,
        }
    }
}

impl DelayProvider for JitterDelay {
    fn arrival_delay(&self, pid: u32, _entry: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0..=self.arrival_spread_ms);
        self.arrival_base + Duration::from_millis(jitter * (pid as u64 + 1))
    }

    fn hold_delay(&self, _pid: u32, _entry: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0..=self.hold_spread_ms);
        self.hold_base + Duration::from_millis(jitter)
    }
}

/// Zero delays everywhere, for deterministic tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayProvider for NoDelay {
    fn arrival_delay(&self, _pid: u32, _entry: u32) -> Duration {
        Duration::ZERO
    }

    fn hold_delay(&self, _pid: u32, _entry: u32) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_delay_is_zero() {
        assert_eq!(NoDelay.arrival_delay(3, 0), Duration::ZERO);
        assert_eq!(NoDelay.hold_delay(3, 0), Duration::ZERO);
    }

    #[test]
    fn test_jitter_respects_bounds() {
        let jitter = JitterDelay::default();
        for pid in 0..4 {
            let d = jitter.arrival_delay(pid, 0);
            assert!(d >= Duration::from_millis(40));
            assert!(d <= Duration::from_millis(40 + 80 * (pid as u64 + 1)));

            let h = jitter.hold_delay(pid, 0);
            assert!(h >= Duration::from_millis(60));
            assert!(h <= Duration::from_millis(140));
        }
    }
}
