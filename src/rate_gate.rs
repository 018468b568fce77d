//! Rate Gate: per-channel suppression of samples that arrive too soon after
//! the last accepted one, or that repeat an unchanged payload too soon.
//!
//! `check` and `record` are split on purpose: the Ingestor must only commit
//! the new timestamp/payload *after* the Store insert actually succeeds, so
//! a failed write never corrupts the suppression state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ids::ChannelId;

/// Abstraction over the monotonic clock so tests can drive exact suppression
/// scenarios without sleeping real wall-clock seconds.
pub trait Clock {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Clone)]
struct ChannelState {
    last_saved_at: Instant,
    last_saved_value: String,
}

#[derive(Default)]
pub struct RateGate {
    state: HashMap<ChannelId, ChannelState>,
}

impl RateGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a sample on `channel` with `payload` arriving at
    /// `now` must be dropped, evaluating the minimum-interval rule then the
    /// minimum-unchanged-interval rule in that order. Read-only: does not
    /// mutate state.
    pub fn check(
        &self,
        now: Instant,
        channel: ChannelId,
        payload: &str,
        min_interval_secs: u32,
        min_unchanged_interval_secs: u32,
    ) -> bool {
        if min_interval_secs == 0 && min_unchanged_interval_secs == 0 {
            return false;
        }

        let Some(prev) = self.state.get(&channel) else {
            return false;
        };
        let elapsed = now.saturating_duration_since(prev.last_saved_at);

        if min_interval_secs > 0 && elapsed < Duration::from_secs(min_interval_secs as u64) {
            return true;
        }

        if min_unchanged_interval_secs > 0
            && prev.last_saved_value == payload
            && elapsed < Duration::from_secs(min_unchanged_interval_secs as u64)
        {
            return true;
        }

        false
    }

    /// Commit `(now, payload)` as the last-accepted state for `channel`.
    /// Call only after the corresponding Store insert has succeeded.
    pub fn record(&mut self, now: Instant, channel: ChannelId, payload: &str) {
        self.state.insert(
            channel,
            ChannelState {
                last_saved_at: now,
                last_saved_value: payload.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// A clock whose `now()` steps forward by a fixed amount each call,
    /// letting tests express "deliver at t=0, t=1s, t=3s" deterministically.
    struct FakeClock {
        base: Instant,
        offset: Cell<Duration>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Cell::new(Duration::ZERO),
            }
        }

        fn advance_to(&self, secs: f64) {
            self.offset.set(Duration::from_secs_f64(secs));
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.base + self.offset.get()
        }
    }

    fn deliver(gate: &mut RateGate, clock: &FakeClock, ch: ChannelId, payload: &str, min_i: u32, min_u: u32) -> bool {
        let now = clock.now();
        let drop = gate.check(now, ch, payload, min_i, min_u);
        if !drop {
            gate.record(now, ch, payload);
        }
        drop
    }

    #[test]
    fn s1_rate_limiting() {
        let clock = FakeClock::new();
        let mut gate = RateGate::new();
        let ch = ChannelId(1);

        clock.advance_to(0.0);
        assert!(!deliver(&mut gate, &clock, ch, "1", 2, 0));

        clock.advance_to(1.0);
        assert!(deliver(&mut gate, &clock, ch, "2", 2, 0));

        clock.advance_to(3.0);
        assert!(!deliver(&mut gate, &clock, ch, "3", 2, 0));
    }

    #[test]
    fn s2_unchanged_suppression() {
        let clock = FakeClock::new();
        let mut gate = RateGate::new();
        let ch = ChannelId(1);

        clock.advance_to(0.0);
        assert!(!deliver(&mut gate, &clock, ch, "7", 0, 5));

        clock.advance_to(2.0);
        assert!(deliver(&mut gate, &clock, ch, "7", 0, 5));

        clock.advance_to(3.0);
        assert!(!deliver(&mut gate, &clock, ch, "8", 0, 5));

        clock.advance_to(4.0);
        // "7" again, but the last stored value is now "8" — not a repeat.
        assert!(!deliver(&mut gate, &clock, ch, "7", 0, 5));
    }

    #[test]
    fn no_limits_configured_never_drops() {
        let clock = FakeClock::new();
        let mut gate = RateGate::new();
        let ch = ChannelId(1);

        for _ in 0..5 {
            assert!(!deliver(&mut gate, &clock, ch, "same", 0, 0));
        }
    }

    #[test]
    fn independent_channels_have_independent_state() {
        let clock = FakeClock::new();
        let mut gate = RateGate::new();

        clock.advance_to(0.0);
        assert!(!deliver(&mut gate, &clock, ChannelId(1), "x", 10, 0));
        assert!(!deliver(&mut gate, &clock, ChannelId(2), "x", 10, 0));
    }

    #[test]
    fn failed_insert_does_not_commit_state() {
        let clock = FakeClock::new();
        let mut gate = RateGate::new();
        let ch = ChannelId(1);

        clock.advance_to(0.0);
        assert!(!gate.check(clock.now(), ch, "1", 2, 0));
        // Simulate a failed store write: never call `record`.

        clock.advance_to(0.5);
        // Since nothing was recorded, this is still treated as the first
        // sample on the channel and is not suppressed.
        assert!(!gate.check(clock.now(), ch, "2", 2, 0));
    }
}
