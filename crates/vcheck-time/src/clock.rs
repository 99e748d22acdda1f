//! Frame clock

use std::time::{Duration, Instant};

use vcheck_core::SessionTime;

/// Largest gap a single tick may add (app suspension, debugger pauses)
pub const MAX_TICK_STEP: Duration = Duration::from_millis(250);

/// Monotonic session clock
/// INVARIANT: never moves backwards, never jumps more than MAX_TICK_STEP
pub struct FrameClock {
    value: SessionTime,
    last_update: Instant,
}

impl FrameClock {
    /// Start a clock at session time zero
    pub fn new() -> Self {
        FrameClock {
            value: SessionTime::ZERO,
            last_update: Instant::now(),
        }
    }

    /// Advance by the real time elapsed since the last tick
    pub fn tick(&mut self) -> SessionTime {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update);
        self.advance(elapsed);
        self.last_update = now;
        self.value
    }

    /// Advance by an explicit duration (clamped)
    pub fn advance(&mut self, dt: Duration) -> SessionTime {
        self.value = self.value.saturating_add(dt.min(MAX_TICK_STEP));
        self.value
    }

    /// Adopt a camera timestamp if it moves the clock forward
    pub fn observe(&mut self, stamp: SessionTime) -> SessionTime {
        if stamp > self.value {
            self.value = stamp;
        }
        self.last_update = Instant::now();
        self.value
    }

    pub fn now(&self) -> SessionTime {
        self.value
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tick_is_monotonic() {
        let mut clock = FrameClock::new();
        let t1 = clock.tick();
        std::thread::sleep(Duration::from_millis(5));
        let t2 = clock.tick();
        assert!(t2 > t1);
    }

    #[test]
    fn test_advance_is_clamped() {
        let mut clock = FrameClock::new();
        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.now().as_millis(), MAX_TICK_STEP.as_millis() as u64);
    }

    #[test]
    fn test_observe_ignores_stale_stamps() {
        let mut clock = FrameClock::new();
        clock.observe(SessionTime::from_millis(500));
        clock.observe(SessionTime::from_millis(100));
        assert_eq!(clock.now().as_millis(), 500);
    }

    proptest! {
        #[test]
        fn prop_clock_never_moves_backwards(stamps in prop::collection::vec(0u64..100_000, 1..64)) {
            let mut clock = FrameClock::new();
            let mut previous = clock.now();
            for stamp in stamps {
                let now = if stamp % 3 == 0 {
                    clock.advance(Duration::from_millis(stamp))
                } else {
                    clock.observe(SessionTime::from_millis(stamp))
                };
                prop_assert!(now >= previous);
                previous = now;
            }
        }
    }
}
