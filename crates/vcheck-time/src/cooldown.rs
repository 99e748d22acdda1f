//! Cooldown windows on the frame time axis

use std::time::Duration;

use vcheck_core::SessionTime;

/// A window during which some projection (stage animation, guidance text)
/// is held back. Gesture evaluation and recording never consult it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cooldown {
    until: Option<SessionTime>,
}

impl Cooldown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or extend) the window from `now`
    pub fn start(&mut self, now: SessionTime, length: Duration) {
        let until = now.saturating_add(length);
        self.until = Some(match self.until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    pub fn is_active(&self, now: SessionTime) -> bool {
        matches!(self.until, Some(until) if now < until)
    }

    /// True exactly once, on the first check after an opened window lapses
    pub fn take_expired(&mut self, now: SessionTime) -> bool {
        match self.until {
            Some(until) if now >= until => {
                self.until = None;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.until = None;
    }
}
