//! Local attempt budget

use vcheck_core::AttemptNumber;

/// Bounds how many sessions may end prematurely before obstacles fail open.
/// Lives outside the session so it survives session replacement on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudget {
    current: AttemptNumber,
    max: u32,
}

impl AttemptBudget {
    pub fn new(max: u32) -> Self {
        AttemptBudget {
            current: AttemptNumber::FIRST,
            max: max.max(1),
        }
    }

    /// Number of the attempt in progress (1-based)
    pub fn current(&self) -> AttemptNumber {
        self.current
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// The running attempt is the last one; its obstacles fail open
    pub fn is_exhausted(&self) -> bool {
        self.current.get() >= self.max
    }

    /// Record a premature end, moving on to the next attempt
    pub fn consume(&mut self) -> AttemptNumber {
        self.current = self.current.next();
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exhaustion() {
        let mut budget = AttemptBudget::new(5);
        for expected in 2..=5 {
            assert!(!budget.is_exhausted());
            assert_eq!(budget.consume().get(), expected);
        }
        assert!(budget.is_exhausted());
        assert_eq!(budget.current().get(), budget.max());
    }

    #[test]
    fn test_single_attempt_budget_is_exhausted_at_once() {
        assert!(AttemptBudget::new(1).is_exhausted());
        assert!(AttemptBudget::new(0).is_exhausted());
    }
}
