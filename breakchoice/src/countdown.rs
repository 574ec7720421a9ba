//! Global Countdown: one-shot override of the rule table
//!
//! While the countdown is positive every check decrements it. The check that
//! brings it to exactly zero pauses unconditionally; after that the countdown
//! stays at zero and all checks go through the rule table.

/// Result of one countdown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    /// Unset or exhausted: evaluate rules
    Inactive,
    /// Decremented but not yet exhausted: evaluate rules
    Counting { remaining: u64 },
    /// Just reached zero: pause, skip the rule table
    Fire,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalCountdown {
    remaining: Option<u64>,
}

impl GlobalCountdown {
    pub fn new(initial: Option<u64>) -> Self {
        Self { remaining: initial }
    }

    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    /// Whether the next [`tick`](Self::tick) will decrement.
    pub fn is_active(&self) -> bool {
        matches!(self.remaining, Some(n) if n > 0)
    }

    pub fn tick(&mut self) -> CountdownTick {
        match self.remaining {
            Some(n) if n > 0 => {
                let remaining = n - 1;
                self.remaining = Some(remaining);
                if remaining == 0 {
                    CountdownTick::Fire
                } else {
                    CountdownTick::Counting { remaining }
                }
            }
            _ => CountdownTick::Inactive,
        }
    }
}
