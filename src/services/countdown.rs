use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    Running(u64),
    /// Emitted once, on the tick that reaches zero.
    Expired,
    Stopped,
}

#[derive(Debug, Clone)]
pub(crate) struct Countdown {
    remaining: u64,
    expired: bool,
}

impl Countdown {
    pub(crate) fn new(budget_seconds: u64) -> Self {
        Self { remaining: budget_seconds, expired: false }
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.remaining
    }

    pub(crate) fn tick(&mut self) -> Tick {
        if self.expired {
            return Tick::Stopped;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.expired = true;
            return Tick::Expired;
        }

        Tick::Running(self.remaining)
    }
}

/// Repeating tick source for a countdown; the first tick arrives one period after creation.
pub(crate) fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
