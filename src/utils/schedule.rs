use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

use super::clock::Clock;

/// Deadlines of a recurring task: the first one after `first_delay`, then one every `period`.
/// Intended to be awaited inside a `select!` next to a cancellation token, which serves as the
/// task's cancel handle.
pub struct Schedule {
    clock: Arc<dyn Clock>,
    next: Instant,
    period: Duration,
}

impl Schedule {
    pub fn new(clock: Arc<dyn Clock>, first_delay: Duration, period: Duration) -> Self {
        let next = clock.instant() + first_delay;
        Self {
            clock,
            next,
            period,
        }
    }

    /// First deadline is one period away.
    pub fn every(clock: Arc<dyn Clock>, period: Duration) -> Self {
        Self::new(clock, period, period)
    }

    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// Waits for the next deadline. Dropping the future before it completes leaves the deadline
    /// unchanged, so it can be raced against other events.
    pub async fn wait(&mut self) {
        self.clock.sleep_until(self.next).await;
        self.next += self.period;
    }
}
