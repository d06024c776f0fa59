//! # Restart budget.
//!
//! [`RestartBudget`] bounds how often one subsystem may be restarted:
//! at most `max` restarts inside any rolling `window`.
//!
//! ```text
//! max = 3, window = 1h
//!
//!   t=0     t=10m   t=20m   t=30m          t=1h05m
//!   R1      R2      R3      ✗ exceeded     R4 ok (R1 aged out)
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Rolling-window restart counter for one subsystem.
#[derive(Debug, Clone)]
pub struct RestartBudget {
    max: usize,
    window: Duration,
    issued: VecDeque<Instant>,
}

impl RestartBudget {
    /// Creates a budget of `max` restarts per rolling `window`.
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            issued: VecDeque::with_capacity(max),
        }
    }

    /// Records a restart at `now` if the budget allows it.
    ///
    /// Returns `Err(used)` with the number of restarts already inside the
    /// window when the budget is spent.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), usize> {
        self.prune(now);
        if self.issued.len() >= self.max {
            return Err(self.issued.len());
        }
        self.issued.push_back(now);
        Ok(())
    }

    /// Restarts inside the window ending at `now`.
    pub fn used(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.issued.len()
    }

    /// Configured window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Forgets all recorded restarts.
    pub fn reset(&mut self) {
        self.issued.clear();
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.issued.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.issued.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourth_restart_in_window_is_refused() {
        let start = Instant::now();
        let mut budget = RestartBudget::new(3, Duration::from_secs(3600));
        for i in 0..3 {
            budget
                .try_acquire(start + Duration::from_secs(i * 600))
                .unwrap();
        }
        assert_eq!(budget.try_acquire(start + Duration::from_secs(1800)), Err(3));
        assert_eq!(budget.used(start + Duration::from_secs(1800)), 3);
    }

    #[test]
    fn old_restarts_age_out() {
        let start = Instant::now();
        let mut budget = RestartBudget::new(1, Duration::from_secs(60));
        budget.try_acquire(start).unwrap();
        assert!(budget.try_acquire(start + Duration::from_secs(59)).is_err());
        assert!(budget.try_acquire(start + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn zero_budget_never_allows_a_restart() {
        let mut budget = RestartBudget::new(0, Duration::from_secs(60));
        assert_eq!(budget.try_acquire(Instant::now()), Err(0));
    }

    #[test]
    fn reset_clears_history() {
        let now = Instant::now();
        let mut budget = RestartBudget::new(1, Duration::from_secs(60));
        budget.try_acquire(now).unwrap();
        budget.reset();
        assert!(budget.try_acquire(now).is_ok());
    }
}
