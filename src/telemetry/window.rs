//! # Fixed-size sliding window of latency / error samples.

use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct Sample {
    latency: Duration,
    error: bool,
}

/// Last `capacity` samples with running sums.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    capacity: usize,
    samples: VecDeque<Sample>,
    sum: Duration,
    errors: usize,
}

impl LatencyWindow {
    /// Creates an empty window (capacity clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
            sum: Duration::ZERO,
            errors: 0,
        }
    }

    /// Adds a sample, evicting the oldest one when full.
    pub fn push(&mut self, latency: Duration, error: bool) {
        if self.samples.len() == self.capacity {
            if let Some(old) = self.samples.pop_front() {
                self.sum = self.sum.saturating_sub(old.latency);
                self.errors -= usize::from(old.error);
            }
        }
        self.sum = self.sum.saturating_add(latency);
        self.errors += usize::from(error);
        self.samples.push_back(Sample { latency, error });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean latency over the window (zero when empty).
    pub fn mean(&self) -> Duration {
        match u32::try_from(self.samples.len()) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.sum / n,
            Err(_) => Duration::ZERO,
        }
    }

    /// Largest latency in the window.
    pub fn max(&self) -> Duration {
        self.samples
            .iter()
            .map(|s| s.latency)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Fraction of error samples in the window (0.0 when empty).
    pub fn error_rate(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.errors as f64 / self.samples.len() as f64
        }
    }
}
