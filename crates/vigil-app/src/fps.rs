// crates/vigil-app/src/fps.rs
//
// Presented-frame rate over a sliding window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct FpsCounter {
    window:  Duration,
    samples: VecDeque<Instant>,
}

impl FpsCounter {
    pub fn new(window: Duration) -> Self {
        Self { window, samples: VecDeque::new() }
    }

    /// Record one presented frame at `now` and return the rate over the
    /// trailing window.
    pub fn tick(&mut self, now: Instant) -> f32 {
        self.samples.push_back(now);
        if let Some(cutoff) = now.checked_sub(self.window) {
            while self.samples.front().is_some_and(|&t| t < cutoff) {
                self.samples.pop_front();
            }
        }
        self.samples.len() as f32 / self.window.as_secs_f32()
    }
}
