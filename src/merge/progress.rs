use log::info;
use std::time::{Duration, Instant};

/// Logs per-unit timings and a remaining-time estimate for one merge stage.
#[derive(Debug)]
pub struct ProgressTracker {
    stage: &'static str,
    total: usize,
    completed: usize,
    started: Instant,
    unit_started: Instant,
}

impl ProgressTracker {
    pub fn new(stage: &'static str, total: usize) -> Self {
        let now = Instant::now();
        Self {
            stage,
            total,
            completed: 0,
            started: now,
            unit_started: now,
        }
    }

    pub fn start_unit(&mut self) {
        self.unit_started = Instant::now();
    }

    /// Marks a unit done and logs how long it took.
    pub fn finish_unit(&mut self, label: &str) {
        self.completed += 1;
        let elapsed = self.unit_started.elapsed();
        info!(
            "Merged {} {} in {:.2?} ({}/{}, about {:.0?} remaining)",
            self.stage,
            label,
            elapsed,
            self.completed,
            self.total,
            self.remaining()
        );
    }

    /// Counts a unit that needed no work.
    pub fn skip_unit(&mut self) {
        self.total = self.total.saturating_sub(1);
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn remaining(&self) -> Duration {
        if self.completed == 0 {
            return Duration::ZERO;
        }
        let left = self.total.saturating_sub(self.completed) as u32;
        self.started.elapsed() / self.completed as u32 * left
    }
}
