//! Aggregation of child progress into run-level progress.
//!
//! Overall progress is measured in phase steps: the download phase is step
//! 0..1 and the build phase is step 1..2. Within the download phase, item
//! progress sums per-child byte deltas tracked in a ledger keyed by
//! [`ChildId`].

use std::collections::HashMap;

use crate::builder::BuildProgress;

use super::types::ChildId;

/// Number of phase steps on the overall scale.
pub const OVERALL_STEPS: f64 = 2.0;

/// Folds child progress events into overall and item progress.
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    /// Completed steps.
    offset: f64,
    overall: f64,
    item_progress: u64,
    item_maximum: u64,
    /// Last reported maximum per download child.
    maxima: HashMap<ChildId, u64>,
    /// Last observed progress per download child.
    ledger: HashMap<ChildId, u64>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a phase whose beginning is `step` on the overall scale.
    ///
    /// Item progress restarts at zero; overall never drops.
    pub fn enter_phase(&mut self, step: f64) {
        self.offset = step.clamp(0.0, OVERALL_STEPS);
        self.overall = self.overall.max(self.offset);
        self.item_progress = 0;
        self.item_maximum = 0;
        self.maxima.clear();
    }

    /// Track a new download child.
    ///
    /// A seeded child counts from zero. An unseeded one (a child continuing
    /// earlier work) has its first observation taken as its baseline.
    pub fn register_child(&mut self, child: ChildId, seeded: bool) {
        if seeded {
            self.ledger.insert(child, 0);
        }
    }

    pub fn download_progress(&mut self, child: ChildId, progress: u64, maximum: u64) {
        self.maxima.insert(child, maximum);
        self.item_maximum = self.maxima.values().sum();

        if let Some(previous) = self.ledger.insert(child, progress) {
            self.item_progress += progress.saturating_sub(previous);
        }

        let fraction = if self.item_maximum > 0 {
            self.item_progress as f64 / self.item_maximum as f64
        } else {
            0.0
        };
        self.advance(fraction);
    }

    pub fn build_progress(&mut self, progress: &BuildProgress) {
        self.item_progress = progress.item;
        self.item_maximum = progress.item_max;

        let fraction = if progress.overall_max > 0.0 {
            progress.overall / progress.overall_max
        } else {
            0.0
        };
        self.advance(fraction);
    }

    /// Mark every step done.
    pub fn finish(&mut self) {
        self.offset = OVERALL_STEPS;
        self.overall = OVERALL_STEPS;
    }

    /// Forget every per-child observation.
    pub fn reset_ledger(&mut self) {
        self.ledger.clear();
        self.maxima.clear();
    }

    pub fn overall(&self) -> f64 {
        self.overall
    }

    pub fn overall_maximum(&self) -> f64 {
        OVERALL_STEPS
    }

    pub fn item_progress(&self) -> u64 {
        self.item_progress
    }

    pub fn item_maximum(&self) -> u64 {
        self.item_maximum
    }

    fn advance(&mut self, phase_fraction: f64) {
        let value = (self.offset + phase_fraction.clamp(0.0, 1.0)).min(OVERALL_STEPS);
        self.overall = self.overall.max(value);
    }
}
