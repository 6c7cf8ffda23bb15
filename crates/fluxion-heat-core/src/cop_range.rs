// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Statistical guard over heat pump COP samples.
//!
//! Device-reported COP values are noisy: defrost cycles, sensor glitches and
//! start-up transients produce values far outside what a heat pump can
//! physically deliver. The learner rejects implausible samples outright and
//! derives its working range from percentiles of a rolling history, so a
//! single spike cannot stretch the normalization range.

use fluxion_heat_types::CopGuardConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::settings::{SettingsStore, load_json, save_json};

/// Maximum number of accepted samples kept in the rolling history
pub const COP_HISTORY_LIMIT: usize = 100;

/// Samples needed before the percentile range replaces the default range
pub const MIN_SAMPLES_FOR_RANGE: usize = 5;

/// Range used for normalization until enough samples exist
pub const DEFAULT_COP_RANGE: (f64, f64) = (1.0, 5.0);

/// Persisted COP statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopRange {
    pub min_observed: f64,
    pub max_observed: f64,
    /// Number of accepted samples since the range was created
    pub update_count: u64,
    /// Accepted samples, oldest first
    pub history: VecDeque<f64>,
}

impl Default for CopRange {
    fn default() -> Self {
        Self {
            min_observed: DEFAULT_COP_RANGE.0,
            max_observed: DEFAULT_COP_RANGE.1,
            update_count: 0,
            history: VecDeque::with_capacity(COP_HISTORY_LIMIT),
        }
    }
}

impl CopRange {
    fn has_range(&self) -> bool {
        self.history.len() >= MIN_SAMPLES_FOR_RANGE
    }

    fn sorted_history(&self) -> Vec<f64> {
        let mut sorted: Vec<f64> = self.history.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        sorted
    }
}

/// Percentile of an ascending slice with linear interpolation between ranks
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let (first, last) = (sorted.first()?, sorted.last()?);
    if sorted.len() == 1 {
        return Some(*first);
    }
    let p = p.clamp(0.0, 1.0);
    let rank = p * (sorted.len() - 1) as f64;
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "rank is within 0..len"
    )]
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    if lower >= sorted.len() - 1 {
        return Some(*last);
    }
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Learns and bounds COP statistics for one device
#[derive(Debug)]
pub struct CopRangeLearner {
    range: CopRange,
    guard: CopGuardConfig,
    store: Arc<dyn SettingsStore>,
    key: String,
}

impl CopRangeLearner {
    /// Create the learner, restoring a persisted snapshot when one exists
    pub fn new(guard: CopGuardConfig, store: Arc<dyn SettingsStore>, key: String) -> Self {
        let range = match load_json::<CopRange>(store.as_ref(), &key) {
            Some(snapshot) => {
                let range = Self::sanitize(snapshot, &guard);
                info!(
                    key = %key,
                    samples = range.history.len(),
                    updates = range.update_count,
                    min = range.min_observed,
                    max = range.max_observed,
                    "Restored COP range"
                );
                range
            }
            None => CopRange::default(),
        };

        Self {
            range,
            guard,
            store,
            key,
        }
    }

    /// Drop restored samples that would not pass today's guard
    fn sanitize(mut snapshot: CopRange, guard: &CopGuardConfig) -> CopRange {
        snapshot
            .history
            .retain(|v| v.is_finite() && *v >= guard.min_valid_cop && *v <= guard.max_valid_cop);
        while snapshot.history.len() > COP_HISTORY_LIMIT {
            snapshot.history.pop_front();
        }
        Self::recompute_bounds(&mut snapshot, guard);
        snapshot
    }

    fn recompute_bounds(range: &mut CopRange, guard: &CopGuardConfig) {
        if !range.has_range() {
            range.min_observed = DEFAULT_COP_RANGE.0;
            range.max_observed = DEFAULT_COP_RANGE.1;
            return;
        }
        let sorted = range.sorted_history();
        if let (Some(low), Some(high)) = (
            percentile(&sorted, guard.low_percentile),
            percentile(&sorted, guard.high_percentile),
        ) {
            range.min_observed = low.min(high);
            range.max_observed = high.max(low);
        }
    }

    /// Record a COP observation. Returns `false` when the sample was rejected.
    pub fn update(&mut self, value: f64) -> bool {
        if !value.is_finite() || value < self.guard.min_valid_cop || value > self.guard.max_valid_cop
        {
            warn!(
                value,
                min = self.guard.min_valid_cop,
                max = self.guard.max_valid_cop,
                "Rejected implausible COP sample"
            );
            return false;
        }

        self.range.history.push_back(value);
        while self.range.history.len() > COP_HISTORY_LIMIT {
            self.range.history.pop_front();
        }
        self.range.update_count += 1;
        Self::recompute_bounds(&mut self.range, &self.guard);

        debug!(
            value,
            min = self.range.min_observed,
            max = self.range.max_observed,
            samples = self.range.history.len(),
            "Accepted COP sample"
        );

        if let Err(e) = save_json(self.store.as_ref(), &self.key, &self.range) {
            warn!("Failed to persist COP range: {e}");
        }
        true
    }

    /// Map a COP onto [0, 1] within the observed range
    pub fn normalize(&self, value: f64) -> f64 {
        if value.is_nan() {
            return 0.0;
        }
        let (min, max) = (self.range.min_observed, self.range.max_observed);
        let span = max - min;
        if span <= f64::EPSILON {
            return if value < min {
                0.0
            } else if value > max {
                1.0
            } else {
                0.5
            };
        }
        ((value.clamp(min, max) - min) / span).clamp(0.0, 1.0)
    }

    /// Whether a COP lies in the top quartile of recent history
    pub fn is_top_quartile(&self, value: f64) -> bool {
        if !value.is_finite() || !self.range.has_range() {
            return false;
        }
        percentile(&self.range.sorted_history(), 0.75).is_some_and(|q3| value >= q3)
    }

    pub fn range(&self) -> &CopRange {
        &self.range
    }
}
