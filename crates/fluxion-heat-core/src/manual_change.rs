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

//! Detection of setpoint changes made by a person rather than the engine

use chrono::{DateTime, Duration, Utc};
use fluxion_heat_types::ManualOverrideConfig;
use tracing::info;

/// Compares the observed setpoint against what the engine last wrote
#[derive(Debug, Clone, Copy)]
pub struct ManualChangeDetector {
    epsilon: f64,
}

impl ManualChangeDetector {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon: epsilon.abs(),
        }
    }

    /// Whether `observed` was set by someone other than the engine
    ///
    /// Without a previously applied target nothing can be attributed to a
    /// person. A setpoint matching what the engine would choose this cycle is
    /// not treated as an override either.
    pub fn detect(&self, last_applied: Option<f64>, observed: f64, engine_choice: Option<f64>) -> bool {
        let Some(last_applied) = last_applied else {
            return false;
        };
        if !observed.is_finite() || (observed - last_applied).abs() < self.epsilon {
            return false;
        }
        !engine_choice.is_some_and(|choice| (observed - choice).abs() < self.epsilon)
    }

    /// Whether the setpoint moved off `last_applied` onto the engine's own choice
    ///
    /// Such a setpoint becomes the new applied target, otherwise it would be
    /// mistaken for a manual change once the engine's choice moves on.
    pub fn reached_choice(&self, last_applied: Option<f64>, observed: f64, engine_choice: f64) -> bool {
        last_applied.is_some_and(|last| (observed - last).abs() >= self.epsilon)
            && (observed - engine_choice).abs() < self.epsilon
    }
}

/// State of a zone's manual override after an observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverrideStatus {
    /// Engine controls the zone
    Inactive,
    /// A manual setpoint is being respected
    Active { since: DateTime<Utc>, setpoint_c: f64 },
    /// The hold window ended; the setpoint becomes the new baseline
    Expired { setpoint_c: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveOverride {
    since: DateTime<Utc>,
    setpoint_c: f64,
}

/// Per-zone memory of a detected manual override
#[derive(Debug, Clone)]
pub struct ManualOverrideTracker {
    hold: Duration,
    epsilon: f64,
    active: Option<ActiveOverride>,
}

impl ManualOverrideTracker {
    pub fn new(config: &ManualOverrideConfig) -> Self {
        Self {
            hold: Duration::minutes(i64::from(config.hold_minutes)),
            epsilon: config.epsilon.abs(),
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Feed one cycle's detection result and observed setpoint
    pub fn observe(&mut self, detected: bool, observed: f64, now: DateTime<Utc>) -> OverrideStatus {
        if let Some(active) = self.active {
            // Another manual adjustment restarts the hold window
            if (observed - active.setpoint_c).abs() >= self.epsilon {
                info!(
                    from = active.setpoint_c,
                    to = observed,
                    "Manual setpoint changed again, restarting hold"
                );
                self.active = Some(ActiveOverride {
                    since: now,
                    setpoint_c: observed,
                });
                return OverrideStatus::Active {
                    since: now,
                    setpoint_c: observed,
                };
            }
            if now - active.since >= self.hold {
                info!(
                    setpoint = active.setpoint_c,
                    "Manual override expired, adopting setpoint as baseline"
                );
                self.active = None;
                return OverrideStatus::Expired {
                    setpoint_c: active.setpoint_c,
                };
            }
            return OverrideStatus::Active {
                since: active.since,
                setpoint_c: active.setpoint_c,
            };
        }

        if detected {
            info!(setpoint = observed, "Manual setpoint change detected");
            self.active = Some(ActiveOverride {
                since: now,
                setpoint_c: observed,
            });
            return OverrideStatus::Active {
                since: now,
                setpoint_c: observed,
            };
        }
        OverrideStatus::Inactive
    }
}
